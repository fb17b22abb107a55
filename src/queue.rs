//! Per-process bookkeeping of outstanding requests and of what has been heard from each peer.

use crate::{clock::LogicalTime, error::ProtocolViolation, timestamp::*, ProcessId};
use std::collections::BTreeMap;

/// Outstanding requests known to one process, at most one per process.
#[derive(Debug, Default, Clone)]
pub struct RequestQueue {
    requests: BTreeMap<ProcessId, Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `request`, replacing whatever was queued for the same process.
    pub fn apply_request(&mut self, request: Request) {
        self.requests.insert(request.process, request);
    }

    /// Removes and returns the request queued for `process`.
    pub fn apply_release(&mut self, process: ProcessId) -> Result<Request, ProtocolViolation> {
        self.requests
            .remove(&process)
            .ok_or(ProtocolViolation::UnknownRelease { process })
    }

    pub fn get(&self, process: ProcessId) -> Option<&Request> {
        self.requests.get(&process)
    }

    /// Earliest queued request by timestamp order.
    pub fn head(&self) -> Option<&Request> {
        self.requests.values().min_by_key(|request| request.timestamp)
    }

    /// Grant rule: `process` may take the resource when its request is the earliest one known
    /// and every peer has since been heard from at a later time.
    ///
    /// `min_receive_time` is `None` when there are no peers.
    pub fn can_grant(&self, process: ProcessId, min_receive_time: Option<LogicalTime>) -> bool {
        let Some(own) = self.get(process) else {
            return false;
        };
        if self.head().map(|head| head.timestamp) != Some(own.timestamp) {
            return false;
        }
        min_receive_time.is_none_or(|min| min > own.timestamp.time)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Queued requests in timestamp order.
    pub fn sorted(&self) -> Vec<Request> {
        let mut requests: Vec<Request> = self.requests.values().copied().collect();
        requests.sort_by_key(|request| request.timestamp);
        requests
    }
}

/// Time of the latest message received from every peer.
#[derive(Debug, Clone)]
pub struct PeerReceiptVector {
    me: ProcessId,
    last_received: Vec<LogicalTime>,
}

impl PeerReceiptVector {
    pub fn new(me: ProcessId, peers: usize) -> Self {
        Self {
            me,
            last_received: vec![0; peers],
        }
    }

    /// Records a message from `sender` stamped at `time`.
    ///
    /// Channels are FIFO and every sender stamps strictly increasing times, so a time that
    /// does not move forward means delivery went wrong.
    pub fn record(&mut self, sender: ProcessId, time: LogicalTime) -> Result<(), ProtocolViolation> {
        let peers = self.last_received.len();
        let last = self
            .last_received
            .get_mut(sender)
            .filter(|_| sender != self.me)
            .ok_or(ProtocolViolation::UnknownPeer { sender, peers })?;

        if time <= *last && *last != 0 {
            return Err(ProtocolViolation::OutOfOrderDelivery {
                sender,
                last: *last,
                received: time,
            });
        }
        *last = time;
        Ok(())
    }

    pub fn last_received(&self, sender: ProcessId) -> Option<LogicalTime> {
        self.last_received.get(sender).copied()
    }

    /// Minimum over every peer but this process, `None` for a single process mesh.
    pub fn min_receive_time(&self) -> Option<LogicalTime> {
        self.last_received
            .iter()
            .enumerate()
            .filter(|(peer, _)| *peer != self.me)
            .map(|(_, time)| *time)
            .min()
    }
}
