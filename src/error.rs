//! Protocol invariant violations.
//!
//! None of these can happen while the algorithm is implemented correctly and the channels
//! deliver reliably and in order. They are never retried: [`fatal`] aborts the offending
//! process.

use crate::{log, timestamp::Timestamp, ProcessId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("resource is held by {holder} while {requester} tries to occupy it")]
    AlreadyOccupied {
        holder: Timestamp,
        requester: Timestamp,
    },

    #[error("{releaser} tries to release the resource held by {}", display_holder(.holder))]
    ReleaseMismatch {
        holder: Option<Timestamp>,
        releaser: Timestamp,
    },

    #[error("release from P{process} has no matching request in the queue")]
    UnknownRelease { process: ProcessId },

    #[error("release of {released} does not match the queued request {queued}")]
    StaleRelease {
        queued: Timestamp,
        released: Timestamp,
    },

    #[error("P{process} releases the resource without holding it")]
    NotHolding { process: ProcessId },

    #[error("request message from P{sender} carries no request")]
    MissingRequest { sender: ProcessId },

    #[error("message from unknown peer P{sender} in a mesh of {peers}")]
    UnknownPeer { sender: ProcessId, peers: usize },

    #[error("message from P{sender} at time {received} arrived after one at time {last}")]
    OutOfOrderDelivery {
        sender: ProcessId,
        last: u64,
        received: u64,
    },
}

fn display_holder(holder: &Option<Timestamp>) -> String {
    match holder {
        Some(holder) => holder.to_string(),
        None => "nobody".to_string(),
    }
}

/// Function that aborts process `process` after logging `violation`.
pub fn fatal(process: ProcessId, violation: ProtocolViolation) -> ! {
    log::error(&format!("P{process} broke the mutual exclusion protocol: {violation}"));
    panic!("P{process}: {violation}");
}
