//! Full mesh of ordered channels between the processes of a run.

use crate::message::Message;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Channels one process needs: its own inbound channel and a sender to every process.
#[derive(Debug)]
pub struct PeerChannels {
    pub inbound: Receiver<Message>,
    /// Indexed by process id, including this process' own (unused) entry.
    pub outbound: Vec<Sender<Message>>,
}

/// Function that wires `peers` processes together with bounded channels of `capacity`.
///
/// Every channel is single-reader and delivers each sender's messages in send order.
pub fn full_mesh(peers: usize, capacity: usize) -> Vec<PeerChannels> {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..peers).map(|_| mpsc::channel::<Message>(capacity)).unzip();

    receivers
        .into_iter()
        .map(|inbound| PeerChannels {
            inbound,
            outbound: senders.clone(),
        })
        .collect()
}
