//! Module that contains the totally ordered timestamps and the requests stamped with them.

use crate::{clock::LogicalTime, ProcessId};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

/// Struct that represents the logical time of an event together with the process it happened on.
///
/// Ordered first by time, then by process id, so that two events with the same logical time
/// are still ordered identically by every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub time: LogicalTime,
    pub process: ProcessId,
}

/// Struct that represents a claim on the shared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub timestamp: Timestamp,
    pub process: ProcessId,
}

impl Timestamp {
    pub fn new(time: LogicalTime, process: ProcessId) -> Self {
        Self { time, process }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.process.cmp(&other.process))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<T{}:P{}>", self.time, self.process)
    }
}

impl Request {
    /// Function that creates the request `process` makes at logical time `time`.
    pub fn new(time: LogicalTime, process: ProcessId) -> Self {
        Self {
            timestamp: Timestamp::new(time, process),
            process,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp)
    }
}
