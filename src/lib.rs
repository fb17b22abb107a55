use crate::clock::*;
use crate::error::*;
use crate::message::*;
use crate::queue::*;
use crate::resource::*;
use crate::timestamp::*;

pub mod clock;
pub mod error;
pub mod harness;
pub mod log;
pub mod mesh;
pub mod message;
pub mod peer;
pub mod poisson;
pub mod queue;
pub mod resource;
pub mod timestamp;

pub use harness::{Harness, HarnessConfig};
pub use peer::{Phase, ProcessAgent};

/// Identifier of a process in the mesh, also its index in every per-peer table.
pub type ProcessId = usize;

/// Default rate of the Poisson think time between two requests of a workload.
pub const RATE: f64 = 1.;

/// Default capacity of every inbound channel of the mesh.
pub const DEFAULT_CAPACITY: usize = 16;
