//! Lamport logical clock owned by a single process.

/// Logical time value carried by every event and message.
pub type LogicalTime = u64;

/// Monotonic counter implementing Lamport's clock rules.
///
/// Every local event calls [`LogicalClock::tick`]; every received message is folded in with
/// [`LogicalClock::observe`]. Together they guarantee that an event which causally precedes
/// another one always carries a smaller time.
#[derive(Debug, Default, Clone)]
pub struct LogicalClock {
    time: LogicalTime,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self { time: 0 }
    }

    /// Advances the clock by one for a local event and returns the new value.
    pub fn tick(&mut self) -> LogicalTime {
        self.time += 1;
        self.time
    }

    /// Moves the clock strictly past `received` without ever going backwards.
    pub fn observe(&mut self, received: LogicalTime) -> LogicalTime {
        self.time = self.time.max(received) + 1;
        self.time
    }

    pub fn now(&self) -> LogicalTime {
        self.time
    }
}
