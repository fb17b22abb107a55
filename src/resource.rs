//! Module that contains the exclusive resource shared by every process of a run.

use crate::{error::ProtocolViolation, log, timestamp::Timestamp};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct GuardState {
    holder: Option<Timestamp>,
    grants: Vec<Timestamp>,
    // (occupied at, released at) per grant
    spans: Vec<(Instant, Option<Instant>)>,
}

/// Handle on the exclusive resource, cheap to clone and shared by every agent of a run.
///
/// `occupy` and `release` are assertions: they fail only when the protocol let two
/// processes in at once, or let a process release what it does not hold.
#[derive(Debug, Clone, Default)]
pub struct ResourceGuard {
    state: Arc<Mutex<GuardState>>,
}

/// Struct that represents how busy the resource was over a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancyReport {
    pub grants: usize,
    pub occupied: Duration,
    pub elapsed: Duration,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupy(&self, timestamp: Timestamp) -> Result<(), ProtocolViolation> {
        let mut state = self.state.lock();
        match state.holder {
            Some(holder) if holder == timestamp => return Ok(()),
            Some(holder) => {
                return Err(ProtocolViolation::AlreadyOccupied {
                    holder,
                    requester: timestamp,
                })
            }
            None => {}
        }

        state.holder = Some(timestamp);
        state.grants.push(timestamp);
        state.spans.push((Instant::now(), None));
        log::debug(&format!("Resource occupied by {timestamp}."));
        Ok(())
    }

    pub fn release(&self, timestamp: Timestamp) -> Result<(), ProtocolViolation> {
        let mut state = self.state.lock();
        if state.holder != Some(timestamp) {
            return Err(ProtocolViolation::ReleaseMismatch {
                holder: state.holder,
                releaser: timestamp,
            });
        }

        state.holder = None;
        if let Some((_, released)) = state.spans.last_mut() {
            *released = Some(Instant::now());
        }
        log::debug(&format!("Resource released by {timestamp}."));
        Ok(())
    }

    pub fn holder(&self) -> Option<Timestamp> {
        self.state.lock().holder
    }

    /// Every timestamp the resource was granted to, in grant order.
    pub fn grants(&self) -> Vec<Timestamp> {
        self.state.lock().grants.clone()
    }

    /// Whether the resource was granted in strictly increasing timestamp order.
    pub fn grants_in_timestamp_order(&self) -> bool {
        self.state
            .lock()
            .grants
            .windows(2)
            .all(|pair| pair[0] < pair[1])
    }

    pub fn report(&self) -> OccupancyReport {
        let state = self.state.lock();
        let now = Instant::now();

        let occupied = state
            .spans
            .iter()
            .map(|(start, end)| end.unwrap_or(now).duration_since(*start))
            .sum();
        let elapsed = match (state.spans.first(), state.spans.last()) {
            (Some((start, _)), Some((_, end))) => end.unwrap_or(now).duration_since(*start),
            _ => Duration::ZERO,
        };

        OccupancyReport {
            grants: state.grants.len(),
            occupied,
            elapsed,
        }
    }
}

impl OccupancyReport {
    /// Share of the elapsed time the resource was held, in `[0, 1]`.
    pub fn rate(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.;
        }
        (self.occupied.as_secs_f64() / self.elapsed.as_secs_f64()).min(1.)
    }
}

impl fmt::Display for OccupancyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource granted {} times, occupancy rate {:.2}%",
            self.grants,
            self.rate() * 100.
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_then_release() {
        let guard = ResourceGuard::new();
        let timestamp = Timestamp::new(1, 0);

        guard.occupy(timestamp).unwrap();
        assert_eq!(guard.holder(), Some(timestamp));

        guard.release(timestamp).unwrap();
        assert_eq!(guard.holder(), None);
    }

    #[test]
    fn test_second_holder_is_rejected() {
        let guard = ResourceGuard::new();
        guard.occupy(Timestamp::new(1, 0)).unwrap();

        assert_eq!(
            guard.occupy(Timestamp::new(1, 1)),
            Err(ProtocolViolation::AlreadyOccupied {
                holder: Timestamp::new(1, 0),
                requester: Timestamp::new(1, 1),
            })
        );
        assert_eq!(guard.holder(), Some(Timestamp::new(1, 0)));
    }

    #[test]
    fn test_reoccupy_by_holder_is_not_a_new_grant() {
        let guard = ResourceGuard::new();
        guard.occupy(Timestamp::new(1, 0)).unwrap();
        guard.occupy(Timestamp::new(1, 0)).unwrap();
        assert_eq!(guard.grants().len(), 1);
    }

    #[test]
    fn test_mismatched_release_is_rejected() {
        let guard = ResourceGuard::new();
        assert!(guard.release(Timestamp::new(1, 0)).is_err());

        guard.occupy(Timestamp::new(2, 1)).unwrap();
        assert_eq!(
            guard.release(Timestamp::new(2, 0)),
            Err(ProtocolViolation::ReleaseMismatch {
                holder: Some(Timestamp::new(2, 1)),
                releaser: Timestamp::new(2, 0),
            })
        );
    }

    #[test]
    fn test_guards_are_independent() {
        let first = ResourceGuard::new();
        let second = ResourceGuard::new();
        first.occupy(Timestamp::new(1, 0)).unwrap();
        assert_eq!(second.holder(), None);

        // clones share the same resource
        assert_eq!(first.clone().holder(), Some(Timestamp::new(1, 0)));
    }

    #[test]
    fn test_grant_order() {
        let guard = ResourceGuard::new();
        for timestamp in [Timestamp::new(1, 0), Timestamp::new(1, 1), Timestamp::new(4, 0)] {
            guard.occupy(timestamp).unwrap();
            guard.release(timestamp).unwrap();
        }
        assert!(guard.grants_in_timestamp_order());

        guard.occupy(Timestamp::new(2, 2)).unwrap();
        assert!(!guard.grants_in_timestamp_order());
    }

    #[test]
    fn test_report() {
        let guard = ResourceGuard::new();
        assert_eq!(guard.report().rate(), 0.);

        let timestamp = Timestamp::new(1, 0);
        guard.occupy(timestamp).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        guard.release(timestamp).unwrap();

        let report = guard.report();
        assert_eq!(report.grants, 1);
        assert!(report.occupied >= Duration::from_millis(5));
        assert!(report.rate() > 0.99);
        assert!(report.to_string().starts_with("resource granted 1 times"));
    }
}
