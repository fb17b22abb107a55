use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{ops::RangeInclusive, time::Duration};

/// Poisson process driving when a workload asks for the resource and how long it keeps it.
pub struct Poisson<R: Rng + ?Sized> {
    pub rng: Box<R>,
    pub rate: f64,
}

impl Poisson<SmallRng> {
    pub fn new(rate: f64, seed: &[u8; 32]) -> Self {
        Self {
            rng: Box::new(SmallRng::from_seed(*seed)),
            rate,
        }
    }

    pub fn from_entropy(rate: f64) -> Self {
        Self {
            rng: Box::new(SmallRng::from_rng(&mut rand::rng())),
            rate,
        }
    }

    /// Seconds until the next event, exponentially distributed with mean `1 / rate`.
    pub fn time_for_next_event(&mut self) -> f64 {
        -(1.0f64 - self.rng.random::<f64>()).ln() / self.rate
    }

    pub fn delay_for_next_event(&mut self) -> Duration {
        Duration::from_secs_f64(self.time_for_next_event())
    }

    /// Uniformly distributed duration within `range`.
    pub fn hold_time(&mut self, range: RangeInclusive<Duration>) -> Duration {
        let (min, max) = (range.start().as_micros(), range.end().as_micros());
        if min >= max {
            return *range.start();
        }
        Duration::from_micros(self.rng.random_range(min..=max) as u64)
    }
}

/// Function that derives the 32-byte seed of process `process` from a run seed.
pub fn process_seed(seed: u64, process: usize) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&(process as u64).to_le_bytes());
    bytes
}
