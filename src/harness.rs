//! Wires a mesh of processes around one shared resource and drives a simulated workload.

use crate::{mesh::full_mesh, poisson::*, *};
use std::{error::Error, ops::RangeInclusive, sync::Arc, time::Duration};
use tokio::sync::Barrier;

/// Struct that represents the settings of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub peers: usize,
    /// Request/release cycles each process performs.
    pub rounds: usize,
    pub capacity: usize,
    pub min_hold: Duration,
    pub max_hold: Duration,
    /// Rate of the Poisson think time between two cycles, per second.
    pub rate: f64,
    /// Makes the workload reproducible when set.
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            peers: 3,
            rounds: 5,
            capacity: DEFAULT_CAPACITY,
            min_hold: Duration::from_millis(100),
            max_hold: Duration::from_millis(1000),
            rate: RATE,
            seed: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.peers == 0 {
            return Err("a run needs at least one process".into());
        }
        if self.capacity == 0 {
            return Err("channel capacity must be positive".into());
        }
        if self.min_hold > self.max_hold {
            return Err(format!(
                "minimum hold time {:?} exceeds maximum hold time {:?}",
                self.min_hold, self.max_hold
            )
            .into());
        }
        if !(self.rate.is_finite() && self.rate > 0.) {
            return Err(format!("rate must be a positive number, got {}", self.rate).into());
        }
        Ok(())
    }

    fn hold_range(&self) -> RangeInclusive<Duration> {
        self.min_hold..=self.max_hold
    }
}

/// Struct that owns the processes of a run and the resource they compete for.
pub struct Harness {
    pub config: HarnessConfig,
    pub guard: ResourceGuard,
    pub agents: Vec<ProcessAgent>,
}

impl Harness {
    /// Function that builds the mesh and starts every process.
    pub fn start(config: HarnessConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        config.validate()?;

        let guard = ResourceGuard::new();
        let agents = full_mesh(config.peers, config.capacity)
            .into_iter()
            .enumerate()
            .map(|(id, channels)| ProcessAgent::start(id, channels, guard.clone()))
            .collect();

        log::info(&format!(
            "Started {} processes around one resource.",
            config.peers
        ));

        Ok(Self {
            config,
            guard,
            agents,
        })
    }

    /// Runs every process' workload to completion and reports how the resource was used.
    pub async fn run(&self) -> Result<OccupancyReport, Box<dyn Error + Send + Sync>> {
        let barrier = Arc::new(Barrier::new(self.agents.len()));

        let workloads = self.agents.iter().map(|agent| {
            let agent = agent.clone();
            let barrier = Arc::clone(&barrier);
            let config = self.config.clone();

            tokio::spawn(async move { Self::workload(agent, barrier, config).await })
        });

        futures::future::try_join_all(workloads).await?;

        let report = self.guard.report();
        if !self.guard.grants_in_timestamp_order() {
            return Err("the resource was not granted in timestamp order".into());
        }
        log::info(&format!("Run finished: {report}."));

        Ok(report)
    }

    async fn workload(agent: ProcessAgent, barrier: Arc<Barrier>, config: HarnessConfig) {
        let mut poisson = match config.seed {
            Some(seed) => Poisson::new(config.rate, &process_seed(seed, agent.id())),
            None => Poisson::from_entropy(config.rate),
        };

        // wait for all processes to be ready
        barrier.wait().await;

        for _ in 0..config.rounds {
            tokio::time::sleep(poisson.delay_for_next_event()).await;

            agent.request().await;
            tokio::time::sleep(poisson.hold_time(config.hold_range())).await;
            agent.release().await;
        }
    }

    pub async fn shutdown(self) {
        for agent in &self.agents {
            agent.shutdown().await;
        }
    }
}
