// Simulated run of Lamport's mutual exclusion over an in-process mesh

use clap::Parser;
use color_print::cprintln;
use lamport_mutex::{log, Harness, HarnessConfig, DEFAULT_CAPACITY, RATE};
use std::{error::Error, time::Duration};

#[derive(Parser)]
#[command(name = "lamport-mutex")]
#[command(about = "Processes sharing one resource through Lamport's mutual exclusion", long_about = None)]
struct Cli {
    /// Number of processes in the mesh
    #[arg(short = 'n', long, default_value_t = 3)]
    peers: usize,

    /// Request/release cycles per process
    #[arg(short, long, default_value_t = 5)]
    rounds: usize,

    /// Capacity of every inbound channel
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Shortest time a process keeps the resource
    #[arg(long, default_value_t = 100)]
    min_hold_ms: u64,

    /// Longest time a process keeps the resource
    #[arg(long, default_value_t = 1000)]
    max_hold_ms: u64,

    /// Rate of the Poisson think time between cycles, per second
    #[arg(long, default_value_t = RATE)]
    rate: f64,

    /// Seed for a reproducible workload
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> HarnessConfig {
        HarnessConfig {
            peers: self.peers,
            rounds: self.rounds,
            capacity: self.capacity,
            min_hold: Duration::from_millis(self.min_hold_ms),
            max_hold: Duration::from_millis(self.max_hold_ms),
            rate: self.rate,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    log::init(cli.verbose);

    let harness = Harness::start(cli.config())?;
    let result = harness.run().await;
    harness.shutdown().await;

    match result {
        Ok(report) => {
            // straight to the terminal, the log subscriber escapes ANSI sequences
            cprintln!("<green, bold>Done:</green, bold> {report}.");
            Ok(())
        }
        Err(e) => {
            log::error(&format!("{e}"));
            Err(e)
        }
    }
}
