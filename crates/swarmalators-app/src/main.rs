use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use swarmalators_core::{Environment, MemoryInit, SwarmConfig};
use swarmalators_storage::{Preset, Recorder, SharedRecorder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Headless swarmalator simulation runner.
#[derive(Debug, Parser)]
#[command(name = "swarmalators", version, about)]
struct Args {
    /// Number of agents in the swarm.
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Simulated seconds advanced per tick.
    #[arg(long, default_value_t = 0.1)]
    time_step: f64,

    /// Phase-to-space coupling strength (J).
    #[arg(long, default_value_t = 0.1)]
    j: f64,

    /// Phase coupling strength (K).
    #[arg(long, default_value_t = 1.0)]
    k: f64,

    /// Per-neighbor probability of a belief refresh each tick.
    #[arg(long, default_value_t = 0.1)]
    coupling_probability: f64,

    /// Fraction of the previous derivative carried into the next tick.
    #[arg(long, default_value_t = 0.0)]
    momentum: f64,

    /// Belief seeding strategy: random, zeroes, or gradual.
    #[arg(long, default_value = "random")]
    memory_init: MemoryInit,

    /// Seed for deterministic runs; omitted means entropy-seeded.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop once this much simulated time has elapsed; 0 disables the bound.
    #[arg(long)]
    max_time: Option<f64>,

    /// Record every tick and write the dataset here on exit.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Load parameters from a preset JSON file, overriding the flags above.
    #[arg(long)]
    preset: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(SwarmConfig, Option<f64>, Option<PathBuf>)> {
        let mut config = if let Some(path) = &self.preset {
            let preset = Preset::load(path)
                .with_context(|| format!("loading preset {}", path.display()))?;
            preset.into_config()
        } else {
            SwarmConfig {
                count: self.count,
                time_step: self.time_step,
                j: self.j,
                k: self.k,
                coupling_probability: self.coupling_probability,
                momentum: self.momentum,
                memory_init: self.memory_init,
                ..SwarmConfig::default()
            }
        };
        config.rng_seed = self.seed;
        config.logging = self.output.is_some();
        Ok((config, self.max_time, self.output))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let (config, max_time, output) = args.into_config()?;

    let recorder = Arc::new(Mutex::new(Recorder::new()));
    let env = if config.logging {
        let sink = SharedRecorder::new(Arc::clone(&recorder));
        Environment::with_sink(config.clone(), Box::new(sink))?
    } else {
        Environment::new(config.clone())?
    };

    let mut scheduler = swarmalators_app::Scheduler::new(env, max_time);
    scheduler.run();

    if let Some(path) = output {
        let frames = recorder
            .lock()
            .expect("recorder mutex poisoned")
            .frames()
            .to_vec();
        let dataset = swarmalators_storage::Dataset { config, frames };
        dataset
            .save(&path)
            .with_context(|| format!("writing dataset {}", path.display()))?;
        info!(path = %path.display(), ticks = dataset.len(), "dataset written");
    }

    Ok(())
}
