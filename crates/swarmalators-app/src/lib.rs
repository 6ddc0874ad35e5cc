//! Headless time-stepping loop for swarmalator simulations.
//!
//! The [`Scheduler`] owns an [`Environment`] and paces its ticks against wall
//! clock time so one tick lands roughly every `time_step` seconds. Pause and
//! stop requests arrive through a cloneable [`SchedulerControl`] handle and
//! take effect only at tick boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use swarmalators_core::{Environment, TickReport};
use tracing::{error, info};

/// Lower bound on the inter-tick delay, so the loop never busy-spins even
/// when a tick overruns its wall-clock budget.
const MIN_TICK_DELAY: Duration = Duration::from_millis(1);

/// Shared pause/stop flags, flippable from any thread.
#[derive(Debug, Clone, Default)]
pub struct SchedulerControl {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl SchedulerControl {
    /// Suspend ticking at the next tick boundary.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume a paused run.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// End the run at the next tick boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Fixed-step simulation loop with wall-clock pacing.
#[derive(Debug)]
pub struct Scheduler {
    env: Environment,
    control: SchedulerControl,
    max_sim_time: Option<f64>,
    iteration: u64,
    last_compute: Duration,
}

impl Scheduler {
    /// Wrap an environment. A `max_sim_time` of `None` or any non-positive
    /// value means no bound: the loop runs until stopped.
    #[must_use]
    pub fn new(env: Environment, max_sim_time: Option<f64>) -> Self {
        Self {
            env,
            control: SchedulerControl::default(),
            max_sim_time: max_sim_time.filter(|limit| *limit > 0.0),
            iteration: 0,
            last_compute: Duration::ZERO,
        }
    }

    /// Handle for pausing/stopping this scheduler from another thread.
    #[must_use]
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    /// The driven environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Cumulative simulated time in seconds.
    #[must_use]
    pub fn sim_time(&self) -> f64 {
        self.env.sim_time()
    }

    /// Wall-clock duration of the most recent tick's computation.
    #[must_use]
    pub const fn last_compute_time(&self) -> Duration {
        self.last_compute
    }

    fn tick_budget(&self) -> Duration {
        Duration::from_secs_f64(self.env.config().time_step)
    }

    fn reached_time_bound(&self) -> bool {
        // "Reached" with a half-step tolerance so accumulated floating error
        // in sim_time cannot add or drop a tick.
        self.max_sim_time
            .is_some_and(|limit| limit - self.env.sim_time() < self.env.config().time_step * 0.5)
    }

    /// Advance exactly one tick, ignoring pacing and control flags.
    pub fn advance_once(&mut self) -> TickReport {
        let start = Instant::now();
        let report = self.env.step();
        self.last_compute = start.elapsed();
        self.iteration += 1;
        report
    }

    /// Drive the environment until stopped, faulted, or out of simulated time.
    ///
    /// Each pass sleeps `max(time_step - compute_time, 1ms)` so the tick rate
    /// tracks the configured step as closely as wall clock allows.
    pub fn run(&mut self) {
        info!(
            agents = self.env.agent_count(),
            time_step = self.env.config().time_step,
            max_sim_time = self.max_sim_time,
            "starting simulation loop"
        );

        loop {
            if self.control.is_stopped() {
                break;
            }
            if self.reached_time_bound() {
                self.control.stop();
                break;
            }
            if self.control.is_paused() {
                thread::sleep(self.tick_budget().max(MIN_TICK_DELAY));
                continue;
            }

            let report = self.advance_once();
            if report.numeric_fault {
                error!(tick = report.tick.0, "stopping after numeric fault");
                self.control.stop();
                break;
            }

            let delay = self
                .tick_budget()
                .saturating_sub(self.last_compute)
                .max(MIN_TICK_DELAY);
            thread::sleep(delay);
        }

        info!(
            iterations = self.iteration,
            sim_time = self.env.sim_time(),
            "simulation loop finished"
        );
    }

    /// Consume the scheduler, returning the environment for post-run access.
    #[must_use]
    pub fn into_environment(self) -> Environment {
        self.env
    }
}
