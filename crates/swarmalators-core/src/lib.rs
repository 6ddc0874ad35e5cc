//! Core types and tick pipeline for the swarmalators workspace.
//!
//! A swarmalator is a point agent carrying a 2D position and an oscillation
//! phase. Agents never see each other's true state directly: each one keeps a
//! private belief table that is refreshed per neighbor with a configurable
//! probability every tick, and derives its velocity and phase rate from that
//! possibly-stale table. The [`Environment`] drives the whole population
//! through one synchronized tick at a time against an immutable pre-tick
//! snapshot of the published state.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HALF_TURN: f64 = std::f64::consts::PI;
const FULL_TURN: f64 = std::f64::consts::TAU;

/// Floor applied to pairwise distances before any division.
///
/// Exactly coincident agents have a zero displacement vector, so the velocity
/// term comes out as zero rather than NaN; the phase term is bounded by
/// `sin(dphase) / MIN_SEPARATION` and vanishes when the phases agree too.
pub const MIN_SEPARATION: f64 = 1e-9;

/// Wraps a phase into the canonical interval (-PI, PI].
///
/// Non-finite inputs pass through unchanged so a corrupted phase reaches the
/// published arrays and trips the numeric-fault check, instead of being
/// silently reset to a finite value.
#[must_use]
pub fn wrap_phase(mut phase: f64) -> f64 {
    if !phase.is_finite() {
        return phase;
    }
    while phase <= -HALF_TURN {
        phase += FULL_TURN;
    }
    while phase > HALF_TURN {
        phase -= FULL_TURN;
    }
    phase
}

/// Plain 2D vector used for positions and velocities.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[must_use]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Component-wise scaling.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

/// Velocity and phase-rate contributions of one neighbor, per the coupling law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupling {
    pub velocity: Vec2,
    pub phase: f64,
}

/// Pairwise coupling law.
///
/// Given agent `i`'s state and its belief of agent `j`'s state, returns the
/// velocity contribution `(dpos / r) * (1 + j * cos(dphase)) - dpos / r^2`
/// and the phase contribution `sin(dphase) / r`. The phase-coupling strength
/// K is applied by the caller to the averaged sum, so the phase term here is
/// exactly antisymmetric under swapping the endpoints.
#[must_use]
pub fn couple(pos_i: Vec2, phase_i: f64, pos_j: Vec2, phase_j: f64, j: f64) -> Coupling {
    let dpos = pos_j - pos_i;
    let dphase = phase_j - phase_i;
    let r = dpos.norm().max(MIN_SEPARATION);
    let attraction = dpos.scaled((1.0 + j * dphase.cos()) / r);
    let repulsion = dpos.scaled(1.0 / (r * r));
    Coupling {
        velocity: attraction - repulsion,
        phase: dphase.sin() / r,
    }
}

/// Errors raised when validating simulation parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// Indicates an unrecognized memory initialization name.
    #[error("unknown memory initialization mode `{0}` (expected random, zeroes, or gradual)")]
    UnknownMemoryInit(String),
}

/// How agent belief tables (and therefore agents' own starting rows) are seeded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryInit {
    /// Random own state; beliefs about every other agent drawn independently.
    #[default]
    Random,
    /// Everything zeroed: every agent starts at the origin with phase 0 and
    /// believes the same of everyone else.
    Zeroes,
    /// Random own state; other agents are unknown until first observed.
    Gradual,
}

impl FromStr for MemoryInit {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "random" => Ok(Self::Random),
            "zeroes" => Ok(Self::Zeroes),
            "gradual" => Ok(Self::Gradual),
            other => Err(ConfigError::UnknownMemoryInit(other.to_string())),
        }
    }
}

impl fmt::Display for MemoryInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::Zeroes => "zeroes",
            Self::Gradual => "gradual",
        };
        f.write_str(name)
    }
}

/// Static configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmConfig {
    /// Number of swarmalators in the population (at least 2).
    pub count: usize,
    /// Euler step in simulated seconds.
    pub time_step: f64,
    /// Attraction strength: how phase similarity modulates spatial attraction.
    pub j: f64,
    /// Phase-coupling strength: how proximity drives synchronization.
    pub k: f64,
    /// Per-tick, per-neighbor probability of a belief refresh.
    pub coupling_probability: f64,
    /// Momentum factor carried over from the previous tick's velocity/phase rate.
    pub momentum: f64,
    /// Belief table initialization mode.
    pub memory_init: MemoryInit,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Whether per-tick frames are captured for sinks and in-memory history.
    pub logging: bool,
    /// Maximum number of frames retained in the in-memory history buffer.
    pub history_capacity: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            count: 100,
            time_step: 0.1,
            j: 0.1,
            k: 1.0,
            coupling_probability: 0.1,
            momentum: 0.0,
            memory_init: MemoryInit::Random,
            rng_seed: None,
            logging: false,
            history_capacity: 256,
        }
    }
}

impl SwarmConfig {
    /// Validates every parameter, rejecting values the tick pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count < 2 {
            return Err(ConfigError::Invalid("count must be at least 2"));
        }
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(ConfigError::Invalid("time_step must be positive and finite"));
        }
        if !self.j.is_finite() || !self.k.is_finite() {
            return Err(ConfigError::Invalid("J and K must be finite"));
        }
        if !(0.0..=1.0).contains(&self.coupling_probability) {
            return Err(ConfigError::Invalid(
                "coupling_probability must lie in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(ConfigError::Invalid("momentum must lie in [0, 1]"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// One remembered row of an agent's belief table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Belief {
    pub position: Vec2,
    pub phase: f64,
}

/// Canonical published state of the whole population, rebuilt once per tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SharedState {
    pub positions: Vec<Vec2>,
    pub phases: Vec<f64>,
    pub velocities: Vec<Vec2>,
}

impl SharedState {
    fn with_len(count: usize) -> Self {
        Self {
            positions: vec![Vec2::ZERO; count],
            phases: vec![0.0; count],
            velocities: vec![Vec2::ZERO; count],
        }
    }

    /// Number of published agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether every published scalar is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.positions.iter().all(|p| p.is_finite())
            && self.phases.iter().all(|p| p.is_finite())
            && self.velocities.iter().all(|v| v.is_finite())
    }
}

/// A single swarmalator: true state plus its private belief memory.
#[derive(Clone)]
pub struct Swarmalator {
    id: usize,
    position: Vec2,
    phase: f64,
    velocity: Vec2,
    phase_rate: f64,
    belief: Vec<Option<Belief>>,
    rng: SmallRng,
}

impl fmt::Debug for Swarmalator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swarmalator")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("phase", &self.phase)
            .field("velocity", &self.velocity)
            .field("phase_rate", &self.phase_rate)
            .field("known_neighbors", &self.known_neighbors())
            .finish()
    }
}

impl Swarmalator {
    fn new(id: usize, count: usize, memory_init: MemoryInit, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut belief: Vec<Option<Belief>> = vec![None; count];
        let own = match memory_init {
            MemoryInit::Zeroes => {
                belief.fill(Some(Belief::default()));
                Belief::default()
            }
            MemoryInit::Random => {
                for slot in belief.iter_mut() {
                    *slot = Some(Self::random_belief(&mut rng));
                }
                Self::random_belief(&mut rng)
            }
            MemoryInit::Gradual => Self::random_belief(&mut rng),
        };
        belief[id] = Some(own);
        Self {
            id,
            position: own.position,
            phase: own.phase,
            velocity: Vec2::ZERO,
            phase_rate: 0.0,
            belief,
            rng,
        }
    }

    fn random_belief(rng: &mut SmallRng) -> Belief {
        Belief {
            position: Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)),
            phase: wrap_phase(rng.random_range(-HALF_TURN..HALF_TURN)),
        }
    }

    /// Stable index of this agent, used as the row index into shared arrays.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    #[must_use]
    pub const fn phase(&self) -> f64 {
        self.phase
    }

    #[must_use]
    pub const fn velocity(&self) -> Vec2 {
        self.velocity
    }

    #[must_use]
    pub const fn phase_rate(&self) -> f64 {
        self.phase_rate
    }

    /// The agent's current belief table; `None` entries were never observed.
    #[must_use]
    pub fn belief(&self) -> &[Option<Belief>] {
        &self.belief
    }

    /// Number of belief rows known besides the agent's own.
    #[must_use]
    pub fn known_neighbors(&self) -> usize {
        self.belief
            .iter()
            .enumerate()
            .filter(|(idx, entry)| *idx != self.id && entry.is_some())
            .count()
    }

    /// Belief refresh: one independent draw per neighbor, refreshed from the
    /// pre-tick snapshot when the draw lands below `coupling_probability`.
    /// The agent's own row is refreshed unconditionally.
    pub fn scan(&mut self, snapshot: &SharedState, coupling_probability: f64) {
        for other in 0..self.belief.len() {
            if other == self.id {
                continue;
            }
            if self.rng.random::<f64>() < coupling_probability {
                self.belief[other] = Some(Belief {
                    position: snapshot.positions[other],
                    phase: snapshot.phases[other],
                });
            }
        }
        self.belief[self.id] = Some(Belief {
            position: self.position,
            phase: self.phase,
        });
    }

    /// Force aggregation over the belief table.
    ///
    /// Contributions are averaged over the count of known neighbors, not the
    /// population size. With zero known neighbors velocity and phase rate are
    /// left untouched.
    pub fn think(&mut self, j: f64, k: f64, momentum: f64) {
        let mut velocity_sum = Vec2::ZERO;
        let mut phase_sum = 0.0;
        let mut known = 0usize;
        for (other, entry) in self.belief.iter().enumerate() {
            if other == self.id {
                continue;
            }
            let Some(belief) = entry else {
                continue;
            };
            let contribution = couple(self.position, self.phase, belief.position, belief.phase, j);
            velocity_sum += contribution.velocity;
            phase_sum += contribution.phase;
            known += 1;
        }
        if known == 0 {
            return;
        }
        let inverse = 1.0 / known as f64;
        self.velocity = velocity_sum.scaled(inverse) + self.velocity.scaled(momentum);
        self.phase_rate = k * phase_sum * inverse + momentum * self.phase_rate;
    }

    /// Euler integration. Position is unbounded; phase wraps into (-PI, PI].
    pub fn integrate(&mut self, time_step: f64) {
        self.position += self.velocity.scaled(time_step);
        self.phase = wrap_phase(self.phase + self.phase_rate * time_step);
        self.belief[self.id] = Some(Belief {
            position: self.position,
            phase: self.phase,
        });
    }

    /// One full per-tick update: scan, think, integrate. All reads go through
    /// the caller-provided pre-tick snapshot; publishing back into the shared
    /// arrays is the environment's merge step.
    pub fn run(&mut self, snapshot: &SharedState, config: &SwarmConfig) {
        self.scan(snapshot, config.coupling_probability);
        self.think(config.j, config.k, config.momentum);
        self.integrate(config.time_step);
    }

    /// Write this agent's true state into the shared arrays at its row.
    pub fn publish(&self, shared: &mut SharedState) {
        shared.positions[self.id] = self.position;
        shared.phases[self.id] = self.phase;
        shared.velocities[self.id] = self.velocity;
    }

    fn place(&mut self, position: Vec2, phase: f64) {
        self.position = position;
        self.phase = wrap_phase(phase);
        self.belief[self.id] = Some(Belief {
            position: self.position,
            phase: self.phase,
        });
    }
}

/// Simulation clock (ticks processed since the run started).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Deep copy of the published state after one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickFrame {
    pub tick: Tick,
    pub sim_time: f64,
    pub positions: Vec<Vec2>,
    pub phases: Vec<f64>,
    pub velocities: Vec<Vec2>,
}

impl TickFrame {
    fn capture(tick: Tick, sim_time: f64, shared: &SharedState) -> Self {
        Self {
            tick,
            sim_time,
            positions: shared.positions.clone(),
            phases: shared.phases.clone(),
            velocities: shared.velocities.clone(),
        }
    }
}

/// Outcome of one environment tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    /// Set when a non-finite value reached the shared arrays. The tick is
    /// atomic, so this is fatal: callers must stop the run.
    pub numeric_fault: bool,
}

/// Per-tick frame consumer invoked after publish.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &TickFrame);
}

/// No-op frame sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&mut self, _frame: &TickFrame) {}
}

/// Population coordinator: owns the agents and the canonical shared arrays,
/// and drives exactly one synchronized tick per [`Environment::step`] call.
pub struct Environment {
    config: SwarmConfig,
    tick: Tick,
    sim_time: f64,
    agents: Vec<Swarmalator>,
    shared: SharedState,
    sink: Box<dyn FrameSink>,
    history: VecDeque<TickFrame>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("sim_time", &self.sim_time)
            .field("agent_count", &self.agents.len())
            .finish()
    }
}

impl Environment {
    /// Instantiate a new population using the supplied configuration.
    pub fn new(config: SwarmConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Instantiate a new population with a frame sink attached.
    pub fn with_sink(config: SwarmConfig, sink: Box<dyn FrameSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let agents = Self::spawn_population(&config, &mut rng);
        let mut shared = SharedState::with_len(config.count);
        for agent in &agents {
            agent.publish(&mut shared);
        }
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            sim_time: 0.0,
            agents,
            shared,
            sink,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    fn spawn_population(config: &SwarmConfig, rng: &mut SmallRng) -> Vec<Swarmalator> {
        (0..config.count)
            .map(|id| Swarmalator::new(id, config.count, config.memory_init, rng.random::<u64>()))
            .collect()
    }

    /// Re-instantiate the population from the stored configuration. With a
    /// fixed seed this reproduces the run from scratch.
    pub fn reset(&mut self) {
        let mut rng = self.config.seeded_rng();
        self.agents = Self::spawn_population(&self.config, &mut rng);
        self.shared = SharedState::with_len(self.config.count);
        for agent in &self.agents {
            agent.publish(&mut self.shared);
        }
        self.tick = Tick::zero();
        self.sim_time = 0.0;
        self.history.clear();
    }

    /// Overwrite one agent's true state (and published row) before a run.
    /// Returns `false` for an out-of-range id.
    pub fn place_agent(&mut self, id: usize, position: Vec2, phase: f64) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        agent.place(position, phase);
        agent.publish(&mut self.shared);
        true
    }

    /// Execute one synchronized tick.
    ///
    /// Every agent scans the same pre-tick snapshot; publishing happens only
    /// after all agents have finished, so update order cannot leak mid-tick
    /// state between agents.
    pub fn step(&mut self) -> TickReport {
        let snapshot = self.shared.clone();
        let config = &self.config;
        self.agents
            .par_iter_mut()
            .for_each(|agent| agent.run(&snapshot, config));
        for agent in &self.agents {
            agent.publish(&mut self.shared);
        }

        self.tick = self.tick.next();
        self.sim_time += self.config.time_step;

        let numeric_fault = !self.shared.is_finite();
        if numeric_fault {
            tracing::error!(
                tick = self.tick.0,
                "non-finite value published to shared state; run must stop"
            );
        }

        if self.config.logging {
            let frame = TickFrame::capture(self.tick, self.sim_time, &self.shared);
            self.sink.on_frame(&frame);
            if self.history.len() >= self.config.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(frame);
        }

        TickReport {
            tick: self.tick,
            numeric_fault,
        }
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Cumulative simulated time in seconds.
    #[must_use]
    pub const fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// The canonical published arrays as of the last completed tick.
    #[must_use]
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Read-only access to the agent population.
    #[must_use]
    pub fn agents(&self) -> &[Swarmalator] {
        &self.agents
    }

    /// Number of agents in the population.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Replace the frame sink.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = sink;
    }

    /// Iterate over retained frames, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickFrame> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_body_config() -> SwarmConfig {
        SwarmConfig {
            count: 2,
            time_step: 0.1,
            j: 0.0,
            k: 1.0,
            coupling_probability: 1.0,
            momentum: 0.0,
            memory_init: MemoryInit::Gradual,
            rng_seed: Some(7),
            ..SwarmConfig::default()
        }
    }

    #[test]
    fn wrap_phase_stays_in_half_open_interval() {
        assert_eq!(wrap_phase(0.0), 0.0);
        assert_eq!(wrap_phase(HALF_TURN), HALF_TURN);
        assert_eq!(wrap_phase(-HALF_TURN), HALF_TURN);
        assert!((wrap_phase(HALF_TURN + 0.25) - (-HALF_TURN + 0.25)).abs() < 1e-12);
        assert!((wrap_phase(-3.0 * HALF_TURN - 0.5) - (HALF_TURN - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn wrap_phase_passes_non_finite_values_through() {
        assert!(wrap_phase(f64::NAN).is_nan());
        assert_eq!(wrap_phase(f64::INFINITY), f64::INFINITY);
        assert_eq!(wrap_phase(f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn coupling_matches_hand_computed_two_body_case() {
        // dpos = (2, 0), r = 2, dphase = 0.
        let out = couple(Vec2::new(-1.0, 0.0), 0.0, Vec2::new(1.0, 0.0), 0.0, 0.5);
        assert!((out.velocity.x - (1.5 - 0.5)).abs() < 1e-15);
        assert_eq!(out.velocity.y, 0.0);
        assert_eq!(out.phase, 0.0);
    }

    #[test]
    fn coupling_phase_term_is_exactly_antisymmetric() {
        let cases = [
            ((0.3, -1.2, 0.4), (2.0, 0.7, -2.9)),
            ((-5.0, 2.5, 3.1), (1.5, 1.5, 3.0)),
            ((0.0, 0.0, 1.0), (0.001, 0.0, -1.0)),
        ];
        for ((xi, yi, pi), (xj, yj, pj)) in cases {
            let ij = couple(Vec2::new(xi, yi), pi, Vec2::new(xj, yj), pj, 0.8);
            let ji = couple(Vec2::new(xj, yj), pj, Vec2::new(xi, yi), pi, 0.8);
            assert_eq!(ij.phase, -ji.phase);
        }
    }

    #[test]
    fn coupling_handles_coincident_positions() {
        // Equal state on both sides is a fixed point.
        let same = couple(Vec2::new(1.0, 1.0), 0.3, Vec2::new(1.0, 1.0), 0.3, 2.0);
        assert_eq!(same.velocity, Vec2::ZERO);
        assert_eq!(same.phase, 0.0);

        // Coincident positions with differing phases: the epsilon floor keeps
        // everything finite and the zero displacement kills the velocity term.
        let mixed = couple(Vec2::new(1.0, 1.0), 0.3, Vec2::new(1.0, 1.0), -0.9, 2.0);
        assert_eq!(mixed.velocity, Vec2::ZERO);
        assert!(mixed.phase.is_finite());
        assert_eq!(mixed.phase, (-1.2f64).sin() / MIN_SEPARATION);
    }

    #[test]
    fn config_rejects_out_of_range_parameters() {
        let ok = SwarmConfig::default();
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.count = 1;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.time_step = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.time_step = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.coupling_probability = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.momentum = -0.1;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.history_capacity = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn memory_init_parses_known_names_only() {
        assert_eq!("random".parse::<MemoryInit>(), Ok(MemoryInit::Random));
        assert_eq!("zeroes".parse::<MemoryInit>(), Ok(MemoryInit::Zeroes));
        assert_eq!("gradual".parse::<MemoryInit>(), Ok(MemoryInit::Gradual));
        assert_eq!(
            "spiral".parse::<MemoryInit>(),
            Err(ConfigError::UnknownMemoryInit("spiral".to_string()))
        );
    }

    #[test]
    fn gradual_memory_starts_with_no_known_neighbors() {
        let agent = Swarmalator::new(2, 5, MemoryInit::Gradual, 99);
        assert_eq!(agent.known_neighbors(), 0);
        assert!(agent.belief()[2].is_some());
    }

    #[test]
    fn zeroes_memory_knows_everyone_at_origin() {
        let agent = Swarmalator::new(0, 4, MemoryInit::Zeroes, 1);
        assert_eq!(agent.known_neighbors(), 3);
        assert_eq!(agent.position(), Vec2::ZERO);
        assert_eq!(agent.phase(), 0.0);
        for entry in agent.belief() {
            assert_eq!(*entry, Some(Belief::default()));
        }
    }

    #[test]
    fn scan_with_zero_probability_never_refreshes() {
        let mut agent = Swarmalator::new(0, 3, MemoryInit::Gradual, 5);
        let mut snapshot = SharedState::with_len(3);
        snapshot.positions[1] = Vec2::new(4.0, 4.0);
        for _ in 0..200 {
            agent.scan(&snapshot, 0.0);
        }
        assert_eq!(agent.known_neighbors(), 0);
    }

    #[test]
    fn scan_with_full_probability_copies_snapshot_exactly() {
        let mut agent = Swarmalator::new(1, 3, MemoryInit::Gradual, 5);
        let mut snapshot = SharedState::with_len(3);
        snapshot.positions[0] = Vec2::new(-0.25, 0.75);
        snapshot.phases[0] = 1.5;
        snapshot.positions[2] = Vec2::new(2.0, -3.0);
        snapshot.phases[2] = -0.5;
        agent.scan(&snapshot, 1.0);
        assert_eq!(
            agent.belief()[0],
            Some(Belief {
                position: Vec2::new(-0.25, 0.75),
                phase: 1.5
            })
        );
        assert_eq!(
            agent.belief()[2],
            Some(Belief {
                position: Vec2::new(2.0, -3.0),
                phase: -0.5
            })
        );
    }

    #[test]
    fn think_without_known_neighbors_is_a_no_op() {
        let mut agent = Swarmalator::new(0, 4, MemoryInit::Gradual, 11);
        let before_velocity = agent.velocity();
        let before_rate = agent.phase_rate();
        agent.think(0.5, 2.0, 0.9);
        assert_eq!(agent.velocity(), before_velocity);
        assert_eq!(agent.phase_rate(), before_rate);
    }

    #[test]
    fn integrate_with_zero_time_step_changes_nothing() {
        let mut agent = Swarmalator::new(0, 2, MemoryInit::Random, 3);
        let position = agent.position();
        let phase = agent.phase();
        agent.integrate(0.0);
        assert_eq!(agent.position(), position);
        assert_eq!(agent.phase(), phase);
    }

    #[test]
    fn integrate_wraps_a_full_turn_back_to_start() {
        let mut agent = Swarmalator::new(0, 2, MemoryInit::Zeroes, 3);
        agent.place(Vec2::ZERO, 0.5);
        agent.phase_rate = FULL_TURN / 0.1;
        agent.integrate(0.1);
        assert!((agent.phase() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn environment_rejects_invalid_config() {
        let config = SwarmConfig {
            count: 1,
            ..SwarmConfig::default()
        };
        assert!(Environment::new(config).is_err());
    }

    #[test]
    fn two_body_boundary_scenario_produces_no_phase_change() {
        // Phases 0 and PI: sin(PI) vanishes, so maximal phase difference
        // produces no phase drift that tick, while J=0 still attracts.
        let mut env = Environment::new(two_body_config()).expect("environment");
        assert!(env.place_agent(0, Vec2::new(-1.0, 0.0), 0.0));
        assert!(env.place_agent(1, Vec2::new(1.0, 0.0), HALF_TURN));

        env.step();

        let shared = env.shared();
        assert!((shared.velocities[0].x - 0.5).abs() < 1e-12);
        assert!(shared.velocities[0].y.abs() < 1e-12);
        assert!((shared.velocities[1].x + 0.5).abs() < 1e-12);
        assert!((shared.phases[0]).abs() < 1e-12);
        assert!((shared.phases[1] - HALF_TURN).abs() < 1e-12);
        assert!((shared.positions[0].x + 0.95).abs() < 1e-12);
        assert!((shared.positions[1].x - 0.95).abs() < 1e-12);
    }

    #[test]
    fn published_rows_match_agent_state_after_tick() {
        let config = SwarmConfig {
            count: 5,
            coupling_probability: 0.7,
            rng_seed: Some(21),
            ..SwarmConfig::default()
        };
        let mut env = Environment::new(config).expect("environment");
        env.step();
        let shared = env.shared().clone();
        for agent in env.agents() {
            assert_eq!(shared.positions[agent.id()], agent.position());
            assert_eq!(shared.phases[agent.id()], agent.phase());
            assert_eq!(shared.velocities[agent.id()], agent.velocity());
            assert_eq!(
                agent.belief()[agent.id()],
                Some(Belief {
                    position: agent.position(),
                    phase: agent.phase()
                })
            );
        }
    }

    #[test]
    fn logging_appends_bounded_history() {
        let config = SwarmConfig {
            count: 3,
            logging: true,
            history_capacity: 4,
            rng_seed: Some(2),
            ..SwarmConfig::default()
        };
        let mut env = Environment::new(config).expect("environment");
        for _ in 0..6 {
            env.step();
        }
        let frames: Vec<&TickFrame> = env.history().collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.first().map(|f| f.tick), Some(Tick(3)));
        assert_eq!(frames.last().map(|f| f.tick), Some(Tick(6)));
    }
}
