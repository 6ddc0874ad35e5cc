//! Recorded-run persistence for swarmalator simulations.
//!
//! A [`Dataset`] bundles the configuration of a run with every recorded
//! [`TickFrame`] and round-trips through a compact binary file without losing
//! a single bit of the numeric payload. [`Preset`] covers the legacy
//! short-key JSON parameter files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::{fs, io};
use swarmalators_core::{FrameSink, MemoryInit, SwarmConfig, TickFrame};
use thiserror::Error;

/// Errors raised while saving or loading run artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("dataset codec error: {0}")]
    Codec(#[from] postcard::Error),
    #[error("preset error: {0}")]
    Preset(#[from] serde_json::Error),
}

/// A complete recorded run: configuration plus one frame per tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub config: SwarmConfig,
    pub frames: Vec<TickFrame>,
}

impl Dataset {
    /// Cumulative simulated time covered by the recording.
    #[must_use]
    pub fn sim_time(&self) -> f64 {
        self.frames.last().map_or(0.0, |frame| frame.sim_time)
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serialize the dataset to `path` as postcard bytes.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a dataset previously written by [`Dataset::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let bytes = fs::read(path)?;
        Ok(postcard::from_bytes(&bytes)?)
    }
}

/// Append-only in-memory frame log, filled through a [`SharedRecorder`].
#[derive(Debug, Default)]
pub struct Recorder {
    frames: Vec<TickFrame>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames recorded so far, oldest first.
    #[must_use]
    pub fn frames(&self) -> &[TickFrame] {
        &self.frames
    }

    /// Discard everything recorded so far.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Consume the recorder into a dataset for the given configuration.
    #[must_use]
    pub fn into_dataset(self, config: SwarmConfig) -> Dataset {
        Dataset {
            config,
            frames: self.frames,
        }
    }
}

/// Frame sink handing each frame to a shared [`Recorder`], so the caller can
/// keep a handle to the recording while the environment owns the sink.
pub struct SharedRecorder {
    inner: Arc<Mutex<Recorder>>,
}

impl SharedRecorder {
    #[must_use]
    pub fn new(inner: Arc<Mutex<Recorder>>) -> Self {
        Self { inner }
    }
}

impl FrameSink for SharedRecorder {
    fn on_frame(&mut self, frame: &TickFrame) {
        if let Ok(mut recorder) = self.inner.lock() {
            recorder.frames.push(frame.clone());
        }
    }
}

/// Legacy short-key JSON parameter preset (`n`, `i`, `dt`, `cp`, `j`, `k`, `a`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    #[serde(rename = "n")]
    pub count: usize,
    #[serde(rename = "i")]
    pub memory_init: MemoryInit,
    #[serde(rename = "dt")]
    pub time_step: f64,
    #[serde(rename = "cp")]
    pub coupling_probability: f64,
    #[serde(rename = "j")]
    pub j: f64,
    #[serde(rename = "k")]
    pub k: f64,
    #[serde(rename = "a")]
    pub momentum: f64,
}

impl Preset {
    /// Capture the preset-covered parameters of a configuration.
    #[must_use]
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            count: config.count,
            memory_init: config.memory_init,
            time_step: config.time_step,
            coupling_probability: config.coupling_probability,
            j: config.j,
            k: config.k,
            momentum: config.momentum,
        }
    }

    /// Expand the preset into a full configuration, leaving the parameters a
    /// preset does not cover (seed, logging, history) at their defaults.
    #[must_use]
    pub fn into_config(self) -> SwarmConfig {
        SwarmConfig {
            count: self.count,
            memory_init: self.memory_init,
            time_step: self.time_step,
            coupling_probability: self.coupling_probability,
            j: self.j,
            k: self.k,
            momentum: self.momentum,
            ..SwarmConfig::default()
        }
    }

    /// Default file stem encoding every parameter, matching the legacy naming
    /// scheme (`<n>_<init>_<dt>_<cp>_<j>_<k>_<a>`).
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.count,
            self.memory_init,
            self.time_step,
            self.coupling_probability,
            self.j,
            self.k,
            self.momentum
        )
    }

    /// Write the preset to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a preset from a JSON file. Unknown memory-init names are a hard
    /// error, never a silent fallback.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Mean published speed per recorded tick.
#[must_use]
pub fn average_speed_series(dataset: &Dataset) -> Vec<f64> {
    dataset
        .frames
        .iter()
        .map(|frame| {
            if frame.velocities.is_empty() {
                0.0
            } else {
                let total: f64 = frame.velocities.iter().map(|v| v.norm()).sum();
                total / frame.velocities.len() as f64
            }
        })
        .collect()
}
