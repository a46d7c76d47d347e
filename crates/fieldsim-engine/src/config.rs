//! Simulation configuration
//!
//! Step size, snapshot cadence and playback pacing. Every setter clamps to a
//! usable range instead of failing, so a config is always valid once built.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Settings shared by the simulator and the playback controller
///
/// # Example
///
/// ```
/// use fieldsim_engine::SimConfig;
///
/// let config = SimConfig::default().with_dt(0.01).with_backup_frequency(0);
/// assert_eq!(config.dt(), 0.01);
/// assert_eq!(config.backup_frequency(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Integration step in seconds
    dt: f64,
    /// A snapshot is taken every this many steps
    backup_frequency: u32,
    /// Simulated seconds per wall-clock second
    playback_speed: f64,
    /// Steps allowed per rendered frame before time is discarded
    max_steps_per_frame: u32,
    /// Longest frame delta accepted, in seconds
    max_frame_seconds: f64,
}

const MIN_DT: f64 = 1e-9;

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 128.0,
            backup_frequency: 30,
            playback_speed: 1.0,
            max_steps_per_frame: 10,
            max_frame_seconds: 0.1,
        }
    }
}

impl SimConfig {
    /// Load a config from RON text; missing fields take their defaults
    pub fn from_ron(source: &str) -> Result<Self> {
        let config: SimConfig = ron::from_str(source)?;
        Ok(config.sanitized())
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Clamp every field into range
    fn sanitized(self) -> Self {
        Self::default()
            .with_dt(self.dt)
            .with_backup_frequency(self.backup_frequency)
            .with_playback_speed(self.playback_speed)
            .with_max_steps_per_frame(self.max_steps_per_frame)
            .with_max_frame_seconds(self.max_frame_seconds)
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.set_dt(dt);
        self
    }

    pub fn with_backup_frequency(mut self, n: u32) -> Self {
        self.set_backup_frequency(n);
        self
    }

    pub fn with_playback_speed(mut self, speed: f64) -> Self {
        self.set_playback_speed(speed);
        self
    }

    pub fn with_max_steps_per_frame(mut self, n: u32) -> Self {
        self.max_steps_per_frame = n.max(1);
        self
    }

    pub fn with_max_frame_seconds(mut self, seconds: f64) -> Self {
        self.max_frame_seconds = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            Self::default().max_frame_seconds
        };
        self
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Set the step size; non-finite or non-positive values fall back to the
    /// smallest accepted step
    pub fn set_dt(&mut self, dt: f64) {
        self.dt = if dt.is_finite() { dt.max(MIN_DT) } else { Self::default().dt };
    }

    pub fn backup_frequency(&self) -> u32 {
        self.backup_frequency
    }

    pub fn set_backup_frequency(&mut self, n: u32) {
        self.backup_frequency = n.max(1);
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn set_playback_speed(&mut self, speed: f64) {
        self.playback_speed = if speed.is_finite() { speed.max(0.0) } else { 1.0 };
    }

    pub fn max_steps_per_frame(&self) -> u32 {
        self.max_steps_per_frame
    }

    pub fn max_frame_seconds(&self) -> f64 {
        self.max_frame_seconds
    }
}
