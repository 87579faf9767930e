//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Trigger cadences and implicit perception timeouts live here
//! rather than in the engine.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for one engine session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Polling cadence of condition triggers.
    pub condition_poll_ms: u64,
    /// Polling cadence of priority triggers.
    pub priority_poll_ms: u64,
    /// Minimum time between two firings of one priority trigger.
    pub priority_cooldown_ms: u64,
    /// Condition trigger cooldown when the script gives none.
    pub default_cooldown_ms: u64,
    /// Implicit wait for image checks; 0 looks once.
    pub vision_timeout_ms: u64,
    /// Implicit wait for text checks and text clicks.
    pub text_check_timeout_ms: u64,
    /// Timeout of text waits that do not name one.
    pub text_wait_timeout_ms: u64,
    /// Polling cadence inside waits.
    pub wait_poll_ms: u64,
    /// Timestamp drift that triggers a warning.
    pub drift_warning_ms: u64,
    /// Zero-delay instructions a cursor may run before yielding 1 ms.
    pub max_steps_per_tick: u32,
    /// Keep an execution trace in the run report.
    pub record_trace: bool,
    /// Replay speed, repetition and time limit.
    pub playback: PlaybackOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            condition_poll_ms: 200,
            priority_poll_ms: 300,
            priority_cooldown_ms: 2_000,
            default_cooldown_ms: 5_000,
            vision_timeout_ms: 0,
            text_check_timeout_ms: 10_000,
            text_wait_timeout_ms: 10_000,
            wait_poll_ms: 100,
            drift_warning_ms: 1_000,
            max_steps_per_tick: 10_000,
            record_trace: false,
            playback: PlaybackOptions::default(),
        }
    }
}

/// Playback controls applied on top of the script's own timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// Speed multiplier; delays are divided by it.
    pub speed: f64,
    /// How many times the main script runs.
    pub repeat: Repeat,
    /// Pause between two rounds.
    pub repeat_interval_ms: u64,
    /// Hard limit on the logical duration of the run.
    pub time_limit_ms: Option<u64>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: Repeat::Times(1),
            repeat_interval_ms: 0,
            time_limit_ms: None,
        }
    }
}

impl PlaybackOptions {
    /// Scale a declared delay by the playback speed.
    pub fn scale(&self, delay_ms: u64) -> u64 {
        if delay_ms == 0 || self.speed == 1.0 {
            return delay_ms;
        }
        (delay_ms as f64 / self.speed).round() as u64
    }
}

/// Number of rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    /// A fixed number of rounds.
    Times(u32),
    /// Until stopped or the time limit is reached.
    Forever,
}

impl Repeat {
    /// Whether another round follows `completed` finished rounds.
    pub fn continues_after(self, completed: u32) -> bool {
        match self {
            Self::Times(total) => completed < total,
            Self::Forever => true,
        }
    }
}

/// Values the engine refuses to run with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Speed must be a positive finite number.
    #[error("playback speed must be positive, got {0}")]
    InvalidSpeed(f64),

    /// `Repeat::Times(0)` would never run.
    #[error("repeat count must be at least 1")]
    ZeroRepeat,

    /// Cadences and step budgets of zero would stall the scheduler.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl EngineConfig {
    /// Check values that would make a session misbehave.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let speed = self.playback.speed;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ConfigError::InvalidSpeed(speed));
        }
        if self.playback.repeat == Repeat::Times(0) {
            return Err(ConfigError::ZeroRepeat);
        }
        let cadences = [
            ("condition_poll_ms", self.condition_poll_ms),
            ("priority_poll_ms", self.priority_poll_ms),
            ("wait_poll_ms", self.wait_poll_ms),
            ("max_steps_per_tick", u64::from(self.max_steps_per_tick)),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }

    /// Load a configuration file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_slice(&data)
            .context("Failed to deserialize config")?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, replacing the file atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write config")?;
        file.sync_all().context("Failed to sync config")?;
        drop(file);

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");

        let mut config = EngineConfig::default();
        config.condition_poll_ms = 50;
        config.record_trace = true;
        config.playback.repeat = Repeat::Forever;
        config.playback.time_limit_ms = Some(60_000);
        config.write(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        fs::write(&path, r#"{ "default_cooldown_ms": 1000, "playback": { "speed": 2.0 } }"#).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.default_cooldown_ms, 1_000);
        assert_eq!(loaded.playback.speed, 2.0);
        assert_eq!(loaded.playback.repeat, Repeat::Times(1));
        assert_eq!(loaded.priority_poll_ms, 300);
    }

    #[test]
    fn rejects_unusable_values() {
        let mut config = EngineConfig::default();
        config.playback.speed = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSpeed(0.0)));

        let mut config = EngineConfig::default();
        config.playback.repeat = Repeat::Times(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroRepeat));

        let mut config = EngineConfig::default();
        config.wait_poll_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("wait_poll_ms")));

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, r#"{ "playback": { "speed": -1.0 } }"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn speed_scales_delays() {
        let mut playback = PlaybackOptions::default();
        assert_eq!(playback.scale(500), 500);
        playback.speed = 2.0;
        assert_eq!(playback.scale(500), 250);
        playback.speed = 0.5;
        assert_eq!(playback.scale(500), 1_000);
    }

    #[test]
    fn repeat_counts_rounds() {
        assert!(Repeat::Times(2).continues_after(1));
        assert!(!Repeat::Times(2).continues_after(2));
        assert!(Repeat::Forever.continues_after(u32::MAX));
    }
}
