//! In-memory configuration for a simulated line.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    ARRIVAL_JITTER_HIGH, ARRIVAL_JITTER_LOW, ARRIVAL_PRESSURE_GAIN, BASE_ARRIVAL_RATE,
    BOOTSTRAP_DELAY_SECS, CADENCE_FACTOR, DEFAULT_STATION_COUNT, DEFAULT_STATION_NAMES,
    DISPLAY_LOAD_CEILING, DWELL_TIME_SCALE, EXCHANGE_RATE, EXIT_OVERSHOOT, LINE_LENGTH,
    LOAD_DECAY_FACTOR, SPAWN_OFFSET, TRAIN_CAPACITY, TRAVEL_TIME_SCALE,
};
use crate::lever::{LeverConfig, LeverConfigOverlay};

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("lever {lever}: minimum {min:.2} exceeds maximum {max:.2}")]
    LeverBounds {
        lever: &'static str,
        min: f64,
        max: f64,
    },
    #[error("lever {lever}: {field} must be finite")]
    NonFinite {
        lever: &'static str,
        field: &'static str,
    },
    #[error("lever {lever}: weight must be non-negative (got {weight:.2})")]
    NegativeWeight { lever: &'static str, weight: f64 },
    #[error("lever {lever}: step must be positive (got {step:.2})")]
    NonPositiveStep { lever: &'static str, step: f64 },
    #[error("speed lever must stay above zero (minimum {min:.2})")]
    NonPositiveSpeed { min: f64 },
    #[error("a line needs at least one station")]
    NoStations,
    #[error("{names} station names supplied for {count} stations")]
    TooManyNames { names: usize, count: usize },
    #[error("{field} must be positive (got {value:.3})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.3})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("arrival jitter low {low:.2} exceeds high {high:.2}")]
    JitterBounds { low: f64, high: f64 },
    #[error("station geometry invalid: spawn offset {spawn:.1} must lie before the first station")]
    SpawnPastLine { spawn: f64 },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// The five named levers: four weighted policy levers plus the master automation domain.
///
/// Documents are read as overlays, so a partial lever entry keeps the rest of
/// that lever's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LeverTableOverlay")]
pub struct LeverTable {
    pub train_count: LeverConfig,
    pub interval: LeverConfig,
    pub stop_time: LeverConfig,
    pub speed: LeverConfig,
    pub automation: LeverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LeverTableOverlay {
    #[serde(default)]
    pub train_count: Option<LeverConfigOverlay>,
    #[serde(default)]
    pub interval: Option<LeverConfigOverlay>,
    #[serde(default)]
    pub stop_time: Option<LeverConfigOverlay>,
    #[serde(default)]
    pub speed: Option<LeverConfigOverlay>,
    #[serde(default)]
    pub automation: Option<LeverConfigOverlay>,
}

impl LeverTable {
    /// Merge a partial table onto this one, field by field.
    #[must_use]
    pub fn merge_overlay(&self, overlay: &LeverTableOverlay) -> Self {
        let merge = |base: &LeverConfig, entry: Option<&LeverConfigOverlay>| {
            entry.map_or_else(|| base.clone(), |entry| base.with_overlay(entry))
        };
        Self {
            train_count: merge(&self.train_count, overlay.train_count.as_ref()),
            interval: merge(&self.interval, overlay.interval.as_ref()),
            stop_time: merge(&self.stop_time, overlay.stop_time.as_ref()),
            speed: merge(&self.speed, overlay.speed.as_ref()),
            automation: merge(&self.automation, overlay.automation.as_ref()),
        }
    }
}

impl From<LeverTableOverlay> for LeverTable {
    fn from(overlay: LeverTableOverlay) -> Self {
        Self::default().merge_overlay(&overlay)
    }
}

impl Default for LeverTable {
    fn default() -> Self {
        Self {
            train_count: LeverConfig::train_count(),
            interval: LeverConfig::interval(),
            stop_time: LeverConfig::stop_time(),
            speed: LeverConfig::speed(),
            automation: LeverConfig::automation(),
        }
    }
}

impl LeverTable {
    fn entries(&self) -> [(&'static str, &LeverConfig); 5] {
        [
            ("train", &self.train_count),
            ("interval", &self.interval),
            ("stop_time", &self.stop_time),
            ("speed", &self.speed),
            ("automation", &self.automation),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (lever, cfg) in self.entries() {
            for (field, value) in [
                ("min", cfg.min),
                ("max", cfg.max),
                ("step", cfg.step),
                ("weight", cfg.weight),
            ] {
                if !value.is_finite() {
                    return Err(ConfigError::NonFinite { lever, field });
                }
            }
            if cfg.min > cfg.max {
                return Err(ConfigError::LeverBounds {
                    lever,
                    min: cfg.min,
                    max: cfg.max,
                });
            }
            if cfg.weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    lever,
                    weight: cfg.weight,
                });
            }
            if cfg.step <= 0.0 {
                return Err(ConfigError::NonPositiveStep {
                    lever,
                    step: cfg.step,
                });
            }
        }
        if self.speed.min <= 0.0 {
            return Err(ConfigError::NonPositiveSpeed {
                min: self.speed.min,
            });
        }
        Ok(())
    }
}

/// Line topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default = "LineConfig::default_station_count")]
    pub station_count: usize,
    #[serde(default)]
    pub station_names: Vec<String>,
    #[serde(default = "LineConfig::default_line_length")]
    pub line_length: f64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            station_count: Self::default_station_count(),
            station_names: Self::default_station_names(),
            line_length: Self::default_line_length(),
        }
    }
}

impl LineConfig {
    const fn default_station_count() -> usize {
        DEFAULT_STATION_COUNT
    }

    fn default_station_names() -> Vec<String> {
        DEFAULT_STATION_NAMES.iter().map(ToString::to_string).collect()
    }

    const fn default_line_length() -> f64 {
        LINE_LENGTH
    }

    /// A line of `count` stations named by position.
    #[must_use]
    pub fn with_stations(count: usize) -> Self {
        Self {
            station_count: count,
            station_names: Vec::new(),
            line_length: LINE_LENGTH,
        }
    }

    /// Station name, falling back to a one-based label.
    #[must_use]
    pub fn station_name(&self, index: usize) -> String {
        self.station_names
            .get(index)
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("Station {}", index + 1))
    }
}

/// Named tuning constants for timing, flow and boarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "TuningConfig::default_bootstrap_delay")]
    pub bootstrap_delay: f64,
    #[serde(default = "TuningConfig::default_cadence_factor")]
    pub cadence_factor: f64,
    #[serde(default = "TuningConfig::default_travel_time_scale")]
    pub travel_time_scale: f64,
    #[serde(default = "TuningConfig::default_dwell_time_scale")]
    pub dwell_time_scale: f64,
    #[serde(default = "TuningConfig::default_spawn_offset")]
    pub spawn_offset: f64,
    #[serde(default = "TuningConfig::default_exit_overshoot")]
    pub exit_overshoot: f64,
    #[serde(default = "TuningConfig::default_base_arrival")]
    pub base_arrival: f64,
    #[serde(default = "TuningConfig::default_pressure_gain")]
    pub arrival_pressure_gain: f64,
    #[serde(default = "TuningConfig::default_decay_factor")]
    pub decay_factor: f64,
    #[serde(default = "TuningConfig::default_jitter_low")]
    pub jitter_low: f64,
    #[serde(default = "TuningConfig::default_jitter_high")]
    pub jitter_high: f64,
    #[serde(default = "TuningConfig::default_capacity")]
    pub capacity: f64,
    #[serde(default = "TuningConfig::default_exchange_rate")]
    pub exchange_rate: f64,
    #[serde(default = "TuningConfig::default_display_load_ceiling")]
    pub display_load_ceiling: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            bootstrap_delay: Self::default_bootstrap_delay(),
            cadence_factor: Self::default_cadence_factor(),
            travel_time_scale: Self::default_travel_time_scale(),
            dwell_time_scale: Self::default_dwell_time_scale(),
            spawn_offset: Self::default_spawn_offset(),
            exit_overshoot: Self::default_exit_overshoot(),
            base_arrival: Self::default_base_arrival(),
            arrival_pressure_gain: Self::default_pressure_gain(),
            decay_factor: Self::default_decay_factor(),
            jitter_low: Self::default_jitter_low(),
            jitter_high: Self::default_jitter_high(),
            capacity: Self::default_capacity(),
            exchange_rate: Self::default_exchange_rate(),
            display_load_ceiling: Self::default_display_load_ceiling(),
        }
    }
}

impl TuningConfig {
    const fn default_bootstrap_delay() -> f64 {
        BOOTSTRAP_DELAY_SECS
    }

    const fn default_cadence_factor() -> f64 {
        CADENCE_FACTOR
    }

    const fn default_travel_time_scale() -> f64 {
        TRAVEL_TIME_SCALE
    }

    const fn default_dwell_time_scale() -> f64 {
        DWELL_TIME_SCALE
    }

    const fn default_spawn_offset() -> f64 {
        SPAWN_OFFSET
    }

    const fn default_exit_overshoot() -> f64 {
        EXIT_OVERSHOOT
    }

    const fn default_base_arrival() -> f64 {
        BASE_ARRIVAL_RATE
    }

    const fn default_pressure_gain() -> f64 {
        ARRIVAL_PRESSURE_GAIN
    }

    const fn default_decay_factor() -> f64 {
        LOAD_DECAY_FACTOR
    }

    const fn default_jitter_low() -> f64 {
        ARRIVAL_JITTER_LOW
    }

    const fn default_jitter_high() -> f64 {
        ARRIVAL_JITTER_HIGH
    }

    const fn default_capacity() -> f64 {
        TRAIN_CAPACITY
    }

    const fn default_exchange_rate() -> f64 {
        EXCHANGE_RATE
    }

    const fn default_display_load_ceiling() -> f64 {
        DISPLAY_LOAD_CEILING
    }

    /// Passengers a train can take on during one stop.
    #[must_use]
    pub fn boarding_limit(&self, stop_time: f64) -> f64 {
        self.capacity.min(self.exchange_rate * stop_time).max(0.0)
    }

    #[must_use]
    pub fn travel_duration(&self, distance: f64, speed: f64) -> f64 {
        if distance <= 0.0 {
            return 0.0;
        }
        distance / speed * self.travel_time_scale
    }

    #[must_use]
    pub fn dwell_duration(&self, stop_time: f64) -> f64 {
        (stop_time * self.dwell_time_scale).max(0.0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tuning.cadence_factor", self.cadence_factor),
            ("tuning.travel_time_scale", self.travel_time_scale),
            ("tuning.capacity", self.capacity),
            ("tuning.exchange_rate", self.exchange_rate),
            ("tuning.display_load_ceiling", self.display_load_ceiling),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("tuning.bootstrap_delay", self.bootstrap_delay),
            ("tuning.dwell_time_scale", self.dwell_time_scale),
            ("tuning.exit_overshoot", self.exit_overshoot),
            ("tuning.base_arrival", self.base_arrival),
            ("tuning.arrival_pressure_gain", self.arrival_pressure_gain),
            ("tuning.jitter_low", self.jitter_low),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::RangeViolation {
                    field,
                    min: 0.0,
                    max: f64::MAX,
                    value,
                });
            }
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(ConfigError::RangeViolation {
                field: "tuning.decay_factor",
                min: 0.0,
                max: 1.0,
                value: self.decay_factor,
            });
        }
        if !self.jitter_high.is_finite() || self.jitter_low > self.jitter_high {
            return Err(ConfigError::JitterBounds {
                low: self.jitter_low,
                high: self.jitter_high,
            });
        }
        Ok(())
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SimConfig {
    #[serde(default)]
    pub levers: LeverTable,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl SimConfig {
    /// Parse a configuration document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every configuration invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.levers.validate()?;
        self.tuning.validate()?;
        if self.line.station_count == 0 {
            return Err(ConfigError::NoStations);
        }
        if self.line.station_names.len() > self.line.station_count {
            return Err(ConfigError::TooManyNames {
                names: self.line.station_names.len(),
                count: self.line.station_count,
            });
        }
        if !(self.line.line_length.is_finite() && self.line.line_length > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "line.line_length",
                value: self.line.line_length,
            });
        }
        if !self.tuning.spawn_offset.is_finite() || self.tuning.spawn_offset > 0.0 {
            return Err(ConfigError::SpawnPastLine {
                spawn: self.tuning.spawn_offset,
            });
        }
        Ok(())
    }
}
