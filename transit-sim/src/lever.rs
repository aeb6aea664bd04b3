//! Policy levers: one configurable control per operating dimension.
use serde::{Deserialize, Serialize};

use crate::constants::{AUTOMATION_MAX, AUTOMATION_MIN};
use crate::curve::CurveKind;

/// Identifier for the four weighted policy levers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverId {
    TrainCount,
    Interval,
    StopTime,
    Speed,
}

impl LeverId {
    pub const ALL: [Self; 4] = [Self::TrainCount, Self::Interval, Self::StopTime, Self::Speed];

    /// Lever the master automation value is recovered from.
    pub const REFERENCE: Self = Self::TrainCount;

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::TrainCount => "train",
            Self::Interval => "interval",
            Self::StopTime => "stop_time",
            Self::Speed => "speed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "train" | "train_count" | "trains" => Some(Self::TrainCount),
            "interval" => Some(Self::Interval),
            "stop_time" | "stop" | "dwell" => Some(Self::StopTime),
            "speed" => Some(Self::Speed),
            _ => None,
        }
    }
}

/// Which end of the domain a lever starts at when the line opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartAt {
    #[default]
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverConfig {
    pub min: f64,
    pub max: f64,
    #[serde(default = "LeverConfig::default_step")]
    pub step: f64,
    #[serde(default)]
    pub weight: f64,
    /// Higher raw values relieve less pressure.
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub curve: CurveKind,
    /// The automation chart runs from `max` down to `min`.
    #[serde(default)]
    pub chart_inverted: bool,
    #[serde(default)]
    pub start: StartAt,
}

impl LeverConfig {
    const fn default_step() -> f64 {
        1.0
    }

    #[must_use]
    pub const fn range(&self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub const fn start_value(&self) -> f64 {
        match self.start {
            StartAt::Min => self.min,
            StartAt::Max => self.max,
        }
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.start_value();
        }
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }

    #[must_use]
    pub fn train_count() -> Self {
        Self {
            min: 2.0,
            max: 8.0,
            step: 1.0,
            weight: 0.4,
            inverse: false,
            curve: CurveKind::EaseOutCubic,
            chart_inverted: false,
            start: StartAt::Min,
        }
    }

    #[must_use]
    pub fn interval() -> Self {
        Self {
            min: 2.0,
            max: 8.0,
            step: 1.0,
            weight: 0.3,
            inverse: true,
            curve: CurveKind::EaseInOutSine,
            chart_inverted: true,
            start: StartAt::Max,
        }
    }

    #[must_use]
    pub fn stop_time() -> Self {
        Self {
            min: 2.0,
            max: 5.0,
            step: 0.5,
            weight: 0.15,
            inverse: false,
            curve: CurveKind::EaseInCubic,
            chart_inverted: false,
            start: StartAt::Min,
        }
    }

    #[must_use]
    pub fn speed() -> Self {
        Self {
            min: 80.0,
            max: 100.0,
            step: 5.0,
            weight: 0.15,
            inverse: true,
            curve: CurveKind::Linear,
            chart_inverted: false,
            start: StartAt::Min,
        }
    }

    /// Domain of the master automation value. Carries no weight.
    #[must_use]
    pub fn automation() -> Self {
        Self {
            min: AUTOMATION_MIN,
            max: AUTOMATION_MAX,
            step: 1.0,
            weight: 0.0,
            inverse: false,
            curve: CurveKind::Linear,
            chart_inverted: false,
            start: StartAt::Min,
        }
    }
}

/// Partial lever entry from a configuration document; absent fields keep the
/// lever's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LeverConfigOverlay {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub weight: Option<f64>,
    pub inverse: Option<bool>,
    pub curve: Option<CurveKind>,
    pub chart_inverted: Option<bool>,
    pub start: Option<StartAt>,
}

impl LeverConfig {
    #[must_use]
    pub fn with_overlay(&self, overlay: &LeverConfigOverlay) -> Self {
        Self {
            min: overlay.min.unwrap_or(self.min),
            max: overlay.max.unwrap_or(self.max),
            step: overlay.step.unwrap_or(self.step),
            weight: overlay.weight.unwrap_or(self.weight),
            inverse: overlay.inverse.unwrap_or(self.inverse),
            curve: overlay.curve.unwrap_or(self.curve),
            chart_inverted: overlay.chart_inverted.unwrap_or(self.chart_inverted),
            start: overlay.start.unwrap_or(self.start),
        }
    }
}

/// A lever instance: its configuration plus the current clamped raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lever {
    pub config: LeverConfig,
    raw: f64,
}

impl Lever {
    #[must_use]
    pub fn new(config: LeverConfig) -> Self {
        let raw = config.clamp(config.start_value());
        Self { config, raw }
    }

    #[must_use]
    pub const fn raw(&self) -> f64 {
        self.raw
    }

    /// Set the raw value, clamping into `[min, max]`.
    pub fn set_raw(&mut self, value: f64) {
        self.raw = self.config.clamp(value);
    }

    /// Position of the raw value along `[min, max]`; 0.5 when the domain collapses.
    #[must_use]
    pub fn normalized(&self) -> f64 {
        let range = self.config.range();
        if range == 0.0 {
            return 0.5;
        }
        ((self.raw - self.config.min) / range).clamp(0.0, 1.0)
    }

    /// How much the current setting relieves pressure, in `[0, 1]`.
    #[must_use]
    pub fn relief(&self) -> f64 {
        if self.config.range() == 0.0 {
            return 0.5;
        }
        let normalized = self.normalized();
        if self.config.inverse {
            1.0 - normalized
        } else {
            normalized
        }
    }

    /// Set the raw value that produces `target` relief.
    pub fn set_from_relief(&mut self, target: f64) {
        let target = if target.is_nan() { 0.5 } else { target.clamp(0.0, 1.0) };
        let normalized = if self.config.inverse {
            1.0 - target
        } else {
            target
        };
        self.set_raw(self.config.min + normalized * self.config.range());
    }

    /// Round to the nearest `min + k * step`, staying inside the domain.
    #[must_use]
    pub fn snap_to_step(&self, value: f64) -> f64 {
        let step = self.config.step;
        let clamped = self.config.clamp(value);
        if step <= 0.0 || !step.is_finite() {
            return clamped;
        }
        let steps = ((clamped - self.config.min) / step).round();
        self.config.clamp(self.config.min + steps * step)
    }

    /// Position along the automation chart, honoring `chart_inverted`.
    #[must_use]
    pub fn chart_position(&self) -> f64 {
        if self.config.chart_inverted {
            1.0 - self.normalized()
        } else {
            self.normalized()
        }
    }
}
