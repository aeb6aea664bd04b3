//! Easing curves shared by the automation mapping.
//!
//! Every curve is a strictly increasing bijection of `[0, 1]` onto itself and
//! carries an analytic inverse, so a master value can drive a lever and be
//! recovered from it again.
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::numbers::usize_to_f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    #[default]
    Linear,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutSine,
}

impl CurveKind {
    pub const ALL: [Self; 4] = [
        Self::Linear,
        Self::EaseInCubic,
        Self::EaseOutCubic,
        Self::EaseInOutSine,
    ];

    /// Evaluate the curve. Input is clamped to `[0, 1]`.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        let x = unit(x);
        let y = match self {
            Self::Linear => x,
            Self::EaseInCubic => x.powi(3),
            Self::EaseOutCubic => 1.0 - (1.0 - x).powi(3),
            Self::EaseInOutSine => (1.0 - (PI * x).cos()) / 2.0,
        };
        unit(y)
    }

    /// Evaluate the analytic inverse. Input is clamped to `[0, 1]`.
    #[must_use]
    pub fn inverse(self, y: f64) -> f64 {
        let y = unit(y);
        let x = match self {
            Self::Linear => y,
            Self::EaseInCubic => y.cbrt(),
            Self::EaseOutCubic => 1.0 - (1.0 - y).cbrt(),
            Self::EaseInOutSine => (1.0 - 2.0 * y).clamp(-1.0, 1.0).acos() / PI,
        };
        unit(x)
    }

    /// `count` evenly spaced evaluations from `x = 0` to `x = 1` inclusive.
    #[must_use]
    pub fn sample(self, count: usize) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![self.apply(0.0)],
            _ => {
                let last = usize_to_f64(count - 1);
                (0..count)
                    .map(|index| self.apply(usize_to_f64(index) / last))
                    .collect()
            }
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseInCubic => "ease-in-cubic",
            Self::EaseOutCubic => "ease-out-cubic",
            Self::EaseInOutSine => "ease-in-out-sine",
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
