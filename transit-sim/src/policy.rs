//! Policy aggregation: weighted relief, pressure and the automation mapping.
//!
//! Relief is the common currency across levers. Every cross-lever coupling
//! (the master automation value, the pressure-indicator drag) goes through
//! this module; a lever never writes another lever directly.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::LeverTable;
use crate::constants::{
    CURVE_SAMPLE_COUNT, EFFICIENCY_SIGNIFICANT, LOAD_STABLE_PRESSURE, SATISFACTION_CONTENT,
    SATISFACTION_DELIGHTED, SATISFACTION_NEUTRAL,
};
use crate::lever::{Lever, LeverConfig, LeverId};
use crate::numbers::usize_to_f64;

/// Per-lever scalar keyed by lever id.
pub type LeverValues = BTreeMap<LeverId, f64>;

/// One point of a lever's automation curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub automation: f64,
    pub raw: f64,
}

/// Owner of every lever value in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAggregator {
    train_count: Lever,
    interval: Lever,
    stop_time: Lever,
    speed: Lever,
    automation: Lever,
}

impl PolicyAggregator {
    #[must_use]
    pub fn new(table: &LeverTable) -> Self {
        let mut aggregator = Self {
            train_count: Lever::new(table.train_count.clone()),
            interval: Lever::new(table.interval.clone()),
            stop_time: Lever::new(table.stop_time.clone()),
            speed: Lever::new(table.speed.clone()),
            automation: Lever::new(table.automation.clone()),
        };
        aggregator.sync_automation();
        aggregator
    }

    #[must_use]
    pub const fn lever(&self, id: LeverId) -> &Lever {
        match id {
            LeverId::TrainCount => &self.train_count,
            LeverId::Interval => &self.interval,
            LeverId::StopTime => &self.stop_time,
            LeverId::Speed => &self.speed,
        }
    }

    const fn lever_mut(&mut self, id: LeverId) -> &mut Lever {
        match id {
            LeverId::TrainCount => &mut self.train_count,
            LeverId::Interval => &mut self.interval,
            LeverId::StopTime => &mut self.stop_time,
            LeverId::Speed => &mut self.speed,
        }
    }

    pub fn levers(&self) -> impl Iterator<Item = (LeverId, &Lever)> {
        LeverId::ALL.into_iter().map(|id| (id, self.lever(id)))
    }

    #[must_use]
    pub fn value(&self, id: LeverId) -> f64 {
        self.lever(id).raw()
    }

    /// Current master automation value.
    #[must_use]
    pub const fn automation(&self) -> f64 {
        self.automation.raw()
    }

    #[must_use]
    pub const fn automation_lever(&self) -> &Lever {
        &self.automation
    }

    /// Direct input on a single lever. Clamped; the master value follows the
    /// reference lever.
    pub fn set_lever_value(&mut self, id: LeverId, value: f64) {
        self.lever_mut(id).set_raw(value);
        self.sync_automation();
    }

    /// Weighted mean relief across the policy levers; 0 when no lever carries weight.
    #[must_use]
    pub fn overall_relief(&self) -> f64 {
        let (weighted, total) = self
            .levers()
            .fold((0.0, 0.0), |(weighted, total), (_, lever)| {
                let weight = lever.config.weight;
                (weighted + lever.relief() * weight, total + weight)
            });
        if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn pressure(&self) -> f64 {
        1.0 - self.overall_relief()
    }

    /// Share of the remaining pressure attributable to each lever.
    #[must_use]
    pub fn contribution_shares(&self) -> LeverValues {
        let unrelieved: Vec<(LeverId, f64)> = self
            .levers()
            .map(|(id, lever)| (id, (1.0 - lever.relief()) * lever.config.weight))
            .collect();
        let total: f64 = unrelieved.iter().map(|(_, value)| value).sum();
        if total <= 0.0 {
            let equal = 1.0 / usize_to_f64(LeverId::ALL.len());
            return LeverId::ALL.into_iter().map(|id| (id, equal)).collect();
        }
        unrelieved
            .into_iter()
            .map(|(id, value)| (id, value / total))
            .collect()
    }

    /// Share of the achieved relief attributable to each lever; all zero when
    /// nothing is relieved.
    #[must_use]
    pub fn relief_shares(&self) -> LeverValues {
        let relieved: Vec<(LeverId, f64)> = self
            .levers()
            .map(|(id, lever)| (id, lever.relief() * lever.config.weight))
            .collect();
        let total: f64 = relieved.iter().map(|(_, value)| value).sum();
        relieved
            .into_iter()
            .map(|(id, value)| (id, if total > 0.0 { value / total } else { 0.0 }))
            .collect()
    }

    /// Drive every lever from the master automation value.
    pub fn set_master_automation(&mut self, value: f64) {
        self.automation.set_raw(value);
        let fraction = self.automation.normalized();
        for id in LeverId::ALL {
            let raw = automation_to_raw(&self.lever(id).config, fraction);
            self.lever_mut(id).set_raw(raw);
        }
    }

    /// Drag of the pressure indicator: every lever moves to the same relief.
    pub fn set_target_relief(&mut self, relief: f64) {
        for id in LeverId::ALL {
            self.lever_mut(id).set_from_relief(relief);
        }
        self.sync_automation();
    }

    /// Master automation value implied by the reference lever.
    #[must_use]
    pub fn automation_from_reference(&self) -> f64 {
        automation_from_lever(self.lever(LeverId::REFERENCE), &self.automation.config)
    }

    fn sync_automation(&mut self) {
        let derived = self.automation_from_reference();
        self.automation.set_raw(derived);
    }

    /// Sampled automation curve for one lever across the master domain.
    #[must_use]
    pub fn automation_curve(&self, id: LeverId) -> Vec<CurvePoint> {
        let config = &self.lever(id).config;
        let master = &self.automation.config;
        let last = usize_to_f64(CURVE_SAMPLE_COUNT - 1);
        (0..CURVE_SAMPLE_COUNT)
            .map(|index| {
                let fraction = usize_to_f64(index) / last;
                CurvePoint {
                    automation: master.min + fraction * master.range(),
                    raw: automation_to_raw(config, fraction),
                }
            })
            .collect()
    }

    #[must_use]
    pub fn outlook(&self) -> ServiceOutlook {
        ServiceOutlook::from_relief(self.overall_relief())
    }
}

/// Raw lever value for a master automation fraction in `[0, 1]`.
#[must_use]
pub fn automation_to_raw(config: &LeverConfig, fraction: f64) -> f64 {
    let eased = config.curve.apply(fraction);
    if config.chart_inverted {
        config.max - eased * config.range()
    } else {
        config.min + eased * config.range()
    }
}

/// Master automation value recovered from a single lever through its curve inverse.
#[must_use]
pub fn automation_from_lever(lever: &Lever, master: &LeverConfig) -> f64 {
    let fraction = lever.config.curve.inverse(lever.chart_position());
    master.clamp(master.min + fraction * master.range())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Satisfaction {
    Delighted,
    Content,
    Neutral,
    Strained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Efficiency {
    Significant,
    Improving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Stable,
    Heavy,
}

/// Semantic summary of the current relief, for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOutlook {
    pub satisfaction: Satisfaction,
    pub efficiency: Efficiency,
    pub load: LoadStatus,
}

impl ServiceOutlook {
    #[must_use]
    pub fn from_relief(relief: f64) -> Self {
        let satisfaction = if relief > SATISFACTION_DELIGHTED {
            Satisfaction::Delighted
        } else if relief > SATISFACTION_CONTENT {
            Satisfaction::Content
        } else if relief > SATISFACTION_NEUTRAL {
            Satisfaction::Neutral
        } else {
            Satisfaction::Strained
        };
        let efficiency = if relief > EFFICIENCY_SIGNIFICANT {
            Efficiency::Significant
        } else {
            Efficiency::Improving
        };
        let load = if 1.0 - relief < LOAD_STABLE_PRESSURE {
            LoadStatus::Stable
        } else {
            LoadStatus::Heavy
        };
        Self {
            satisfaction,
            efficiency,
            load,
        }
    }
}
