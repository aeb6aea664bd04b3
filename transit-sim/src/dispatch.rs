//! Dispatch cadence and fleet-size enforcement.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TuningConfig;
use crate::numbers::floor_f64_to_usize;
use crate::train::{TrainId, TrainTask};

/// Everything the dispatcher looks at when deciding whether to spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchWindow {
    pub active: usize,
    pub cap: usize,
    pub entry_free: bool,
    /// Raw value of the interval lever in seconds.
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatcher {
    countdown: f64,
    next_id: TrainId,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(tuning: &TuningConfig) -> Self {
        Self {
            countdown: tuning.bootstrap_delay,
            next_id: 1,
        }
    }

    /// Seconds until the next dispatch attempt; zero or negative means overdue.
    #[must_use]
    pub const fn countdown(&self) -> f64 {
        self.countdown
    }

    #[must_use]
    pub const fn next_id(&self) -> TrainId {
        self.next_id
    }

    /// Run the countdown for `dt` seconds and return the id to spawn, if any.
    ///
    /// An overdue countdown keeps waiting while the fleet is full or station 0
    /// is occupied; it is only reset by a successful dispatch.
    pub fn step(&mut self, dt: f64, window: DispatchWindow, tuning: &TuningConfig) -> Option<TrainId> {
        self.countdown -= dt;
        if self.countdown > 0.0 || window.active >= window.cap || !window.entry_free {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.countdown = window.interval * tuning.cadence_factor;
        Some(id)
    }
}

/// Number of trains the train-count lever allows on the line.
#[must_use]
pub fn fleet_cap(train_count: f64) -> usize {
    floor_f64_to_usize(train_count)
}

/// Trains to remove so the active set fits `cap`, highest id first.
#[must_use]
pub fn surplus_trains(trains: &BTreeMap<TrainId, TrainTask>, cap: usize) -> Vec<TrainId> {
    let excess = trains.len().saturating_sub(cap);
    trains.keys().rev().take(excess).copied().collect()
}
