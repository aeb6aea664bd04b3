//! The single owner of all mutable simulation state.
use std::collections::BTreeMap;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::{SimConfig, TuningConfig};
use crate::dispatch::{DispatchWindow, Dispatcher, fleet_cap, surplus_trains};
use crate::event::{EventKind, EventLog};
use crate::lever::LeverId;
use crate::policy::PolicyAggregator;
use crate::rng::RngBundle;
use crate::track::{ProtocolError, Track};
use crate::train::{TaskContext, TrainId, TrainTask};

/// Running counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub dispatched: u64,
    pub completed: u64,
    pub withdrawn: u64,
    pub passengers_boarded: f64,
    pub peak_active: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationState {
    pub clock: f64,
    pub tick_count: u64,
    pub policy: PolicyAggregator,
    pub track: Track,
    pub trains: BTreeMap<TrainId, TrainTask>,
    pub dispatcher: Dispatcher,
    pub rng: RngBundle,
    pub stats: SimStats,
}

impl SimulationState {
    #[must_use]
    pub fn new(config: &SimConfig, seed: u64) -> Self {
        Self {
            clock: 0.0,
            tick_count: 0,
            policy: PolicyAggregator::new(&config.levers),
            track: Track::new(&config.line),
            trains: BTreeMap::new(),
            dispatcher: Dispatcher::new(&config.tuning),
            rng: RngBundle::from_user_seed(seed),
            stats: SimStats::default(),
        }
    }

    /// Trains the train-count lever currently allows.
    #[must_use]
    pub fn fleet_cap(&self) -> usize {
        fleet_cap(self.policy.value(LeverId::TrainCount))
    }

    /// Forcibly remove the highest-id trains until the fleet fits its cap.
    ///
    /// # Errors
    ///
    /// Propagates a block-table fault raised while releasing a removed train's block.
    pub fn enforce_fleet_cap(&mut self, events: &mut EventLog) -> Result<(), ProtocolError> {
        for train in surplus_trains(&self.trains, self.fleet_cap()) {
            let released = self.track.withdraw(train)?;
            self.trains.remove(&train);
            self.stats.withdrawn += 1;
            debug!("train {train} withdrawn (released block {released:?})");
            events.push(EventKind::TrainWithdrawn { train, released });
        }
        Ok(())
    }

    /// Advance the whole simulation by `dt` seconds; `dt` must already be sanitized.
    ///
    /// # Errors
    ///
    /// Any block-protocol or load invariant violation aborts the tick.
    pub fn advance(
        &mut self,
        dt: f64,
        tuning: &TuningConfig,
        events: &mut EventLog,
    ) -> Result<(), ProtocolError> {
        self.tick_count += 1;
        self.clock += dt;
        events.set_clock(self.clock);

        self.enforce_fleet_cap(events)?;

        let pressure = self.policy.pressure();
        trace!("tick {} at {:.3}s, pressure {pressure:.3}", self.tick_count, self.clock);
        self.track
            .flow_passengers(pressure, dt, tuning, &mut self.rng);

        let running: Vec<TrainId> = self
            .trains
            .iter()
            .filter(|(_, train)| !train.is_parked())
            .map(|(id, _)| *id)
            .collect();
        for id in running {
            self.run_train(id, dt, tuning, events)?;
        }
        self.drain_wakeups(tuning, events)?;
        self.retire_exited();
        self.dispatch(dt, tuning, events)?;

        self.stats.peak_active = self.stats.peak_active.max(self.trains.len());
        self.track.audit()
    }

    fn run_train(
        &mut self,
        id: TrainId,
        dt: f64,
        tuning: &TuningConfig,
        events: &mut EventLog,
    ) -> Result<(), ProtocolError> {
        let Some(train) = self.trains.get_mut(&id) else {
            return Ok(());
        };
        let first_event = events.len();
        let mut ctx = TaskContext {
            track: &mut self.track,
            tuning,
            events: &mut *events,
        };
        train.advance(dt, &mut ctx)?;
        self.stats.passengers_boarded += events.boarded_since(first_event);
        Ok(())
    }

    /// Give every woken queue head a chance to claim its block, until no more
    /// releases happen.
    fn drain_wakeups(&mut self, tuning: &TuningConfig, events: &mut EventLog) -> Result<(), ProtocolError> {
        loop {
            let woken = self.track.take_wakeups();
            if woken.is_empty() {
                return Ok(());
            }
            for id in woken {
                let Some(train) = self.trains.get_mut(&id) else {
                    continue;
                };
                if !train.is_parked() {
                    continue;
                }
                train.wake();
                self.run_train(id, 0.0, tuning, events)?;
            }
        }
    }

    fn retire_exited(&mut self) {
        let before = self.trains.len();
        self.trains.retain(|id, train| {
            if train.is_exited() {
                debug!("train {id} left the line");
            }
            !train.is_exited()
        });
        let retired = before - self.trains.len();
        self.stats.completed += u64::try_from(retired).unwrap_or(u64::MAX);
    }

    fn dispatch(&mut self, dt: f64, tuning: &TuningConfig, events: &mut EventLog) -> Result<(), ProtocolError> {
        let window = DispatchWindow {
            active: self.trains.len(),
            cap: self.fleet_cap(),
            entry_free: self.track.is_free(0),
            interval: self.policy.value(LeverId::Interval),
        };
        let Some(id) = self.dispatcher.step(dt, window, tuning) else {
            return Ok(());
        };
        let train = TrainTask::new(
            id,
            tuning.spawn_offset,
            self.policy.value(LeverId::Speed),
            self.policy.value(LeverId::StopTime),
        );
        debug!(
            "dispatching train {id} at {:.2}s (speed {:.1}, stop {:.1})",
            self.clock,
            train.speed(),
            train.stop_time()
        );
        self.trains.insert(id, train);
        self.stats.dispatched += 1;
        events.push(EventKind::TrainDispatched { train: id });
        self.run_train(id, 0.0, tuning, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (SimulationState, TuningConfig) {
        let config = SimConfig::default();
        (SimulationState::new(&config, 9), config.tuning)
    }

    fn run(state: &mut SimulationState, tuning: &TuningConfig, ticks: usize, dt: f64) {
        for _ in 0..ticks {
            let mut log = EventLog::new(state.tick_count + 1, state.clock);
            state.advance(dt, tuning, &mut log).unwrap();
        }
    }

    #[test]
    fn new_state_starts_idle() {
        let (state, _) = state();
        assert_eq!(state.fleet_cap(), 2);
        assert!(state.trains.is_empty());
        assert_eq!(state.track.len(), 5);
        assert!(state.clock.abs() < f64::EPSILON);
    }

    #[test]
    fn fleet_never_exceeds_cap() {
        let (mut state, tuning) = state();
        state.policy.set_lever_value(LeverId::TrainCount, 8.0);
        state.policy.set_lever_value(LeverId::Interval, 2.0);
        for _ in 0..2000 {
            run(&mut state, &tuning, 1, 0.25);
            assert!(state.trains.len() <= state.fleet_cap());
        }
        assert!(state.stats.dispatched > 2);
        assert!(state.stats.completed > 0);
        assert!(state.stats.passengers_boarded > 0.0);
    }

    #[test]
    fn lowering_cap_withdraws_highest_ids_and_frees_blocks() {
        let (mut state, tuning) = state();
        state.policy.set_lever_value(LeverId::TrainCount, 8.0);
        state.policy.set_lever_value(LeverId::Interval, 2.0);
        run(&mut state, &tuning, 600, 0.25);
        let before: Vec<_> = state.trains.keys().copied().collect();
        assert!(before.len() >= 2);

        state.policy.set_lever_value(LeverId::TrainCount, 2.0);
        let mut log = EventLog::new(state.tick_count + 1, state.clock);
        state.enforce_fleet_cap(&mut log).unwrap();
        let after: Vec<_> = state.trains.keys().copied().collect();
        assert_eq!(after, before[..2].to_vec());
        for station in state.track.stations() {
            if let Some(holder) = station.holder() {
                assert!(after.contains(&holder));
            }
        }
        assert_eq!(state.track.audit(), Ok(()));
    }
}
