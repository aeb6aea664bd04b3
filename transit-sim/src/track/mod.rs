//! Track model: stations, block-section interlocking and passenger load.
//!
//! A train may claim station `i` only while `i` and `i + 1` are both free;
//! claiming `i` releases `i - 1`. Trains waiting on a station queue FIFO and
//! are woken when a release could let the head of the queue in.
use std::collections::{BTreeSet, VecDeque};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{LineConfig, TuningConfig};
use crate::numbers::{finite_or, usize_to_f64};
use crate::rng::RngBundle;
use crate::train::TrainId;

mod station;
pub use station::{BlockState, Station};

/// Violations of the block protocol or the load model. These indicate a logic
/// fault and are never recovered from.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("station {station} does not exist")]
    UnknownStation { station: usize },
    #[error("train {claimant} claimed station {station} already held by train {holder}")]
    DoubleClaim {
        station: usize,
        holder: TrainId,
        claimant: TrainId,
    },
    #[error("train {train} released station {station} which was already free")]
    ReleaseFree { station: usize, train: TrainId },
    #[error("train {train} released station {station} held by train {holder}")]
    ForeignRelease {
        station: usize,
        holder: TrainId,
        train: TrainId,
    },
    #[error("train {train} requested station {station} without holding station {previous}")]
    SkippedBlock {
        station: usize,
        previous: usize,
        train: TrainId,
    },
    #[error("train {train} boarded at station {station} without holding it")]
    BoardingWithoutBlock { station: usize, train: TrainId },
    #[error("adjacent stations {first} and {second} reserved by trains {first_train} and {second_train}")]
    AdjacentReservation {
        first: usize,
        second: usize,
        first_train: TrainId,
        second_train: TrainId,
    },
    #[error("train {train} holds more than one station")]
    MultipleHolds { train: TrainId },
    #[error("station {station} load {load} is negative or non-finite")]
    InvalidLoad { station: usize, load: f64 },
}

/// Outcome of a block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The station is now reserved; `released` is the block left behind.
    Granted { released: Option<usize> },
    /// The train is parked in the station's wait queue.
    Queued,
}

/// Boarding result at one stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boarding {
    pub boarded: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    stations: Vec<Station>,
    positions: Vec<f64>,
    line_length: f64,
    waiters: Vec<VecDeque<TrainId>>,
    wakeups: BTreeSet<TrainId>,
}

impl Track {
    #[must_use]
    pub fn new(line: &LineConfig) -> Self {
        let count = line.station_count;
        let spacing = line.line_length / usize_to_f64(count.max(1));
        let stations = (0..count)
            .map(|index| Station::new(index, line.station_name(index)))
            .collect();
        let positions = (0..count)
            .map(|index| spacing * (usize_to_f64(index) + 0.5))
            .collect();
        Self {
            stations,
            positions,
            line_length: line.line_length,
            waiters: vec![VecDeque::new(); count],
            wakeups: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    #[must_use]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    #[must_use]
    pub fn station(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    /// Track-relative position of a station's platform.
    #[must_use]
    pub fn position(&self, index: usize) -> Option<f64> {
        self.positions.get(index).copied()
    }

    #[must_use]
    pub const fn line_length(&self) -> f64 {
        self.line_length
    }

    #[must_use]
    pub fn is_free(&self, index: usize) -> bool {
        self.stations.get(index).is_some_and(Station::is_free)
    }

    /// Whether a train could claim `index` right now.
    #[must_use]
    pub fn has_clearance(&self, index: usize) -> bool {
        self.is_free(index)
            && self
                .stations
                .get(index + 1)
                .is_none_or(Station::is_free)
    }

    /// Station currently held by `train`, if any.
    #[must_use]
    pub fn held_by(&self, train: TrainId) -> Option<usize> {
        self.stations
            .iter()
            .position(|station| station.holder() == Some(train))
    }

    /// Trains queued for `index`, head first.
    pub fn waiting_at(&self, index: usize) -> impl Iterator<Item = TrainId> + '_ {
        self.waiters.get(index).into_iter().flatten().copied()
    }

    #[must_use]
    pub fn total_load(&self) -> f64 {
        self.stations.iter().map(Station::load).sum()
    }

    /// Request the block at `index` for `train`.
    ///
    /// # Errors
    ///
    /// Fails when the station does not exist or the train does not hold the
    /// block behind it.
    pub fn request(&mut self, train: TrainId, index: usize) -> Result<Admission, ProtocolError> {
        let clearance = self.has_clearance(index);
        let Some(queue) = self.waiters.get_mut(index) else {
            return Err(ProtocolError::UnknownStation { station: index });
        };
        if !queue.contains(&train) {
            queue.push_back(train);
        }
        if queue.front() != Some(&train) || !clearance {
            return Ok(Admission::Queued);
        }
        if index > 0 && self.stations[index - 1].holder() != Some(train) {
            return Err(ProtocolError::SkippedBlock {
                station: index,
                previous: index - 1,
                train,
            });
        }
        queue.pop_front();
        self.stations[index].reserve(train)?;
        debug!("train {train} claimed block {index}");
        let released = if index > 0 {
            self.release(train, index - 1)?;
            Some(index - 1)
        } else {
            None
        };
        Ok(Admission::Granted { released })
    }

    /// Release the block at `index` held by `train` and wake eligible waiters.
    ///
    /// # Errors
    ///
    /// Fails when the block is free or held by another train.
    pub fn release(&mut self, train: TrainId, index: usize) -> Result<(), ProtocolError> {
        let Some(station) = self.stations.get_mut(index) else {
            return Err(ProtocolError::UnknownStation { station: index });
        };
        station.free(train)?;
        debug!("train {train} released block {index}");
        self.wake_queue(index);
        if index > 0 {
            self.wake_queue(index - 1);
        }
        Ok(())
    }

    /// Drop `train` from every queue and release its block, if held.
    ///
    /// # Errors
    ///
    /// Propagates a release failure, which would mean the block table is corrupt.
    pub fn withdraw(&mut self, train: TrainId) -> Result<Option<usize>, ProtocolError> {
        for index in 0..self.waiters.len() {
            let queue = &mut self.waiters[index];
            let was_head = queue.front() == Some(&train);
            queue.retain(|waiting| *waiting != train);
            if was_head {
                self.wake_queue(index);
            }
        }
        self.wakeups.remove(&train);
        let held = self.held_by(train);
        if let Some(index) = held {
            self.release(train, index)?;
        }
        Ok(held)
    }

    fn wake_queue(&mut self, index: usize) {
        if let Some(&head) = self.waiters.get(index).and_then(VecDeque::front) {
            self.wakeups.insert(head);
        }
    }

    /// Trains woken since the last call, in id order.
    pub fn take_wakeups(&mut self) -> Vec<TrainId> {
        std::mem::take(&mut self.wakeups).into_iter().collect()
    }

    /// Decay and replenish every platform for `dt` seconds at the given pressure.
    pub fn flow_passengers(
        &mut self,
        pressure: f64,
        dt: f64,
        tuning: &TuningConfig,
        rng: &mut RngBundle,
    ) {
        if dt <= 0.0 {
            return;
        }
        let retained = tuning.decay_factor.powf(dt);
        let arrivals =
            tuning.base_arrival * (1.0 + tuning.arrival_pressure_gain * pressure.clamp(0.0, 1.0)) * dt;
        for station in &mut self.stations {
            let jitter = rng.arrival_jitter(tuning.jitter_low, tuning.jitter_high);
            station.set_load(station.load() * retained + arrivals * jitter);
        }
    }

    /// Exchange passengers at a stop held by `train`.
    ///
    /// # Errors
    ///
    /// Fails when the train does not hold the station.
    pub fn board(
        &mut self,
        train: TrainId,
        index: usize,
        stop_time: f64,
        tuning: &TuningConfig,
    ) -> Result<Boarding, ProtocolError> {
        let Some(station) = self.stations.get_mut(index) else {
            return Err(ProtocolError::UnknownStation { station: index });
        };
        if station.holder() != Some(train) {
            return Err(ProtocolError::BoardingWithoutBlock {
                station: index,
                train,
            });
        }
        let boarded = station.take(tuning.boarding_limit(stop_time));
        Ok(Boarding {
            boarded,
            remaining: station.load(),
        })
    }

    /// Overwrite a platform's load; negative or non-finite values become zero.
    ///
    /// # Errors
    ///
    /// Fails when the station does not exist.
    pub fn set_load(&mut self, index: usize, load: f64) -> Result<(), ProtocolError> {
        self.stations
            .get_mut(index)
            .map(|station| station.set_load(finite_or(load, 0.0).max(0.0)))
            .ok_or(ProtocolError::UnknownStation { station: index })
    }

    /// Check every block and load invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn audit(&self) -> Result<(), ProtocolError> {
        let mut holders = BTreeSet::new();
        for station in &self.stations {
            if !station.load().is_finite() || station.load() < 0.0 {
                return Err(ProtocolError::InvalidLoad {
                    station: station.index,
                    load: station.load(),
                });
            }
            if let Some(train) = station.holder()
                && !holders.insert(train)
            {
                return Err(ProtocolError::MultipleHolds { train });
            }
        }
        for pair in self.stations.windows(2) {
            if let (Some(first_train), Some(second_train)) = (pair[0].holder(), pair[1].holder()) {
                return Err(ProtocolError::AdjacentReservation {
                    first: pair[0].index,
                    second: pair[1].index,
                    first_train,
                    second_train,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(count: usize) -> Track {
        Track::new(&LineConfig::with_stations(count))
    }

    #[test]
    fn stations_are_evenly_spaced() {
        let line = track(5);
        assert_eq!(line.len(), 5);
        assert!((line.position(0).unwrap() - 100.0).abs() < 1e-9);
        assert!((line.position(4).unwrap() - 900.0).abs() < 1e-9);
        assert_eq!(line.station(3).unwrap().name, "Station 4");
    }

    #[test]
    fn claim_requires_next_block_clear() {
        let mut line = track(4);
        assert_eq!(
            line.request(1, 0),
            Ok(Admission::Granted { released: None })
        );
        assert_eq!(
            line.request(1, 1),
            Ok(Admission::Granted { released: Some(0) })
        );
        // station 0 is free but 1 is held: a second train may not enter
        assert_eq!(line.request(2, 0), Ok(Admission::Queued));
        assert!(line.is_free(0));
        assert_eq!(line.audit(), Ok(()));
    }

    #[test]
    fn release_wakes_queue_heads_in_fifo_order() {
        let mut line = track(3);
        line.request(1, 0).unwrap();
        assert_eq!(line.request(2, 0), Ok(Admission::Queued));
        assert_eq!(line.request(3, 0), Ok(Admission::Queued));
        assert!(line.take_wakeups().is_empty());

        line.request(1, 1).unwrap();
        // station 0 freed while 1 is held: head is woken but cannot enter yet
        assert_eq!(line.take_wakeups(), vec![2]);
        assert_eq!(line.request(2, 0), Ok(Admission::Queued));

        line.request(1, 2).unwrap();
        assert_eq!(line.take_wakeups(), vec![2]);
        // the later arrival cannot jump the queue
        assert_eq!(line.request(3, 0), Ok(Admission::Queued));
        assert_eq!(
            line.request(2, 0),
            Ok(Admission::Granted { released: None })
        );
        assert_eq!(line.waiting_at(0).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn skipping_a_block_is_a_protocol_error() {
        let mut line = track(3);
        assert_eq!(
            line.request(9, 2),
            Err(ProtocolError::SkippedBlock {
                station: 2,
                previous: 1,
                train: 9
            })
        );
        assert_eq!(
            line.request(9, 7),
            Err(ProtocolError::UnknownStation { station: 7 })
        );
    }

    #[test]
    fn withdraw_releases_block_and_promotes_next_waiter() {
        let mut line = track(3);
        line.request(1, 0).unwrap();
        line.request(2, 0).unwrap();
        line.request(3, 0).unwrap();
        assert_eq!(line.withdraw(1), Ok(Some(0)));
        assert!(line.is_free(0));
        assert_eq!(line.take_wakeups(), vec![2]);

        assert_eq!(line.withdraw(2), Ok(None));
        assert_eq!(line.take_wakeups(), vec![3]);
        assert_eq!(
            line.request(3, 0),
            Ok(Admission::Granted { released: None })
        );
    }

    #[test]
    fn boarding_requires_the_block() {
        let mut line = track(1);
        let tuning = TuningConfig::default();
        line.set_load(0, 100.0).unwrap();
        assert_eq!(
            line.board(4, 0, 2.0, &tuning),
            Err(ProtocolError::BoardingWithoutBlock {
                station: 0,
                train: 4
            })
        );
        line.request(4, 0).unwrap();
        let boarding = line.board(4, 0, 2.0, &tuning).unwrap();
        assert!((boarding.boarded - 40.0).abs() < 1e-9);
        assert!((boarding.remaining - 60.0).abs() < 1e-9);
    }

    #[test]
    fn passenger_flow_decays_and_scales_with_pressure() {
        let tuning = TuningConfig::default();
        let mut rng = RngBundle::from_user_seed(11);
        let mut calm = track(5);
        let mut stressed = track(5);
        for _ in 0..200 {
            calm.flow_passengers(0.0, 0.05, &tuning, &mut rng);
            stressed.flow_passengers(1.0, 0.05, &tuning, &mut rng);
        }
        // steady state is arrivals / (1 - decay^dt) per tick
        let per_tick = 5.0 * 0.05;
        let ceiling = per_tick * 1.2 / (1.0 - 0.1_f64.powf(0.05));
        for station in calm.stations() {
            assert!(station.load() > 0.0 && station.load() < ceiling);
        }
        assert!(stressed.total_load() > calm.total_load() * 3.0);
        assert_eq!(calm.audit(), Ok(()));
    }

    #[test]
    fn zero_delta_leaves_loads_and_rng_untouched() {
        let tuning = TuningConfig::default();
        let mut rng = RngBundle::from_user_seed(3);
        let mut line = track(2);
        line.set_load(1, 12.0).unwrap();
        line.flow_passengers(0.5, 0.0, &tuning, &mut rng);
        assert!((line.station(1).unwrap().load() - 12.0).abs() < f64::EPSILON);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn manual_load_input_is_clamped() {
        let mut line = track(2);
        line.set_load(0, -5.0).unwrap();
        line.set_load(1, f64::NAN).unwrap();
        assert!(line.total_load().abs() < f64::EPSILON);
        assert_eq!(
            line.set_load(2, 1.0),
            Err(ProtocolError::UnknownStation { station: 2 })
        );
    }

    #[test]
    fn overflowing_arrivals_fail_the_audit() {
        let tuning = TuningConfig::default();
        let mut rng = RngBundle::from_user_seed(5);
        let mut line = track(2);
        line.flow_passengers(1.0, 1e308, &tuning, &mut rng);
        assert!(matches!(
            line.audit(),
            Err(ProtocolError::InvalidLoad { station: 0, load }) if load.is_infinite()
        ));
    }

    #[test]
    fn audit_flags_adjacent_reservations() {
        let mut line = track(3);
        line.stations[1].reserve(1).unwrap();
        line.stations[2].reserve(2).unwrap();
        assert!(matches!(
            line.audit(),
            Err(ProtocolError::AdjacentReservation {
                first: 1,
                second: 2,
                ..
            })
        ));
    }
}
