//! Cooperative train task: walks one train through the station sequence.
//!
//! A task suspends in two places only: waiting for block admission (parked in
//! the station's queue until woken) and waiting for a timed travel or dwell
//! to elapse. Each call to [`TrainTask::advance`] spends a time budget and
//! runs the state machine until the budget is exhausted or the task parks.
use serde::{Deserialize, Serialize};

use crate::config::TuningConfig;
use crate::event::{EventKind, EventLog};
use crate::track::{Admission, ProtocolError, Track};

/// Monotonic train identifier, assigned by the dispatcher starting at 1.
pub type TrainId = u64;

/// Externally visible phase of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainPhase {
    /// Waiting for block admission.
    Held,
    Traveling,
    Boarding,
    Departing,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TaskStep {
    AwaitBlock {
        station: usize,
    },
    Travel {
        station: usize,
        from: f64,
        to: f64,
        elapsed: f64,
        duration: f64,
    },
    Dwell {
        station: usize,
        remaining: f64,
    },
    Depart {
        from: f64,
        to: f64,
        elapsed: f64,
        duration: f64,
        released: bool,
    },
    Exited,
}

/// Borrowed simulation pieces a task needs while advancing.
pub struct TaskContext<'a> {
    pub track: &'a mut Track,
    pub tuning: &'a TuningConfig,
    pub events: &'a mut EventLog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTask {
    id: TrainId,
    position: f64,
    speed: f64,
    stop_time: f64,
    step: TaskStep,
    parked: bool,
    boarded: f64,
}

impl TrainTask {
    /// A fresh train at the spawn point, about to request station 0.
    /// Speed and stop time are fixed for the train's lifetime.
    #[must_use]
    pub const fn new(id: TrainId, spawn_position: f64, speed: f64, stop_time: f64) -> Self {
        Self {
            id,
            position: spawn_position,
            speed,
            stop_time,
            step: TaskStep::AwaitBlock { station: 0 },
            parked: false,
            boarded: 0.0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TrainId {
        self.id
    }

    #[must_use]
    pub const fn position(&self) -> f64 {
        self.position
    }

    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub const fn stop_time(&self) -> f64 {
        self.stop_time
    }

    /// Passengers taken on over the whole trip so far.
    #[must_use]
    pub const fn boarded(&self) -> f64 {
        self.boarded
    }

    /// Parked tasks sit in a station queue and only run again when woken.
    #[must_use]
    pub const fn is_parked(&self) -> bool {
        self.parked
    }

    pub const fn wake(&mut self) {
        self.parked = false;
    }

    #[must_use]
    pub const fn phase(&self) -> TrainPhase {
        match self.step {
            TaskStep::AwaitBlock { .. } => TrainPhase::Held,
            TaskStep::Travel { .. } => TrainPhase::Traveling,
            TaskStep::Dwell { .. } => TrainPhase::Boarding,
            TaskStep::Depart { .. } => TrainPhase::Departing,
            TaskStep::Exited => TrainPhase::Exited,
        }
    }

    #[must_use]
    pub const fn is_exited(&self) -> bool {
        matches!(self.step, TaskStep::Exited)
    }

    /// Station the task is heading to, dwelling at, or waiting for.
    #[must_use]
    pub const fn target_station(&self) -> Option<usize> {
        match self.step {
            TaskStep::AwaitBlock { station }
            | TaskStep::Travel { station, .. }
            | TaskStep::Dwell { station, .. } => Some(station),
            TaskStep::Depart { .. } | TaskStep::Exited => None,
        }
    }

    /// Run the task for `dt` seconds of simulated time.
    ///
    /// # Errors
    ///
    /// Propagates any block-protocol violation raised by the track.
    pub fn advance(&mut self, dt: f64, ctx: &mut TaskContext<'_>) -> Result<(), ProtocolError> {
        let mut budget = dt.max(0.0);
        loop {
            match self.step {
                TaskStep::AwaitBlock { station } => {
                    if !self.claim(station, ctx)? {
                        return Ok(());
                    }
                }
                TaskStep::Travel {
                    station,
                    from,
                    to,
                    elapsed,
                    duration,
                } => {
                    let needed = duration - elapsed;
                    if budget < needed {
                        let elapsed = elapsed + budget;
                        self.move_along(from, to, elapsed / duration);
                        self.step = TaskStep::Travel {
                            station,
                            from,
                            to,
                            elapsed,
                            duration,
                        };
                        return Ok(());
                    }
                    budget -= needed.max(0.0);
                    self.arrive(station, to, ctx)?;
                }
                TaskStep::Dwell { station, remaining } => {
                    if budget < remaining {
                        self.step = TaskStep::Dwell {
                            station,
                            remaining: remaining - budget,
                        };
                        return Ok(());
                    }
                    budget -= remaining.max(0.0);
                    self.step = if station + 1 < ctx.track.len() {
                        TaskStep::AwaitBlock {
                            station: station + 1,
                        }
                    } else {
                        let to = ctx.track.line_length() + ctx.tuning.exit_overshoot;
                        TaskStep::Depart {
                            from: self.position,
                            to,
                            elapsed: 0.0,
                            duration: ctx.tuning.travel_duration(to - self.position, self.speed),
                            released: false,
                        }
                    };
                }
                TaskStep::Depart {
                    from,
                    to,
                    elapsed,
                    duration,
                    released,
                } => {
                    let elapsed = (elapsed + budget).min(duration);
                    let finished = elapsed >= duration;
                    if finished {
                        self.position = self.position.max(to);
                    } else {
                        self.move_along(from, to, elapsed / duration);
                    }
                    let released = released || self.clear_last_block(finished, ctx)?;
                    if finished {
                        self.step = TaskStep::Exited;
                        ctx.events.push(EventKind::TrainExited { train: self.id });
                    } else {
                        self.step = TaskStep::Depart {
                            from,
                            to,
                            elapsed,
                            duration,
                            released,
                        };
                    }
                    return Ok(());
                }
                TaskStep::Exited => return Ok(()),
            }
        }
    }

    /// Request the next block; returns whether the task may keep running.
    fn claim(&mut self, station: usize, ctx: &mut TaskContext<'_>) -> Result<bool, ProtocolError> {
        match ctx.track.request(self.id, station)? {
            Admission::Queued => {
                self.parked = true;
                Ok(false)
            }
            Admission::Granted { released } => {
                self.parked = false;
                ctx.events.push(EventKind::BlockClaimed {
                    train: self.id,
                    station,
                });
                if let Some(previous) = released {
                    ctx.events.push(EventKind::BlockReleased {
                        train: self.id,
                        station: previous,
                    });
                }
                let to = ctx
                    .track
                    .position(station)
                    .ok_or(ProtocolError::UnknownStation { station })?
                    .max(self.position);
                self.step = TaskStep::Travel {
                    station,
                    from: self.position,
                    to,
                    elapsed: 0.0,
                    duration: ctx.tuning.travel_duration(to - self.position, self.speed),
                };
                Ok(true)
            }
        }
    }

    fn arrive(&mut self, station: usize, at: f64, ctx: &mut TaskContext<'_>) -> Result<(), ProtocolError> {
        self.position = self.position.max(at);
        ctx.events.push(EventKind::TrainArrived {
            train: self.id,
            station,
        });
        let boarding = ctx
            .track
            .board(self.id, station, self.stop_time, ctx.tuning)?;
        self.boarded += boarding.boarded;
        ctx.events.push(EventKind::PassengersBoarded {
            train: self.id,
            station,
            boarded: boarding.boarded,
            remaining: boarding.remaining,
        });
        self.step = TaskStep::Dwell {
            station,
            remaining: ctx.tuning.dwell_duration(self.stop_time),
        };
        Ok(())
    }

    /// Release the last station once the train is off the modelled line.
    fn clear_last_block(&self, finished: bool, ctx: &mut TaskContext<'_>) -> Result<bool, ProtocolError> {
        if !finished && self.position < ctx.track.line_length() {
            return Ok(false);
        }
        let last = ctx.track.len().saturating_sub(1);
        ctx.track.release(self.id, last)?;
        ctx.events.push(EventKind::BlockReleased {
            train: self.id,
            station: last,
        });
        Ok(true)
    }

    fn move_along(&mut self, from: f64, to: f64, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.position = self.position.max(from + (to - from) * fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineConfig;

    struct Rig {
        track: Track,
        tuning: TuningConfig,
        events: EventLog,
    }

    impl Rig {
        fn new(stations: usize) -> Self {
            Self {
                track: Track::new(&LineConfig::with_stations(stations)),
                tuning: TuningConfig::default(),
                events: EventLog::new(1, 0.0),
            }
        }

        fn run(&mut self, task: &mut TrainTask, dt: f64) {
            let mut ctx = TaskContext {
                track: &mut self.track,
                tuning: &self.tuning,
                events: &mut self.events,
            };
            task.advance(dt, &mut ctx).unwrap();
        }
    }

    #[test]
    fn fresh_train_claims_station_zero_without_moving() {
        let mut rig = Rig::new(3);
        let mut task = TrainTask::new(1, -50.0, 80.0, 2.0);
        rig.run(&mut task, 0.0);
        assert_eq!(task.phase(), TrainPhase::Traveling);
        assert_eq!(rig.track.station(0).unwrap().holder(), Some(1));
        assert!((task.position() + 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn travel_time_scales_with_distance_and_speed() {
        let mut rig = Rig::new(5);
        let mut task = TrainTask::new(1, -50.0, 80.0, 2.0);
        rig.run(&mut task, 0.0);
        // 150 units at speed 80 with scale 20 takes 37.5 seconds
        rig.run(&mut task, 37.0);
        assert_eq!(task.phase(), TrainPhase::Traveling);
        assert!(task.position() < 100.0);
        rig.run(&mut task, 0.5);
        assert_eq!(task.phase(), TrainPhase::Boarding);
        assert!((task.position() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn one_large_budget_walks_the_whole_line() {
        let mut rig = Rig::new(3);
        rig.track.set_load(1, 100.0).unwrap();
        let mut task = TrainTask::new(1, -50.0, 100.0, 2.0);
        rig.run(&mut task, 10_000.0);
        assert!(task.is_exited());
        assert!((task.position() - 1100.0).abs() < 1e-9);
        assert!((task.boarded() - 40.0).abs() < 1e-9);
        assert!(rig.track.stations().iter().all(|station| station.is_free()));
        let kinds: Vec<_> = rig.events.clone().into_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds.last(), Some(&EventKind::TrainExited { train: 1 }));
    }

    #[test]
    fn last_block_held_until_train_leaves_the_line() {
        let mut rig = Rig::new(1);
        let mut task = TrainTask::new(1, -50.0, 100.0, 2.0);
        // arrive at 500 after 110 s, dwell 0.2 s, then depart towards 1100
        rig.run(&mut task, 110.2);
        assert_eq!(task.phase(), TrainPhase::Departing);
        rig.run(&mut task, 50.0);
        assert!(task.position() < 1000.0);
        assert_eq!(rig.track.station(0).unwrap().holder(), Some(1));
        rig.run(&mut task, 60.0);
        assert!(task.position() >= 1000.0);
        assert!(rig.track.is_free(0));
        assert_eq!(task.phase(), TrainPhase::Departing);
        rig.run(&mut task, 30.0);
        assert!(task.is_exited());
    }

    #[test]
    fn blocked_train_parks_until_woken() {
        let mut rig = Rig::new(3);
        let mut leader = TrainTask::new(1, -50.0, 80.0, 2.0);
        let mut follower = TrainTask::new(2, -50.0, 80.0, 2.0);
        rig.run(&mut leader, 0.0);
        rig.run(&mut follower, 5.0);
        assert!(follower.is_parked());
        assert_eq!(follower.phase(), TrainPhase::Held);
        assert!((follower.position() + 50.0).abs() < f64::EPSILON);

        // leader reaches station 0, dwells, then claims station 1
        rig.run(&mut leader, 37.7);
        assert_eq!(rig.track.station(1).unwrap().holder(), Some(1));
        assert_eq!(rig.track.take_wakeups(), vec![2]);
        follower.wake();
        rig.run(&mut follower, 0.0);
        // station 1 is held so station 0 still lacks clearance
        assert!(follower.is_parked());
    }

    #[test]
    fn positions_never_regress() {
        let mut rig = Rig::new(4);
        let mut task = TrainTask::new(1, -50.0, 95.0, 3.5);
        let mut last = task.position();
        for _ in 0..4000 {
            rig.run(&mut task, 0.25);
            assert!(task.position() >= last);
            last = task.position();
        }
        assert!(task.is_exited());
    }
}
