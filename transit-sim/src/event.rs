//! Structured simulation events emitted each tick.
//!
//! Presentation layers consume these to animate trains and stations; the
//! simulation itself never reads them back.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::train::TrainId;

/// Stable, deterministic identifier for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Tick counter when the event occurred (first tick is 1).
    pub tick: u64,
    /// Per-tick sequence number within the emitted event stream.
    pub seq: u16,
}

impl EventId {
    #[must_use]
    pub const fn new(tick: u64, seq: u16) -> Self {
        Self { tick, seq }
    }
}

/// Mechanical event kind emitted by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    TrainDispatched {
        train: TrainId,
    },
    BlockClaimed {
        train: TrainId,
        station: usize,
    },
    BlockReleased {
        train: TrainId,
        station: usize,
    },
    TrainArrived {
        train: TrainId,
        station: usize,
    },
    PassengersBoarded {
        train: TrainId,
        station: usize,
        boarded: f64,
        remaining: f64,
    },
    TrainExited {
        train: TrainId,
    },
    /// Removed because the train-count lever dropped below the active count.
    TrainWithdrawn {
        train: TrainId,
        released: Option<usize>,
    },
}

impl EventKind {
    #[must_use]
    pub const fn train(&self) -> TrainId {
        match self {
            Self::TrainDispatched { train }
            | Self::BlockClaimed { train, .. }
            | Self::BlockReleased { train, .. }
            | Self::TrainArrived { train, .. }
            | Self::PassengersBoarded { train, .. }
            | Self::TrainExited { train }
            | Self::TrainWithdrawn { train, .. } => *train,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub id: EventId,
    /// Simulated clock in seconds when the event occurred.
    pub at: f64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Most ticks emit a handful of events at most.
pub type EventBuffer = SmallVec<[SimEvent; 8]>;

/// Sequencing log used while a tick is being processed.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    tick: u64,
    at: f64,
    events: EventBuffer,
}

impl EventLog {
    #[must_use]
    pub fn new(tick: u64, at: f64) -> Self {
        Self {
            tick,
            at,
            events: EventBuffer::new(),
        }
    }

    /// Stamp subsequent events with a new clock reading.
    pub const fn set_clock(&mut self, at: f64) {
        self.at = at;
    }

    pub fn push(&mut self, kind: EventKind) {
        let seq = u16::try_from(self.events.len()).unwrap_or(u16::MAX);
        self.events.push(SimEvent {
            id: EventId::new(self.tick, seq),
            at: self.at,
            kind,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Passengers boarded across events pushed at or after `from`.
    #[must_use]
    pub fn boarded_since(&self, from: usize) -> f64 {
        self.events
            .iter()
            .skip(from)
            .filter_map(|event| match event.kind {
                EventKind::PassengersBoarded { boarded, .. } => Some(boarded),
                _ => None,
            })
            .sum()
    }

    #[must_use]
    pub fn into_events(self) -> EventBuffer {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_assigns_sequential_ids() {
        let mut log = EventLog::new(3, 1.5);
        log.push(EventKind::TrainDispatched { train: 1 });
        log.push(EventKind::BlockClaimed {
            train: 1,
            station: 0,
        });
        let events = log.into_events();
        assert_eq!(events[0].id, EventId::new(3, 0));
        assert_eq!(events[1].id, EventId::new(3, 1));
        assert_eq!(events[1].kind.train(), 1);
        assert!((events[1].at - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn event_serializes_with_flat_kind_tag() {
        let mut log = EventLog::new(1, 0.0);
        log.push(EventKind::TrainWithdrawn {
            train: 4,
            released: Some(2),
        });
        let json = serde_json::to_value(&log.into_events()[0]).unwrap();
        assert_eq!(json["kind"], "train_withdrawn");
        assert_eq!(json["released"], 2);
        let restored: SimEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored.kind.train(), 4);
    }
}
