//! Serializable view of the observable simulation state.
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::config::SimConfig;
use crate::lever::LeverId;
use crate::policy::ServiceOutlook;
use crate::state::{SimStats, SimulationState};
use crate::train::{TrainId, TrainPhase};

const FINGERPRINT_SEED: u64 = 0x7472_616E_7369_7421;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverView {
    pub id: LeverId,
    pub raw: f64,
    pub relief: f64,
    pub contribution_share: f64,
    pub relief_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationView {
    pub index: usize,
    pub name: String,
    pub load: f64,
    /// Load relative to the display ceiling, capped at 1.
    pub load_ratio: f64,
    pub occupied: bool,
    pub holder: Option<TrainId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainView {
    pub id: TrainId,
    pub position: f64,
    pub phase: TrainPhase,
}

/// Everything a presentation layer polls after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub clock: f64,
    pub overall_relief: f64,
    pub pressure: f64,
    pub automation: f64,
    pub outlook: ServiceOutlook,
    pub levers: Vec<LeverView>,
    pub stations: Vec<StationView>,
    pub trains: Vec<TrainView>,
    pub stats: SimStats,
}

impl Snapshot {
    #[must_use]
    pub fn capture(state: &SimulationState, config: &SimConfig) -> Self {
        let policy = &state.policy;
        let contribution = policy.contribution_shares();
        let relief_shares = policy.relief_shares();
        let levers = policy
            .levers()
            .map(|(id, lever)| LeverView {
                id,
                raw: lever.raw(),
                relief: lever.relief(),
                contribution_share: contribution.get(&id).copied().unwrap_or(0.0),
                relief_share: relief_shares.get(&id).copied().unwrap_or(0.0),
            })
            .collect();
        let ceiling = config.tuning.display_load_ceiling;
        let stations = state
            .track
            .stations()
            .iter()
            .map(|station| StationView {
                index: station.index,
                name: station.name.clone(),
                load: station.load(),
                load_ratio: (station.load() / ceiling).clamp(0.0, 1.0),
                occupied: !station.is_free(),
                holder: station.holder(),
            })
            .collect();
        let trains = state
            .trains
            .values()
            .map(|train| TrainView {
                id: train.id(),
                position: train.position(),
                phase: train.phase(),
            })
            .collect();
        Self {
            tick: state.tick_count,
            clock: state.clock,
            overall_relief: policy.overall_relief(),
            pressure: policy.pressure(),
            automation: policy.automation(),
            outlook: policy.outlook(),
            levers,
            stations,
            trains,
            stats: state.stats.clone(),
        }
    }

    #[must_use]
    pub fn station(&self, index: usize) -> Option<&StationView> {
        self.stations.get(index)
    }

    #[must_use]
    pub fn train(&self, id: TrainId) -> Option<&TrainView> {
        self.trains.iter().find(|train| train.id == id)
    }

    #[must_use]
    pub fn lever(&self, id: LeverId) -> Option<&LeverView> {
        self.levers.iter().find(|lever| lever.id == id)
    }

    #[must_use]
    pub fn total_load(&self) -> f64 {
        self.stations.iter().map(|station| station.load).sum()
    }

    /// Stable hash of the serialized snapshot, for replay comparisons.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
        if let Ok(bytes) = serde_json::to_vec(self) {
            hasher.write(&bytes);
        }
        hasher.finish()
    }
}
