use serde::{Deserialize, Serialize};

use super::ProtocolError;
use crate::train::TrainId;

/// Ownership state of one block section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "train", rename_all = "snake_case")]
pub enum BlockState {
    #[default]
    Free,
    Reserved(TrainId),
}

/// A platform on the line: passenger load plus its block section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub index: usize,
    pub name: String,
    load: f64,
    block: BlockState,
}

impl Station {
    #[must_use]
    pub const fn new(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            load: 0.0,
            block: BlockState::Free,
        }
    }

    #[must_use]
    pub const fn load(&self) -> f64 {
        self.load
    }

    #[must_use]
    pub const fn block(&self) -> BlockState {
        self.block
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.block, BlockState::Free)
    }

    #[must_use]
    pub const fn holder(&self) -> Option<TrainId> {
        match self.block {
            BlockState::Free => None,
            BlockState::Reserved(train) => Some(train),
        }
    }

    pub(super) const fn reserve(&mut self, train: TrainId) -> Result<(), ProtocolError> {
        match self.block {
            BlockState::Free => {
                self.block = BlockState::Reserved(train);
                Ok(())
            }
            BlockState::Reserved(holder) => Err(ProtocolError::DoubleClaim {
                station: self.index,
                holder,
                claimant: train,
            }),
        }
    }

    pub(super) const fn free(&mut self, train: TrainId) -> Result<(), ProtocolError> {
        match self.block {
            BlockState::Reserved(holder) if holder == train => {
                self.block = BlockState::Free;
                Ok(())
            }
            BlockState::Reserved(holder) => Err(ProtocolError::ForeignRelease {
                station: self.index,
                holder,
                train,
            }),
            BlockState::Free => Err(ProtocolError::ReleaseFree {
                station: self.index,
                train,
            }),
        }
    }

    /// Stored as given; [`Track::audit`](super::Track::audit) rejects bad values.
    pub(super) fn set_load(&mut self, load: f64) {
        self.load = load;
    }

    /// Remove up to `limit` passengers, returning how many left the platform.
    pub(super) fn take(&mut self, limit: f64) -> f64 {
        let boarded = self.load.min(limit).max(0.0);
        self.load -= boarded;
        boarded
    }
}
