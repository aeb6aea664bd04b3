//! Transit line simulation engine
//!
//! Platform-agnostic core for a single-track transit line: policy levers and
//! their aggregation into relief and pressure, the block-section interlocking
//! between stations, the dispatcher, and cooperative train tasks. Rendering and
//! input widgets live outside this crate and talk to it through
//! [`SimulationSession`].

pub mod config;
pub mod constants;
pub mod curve;
pub mod dispatch;
pub mod event;
pub mod lever;
pub mod numbers;
pub mod policy;
pub mod rng;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod track;
pub mod train;

// Re-export commonly used types
pub use config::{
    ConfigError, LeverTable, LeverTableOverlay, LineConfig, SimConfig, TuningConfig,
};
pub use curve::CurveKind;
pub use dispatch::{DispatchWindow, Dispatcher};
pub use event::{EventBuffer, EventId, EventKind, SimEvent};
pub use lever::{Lever, LeverConfig, LeverConfigOverlay, LeverId, StartAt};
pub use policy::{
    CurvePoint, Efficiency, LeverValues, LoadStatus, PolicyAggregator, Satisfaction,
    ServiceOutlook,
};
pub use rng::RngBundle;
pub use session::{SimulationSession, TickReport};
pub use snapshot::{LeverView, Snapshot, StationView, TrainView};
pub use state::{SimStats, SimulationState};
pub use track::{Admission, BlockState, Boarding, ProtocolError, Station, Track};
pub use train::{TrainId, TrainPhase, TrainTask};
