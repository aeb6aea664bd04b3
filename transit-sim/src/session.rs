//! Session driver: the external inputs and the tick that advances time.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SimConfig};
use crate::event::{EventBuffer, EventLog};
use crate::lever::LeverId;
use crate::numbers::sanitize_delta;
use crate::policy::CurvePoint;
use crate::snapshot::Snapshot;
use crate::state::SimulationState;
use crate::track::ProtocolError;

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub clock: f64,
    /// Elapsed time actually applied after sanitizing the input.
    pub dt: f64,
    pub pressure: f64,
    pub events: EventBuffer,
}

/// Driver binding a validated configuration to its simulation state.
///
/// Control inputs take effect immediately; time only moves through [`tick`](Self::tick).
/// Events raised by an input (a forced removal after lowering the train count)
/// are delivered with the next tick's report.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    config: SimConfig,
    seed: u64,
    state: SimulationState,
    pending: Option<EventLog>,
}

impl SimulationSession {
    /// Build a session from a configuration and arrival seed.
    ///
    /// # Errors
    ///
    /// Returns the first configuration invariant the config violates.
    pub fn new(config: SimConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = SimulationState::new(&config, seed);
        debug!(
            "session seeded with {seed:#x}: {} stations, {} levers",
            state.track.len(),
            LeverId::ALL.len()
        );
        Ok(Self {
            config,
            seed,
            state,
            pending: None,
        })
    }

    /// Default line and levers.
    ///
    /// # Errors
    ///
    /// Only fails if the built-in defaults are inconsistent.
    pub fn with_defaults(seed: u64) -> Result<Self, ConfigError> {
        Self::new(SimConfig::default(), seed)
    }

    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub const fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Mutable access for scenario setup (seeding loads and the like).
    pub const fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    #[must_use]
    pub const fn clock(&self) -> f64 {
        self.state.clock
    }

    /// Set one lever; out-of-range values are clamped.
    ///
    /// # Errors
    ///
    /// Propagates a block-table fault raised while withdrawing surplus trains.
    pub fn set_lever_value(&mut self, id: LeverId, value: f64) -> Result<(), ProtocolError> {
        self.state.policy.set_lever_value(id, value);
        debug!(
            "lever {} set to {:.2}",
            id.key(),
            self.state.policy.value(id)
        );
        self.enforce_fleet_cap()
    }

    /// Drive every lever from the master automation value (clamped to its domain).
    ///
    /// # Errors
    ///
    /// Propagates a block-table fault raised while withdrawing surplus trains.
    pub fn set_master_automation(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.state.policy.set_master_automation(value);
        debug!("master automation set to {:.2}", self.state.policy.automation());
        self.enforce_fleet_cap()
    }

    /// Move every lever to the same relief.
    ///
    /// # Errors
    ///
    /// Propagates a block-table fault raised while withdrawing surplus trains.
    pub fn set_target_relief(&mut self, relief: f64) -> Result<(), ProtocolError> {
        let relief = if relief.is_finite() {
            relief.clamp(0.0, 1.0)
        } else {
            warn!("ignoring non-finite relief target {relief}");
            return Ok(());
        };
        self.state.policy.set_target_relief(relief);
        debug!("relief target {relief:.3}");
        self.enforce_fleet_cap()
    }

    /// Same drag as [`set_target_relief`](Self::set_target_relief), expressed as pressure.
    ///
    /// # Errors
    ///
    /// Propagates a block-table fault raised while withdrawing surplus trains.
    pub fn set_target_pressure(&mut self, pressure: f64) -> Result<(), ProtocolError> {
        self.set_target_relief(1.0 - pressure)
    }

    fn enforce_fleet_cap(&mut self) -> Result<(), ProtocolError> {
        let next_tick = self.state.tick_count + 1;
        let clock = self.state.clock;
        let log = self
            .pending
            .get_or_insert_with(|| EventLog::new(next_tick, clock));
        self.state.enforce_fleet_cap(log)
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// # Errors
    ///
    /// A protocol error means the block table or a load went inconsistent; the
    /// session should not be ticked further.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport, ProtocolError> {
        let applied = sanitize_delta(dt);
        if !(dt.is_finite() && dt >= 0.0) {
            warn!("tick delta {dt} is not a finite non-negative number; using 0");
        }
        let mut log = self
            .pending
            .take()
            .unwrap_or_else(|| EventLog::new(self.state.tick_count + 1, self.state.clock));
        self.state.advance(applied, &self.config.tuning, &mut log)?;
        Ok(TickReport {
            tick: self.state.tick_count,
            clock: self.state.clock,
            dt: applied,
            pressure: self.state.policy.pressure(),
            events: log.into_events(),
        })
    }

    /// Tick repeatedly, collecting every report.
    ///
    /// # Errors
    ///
    /// Stops at the first protocol error.
    pub fn run(&mut self, ticks: usize, dt: f64) -> Result<Vec<TickReport>, ProtocolError> {
        (0..ticks).map(|_| self.tick(dt)).collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state, &self.config)
    }

    /// 101 samples of the automation mapping for one lever.
    #[must_use]
    pub fn automation_curve(&self, id: LeverId) -> Vec<CurvePoint> {
        self.state.policy.automation_curve(id)
    }

    #[must_use]
    pub fn overall_relief(&self) -> f64 {
        self.state.policy.overall_relief()
    }

    #[must_use]
    pub fn pressure(&self) -> f64 {
        self.state.policy.pressure()
    }

    /// Restart from time zero with a new seed, keeping the configuration.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.state = SimulationState::new(&self.config, seed);
        self.pending = None;
    }
}
