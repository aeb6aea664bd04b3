use anyhow::Result;
use colored::Colorize;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use transit_sim::{
    EventKind, LeverId, SimConfig, SimulationSession, Snapshot, TickReport, TrainId,
};

const SWEEP_SALT: u64 = 0x5357_4545_5021;

/// Session tweak applied after construction and before the first tick.
pub type SetupFn = fn(&mut SimulationSession) -> Result<()>;

/// Declarative plan for a headless line run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub ticks: usize,
    pub dt: f64,
    pub configure: Option<fn(&mut SimConfig)>,
    pub setup: Option<SetupFn>,
    /// Randomize a lever every this many ticks.
    pub sweep_every: Option<usize>,
    /// Run a second time with the same seed and record its fingerprint.
    pub replay: bool,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub const fn new(ticks: usize, dt: f64) -> Self {
        Self {
            ticks,
            dt,
            configure: None,
            setup: None,
            sweep_every: None,
            replay: false,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, configure: fn(&mut SimConfig)) -> Self {
        self.configure = Some(configure);
        self
    }

    #[must_use]
    pub fn with_setup(mut self, setup: SetupFn) -> Self {
        self.setup = Some(setup);
        self
    }

    #[must_use]
    pub const fn with_sweep(mut self, every: usize) -> Self {
        self.sweep_every = Some(every);
        self
    }

    #[must_use]
    pub const fn with_replay(mut self) -> Self {
        self.replay = true;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn =
    Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    /// Run the hook against a finished summary.
    ///
    /// # Errors
    ///
    /// Returns the hook's failure.
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// Complete record of a line run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub ticks_run: usize,
    /// Train id and clock of every dispatch, in order.
    pub dispatches: Vec<(TrainId, f64)>,
    pub exits: Vec<TrainId>,
    pub withdrawals: usize,
    /// Boarded and remaining passengers for every stop.
    pub boardings: Vec<(f64, f64)>,
    /// Ticks on which a dispatch was overdue but station 0 was occupied.
    pub entry_blocked_ticks: usize,
    pub max_active: usize,
    pub peak_total_load: f64,
    pub violations: Vec<String>,
    pub error: Option<String>,
    /// State after setup, before the first tick.
    pub initial: Snapshot,
    pub final_snapshot: Snapshot,
    pub fingerprint: u64,
    pub replay_fingerprint: Option<u64>,
}

impl SimulationSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.violations.is_empty()
    }
}

/// Headless deterministic runner for the line simulation.
#[derive(Debug, Clone)]
pub struct LineRunner {
    config: SimConfig,
    verbose: bool,
}

impl LineRunner {
    #[must_use]
    pub const fn new(config: SimConfig, verbose: bool) -> Self {
        Self { config, verbose }
    }

    /// Execute a plan for one seed.
    ///
    /// # Errors
    ///
    /// Fails when the plan's configuration is invalid or its setup hook errors.
    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let mut summary = self.run_once(plan, seed)?;
        if plan.replay {
            let replay = self.run_once(plan, seed)?;
            summary.replay_fingerprint = Some(replay.fingerprint);
        }
        Ok(summary)
    }

    fn run_once(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let mut config = self.config.clone();
        if let Some(configure) = plan.configure {
            configure(&mut config);
        }
        let mut session = SimulationSession::new(config, seed)?;
        if let Some(setup) = plan.setup {
            setup(&mut session)?;
        }
        let initial = session.snapshot();
        if self.verbose {
            println!(
                "🚉 Starting line | seed:{seed} stations:{} pressure:{:.2} automation:{:.0}",
                initial.stations.len(),
                initial.pressure,
                initial.automation
            );
        }

        let mut watch = Watch::default();
        let mut sweeper = SmallRng::seed_from_u64(seed ^ SWEEP_SALT);
        let mut error = None;
        let mut ticks_run = 0;
        for tick in 0..plan.ticks {
            if let Some(every) = plan.sweep_every
                && every > 0
                && tick % every == 0
                && let Err(err) = sweep_lever(&mut session, &mut sweeper)
            {
                error = Some(err.to_string());
                break;
            }
            let overdue_blocked = {
                let state = session.state();
                state.dispatcher.countdown() <= 0.0
                    && state.trains.len() < state.fleet_cap()
                    && !state.track.is_free(0)
            };
            match session.tick(plan.dt) {
                Ok(report) => {
                    ticks_run += 1;
                    watch.record(&report, &session.snapshot(), overdue_blocked);
                }
                Err(err) => {
                    error = Some(err.to_string());
                    break;
                }
            }
        }

        let final_snapshot = session.snapshot();
        if self.verbose {
            log_outcome(&final_snapshot, error.as_deref());
        }
        Ok(SimulationSummary {
            ticks_run,
            dispatches: watch.dispatches,
            exits: watch.exits,
            withdrawals: watch.withdrawals,
            boardings: watch.boardings,
            entry_blocked_ticks: watch.entry_blocked_ticks,
            max_active: watch.max_active,
            peak_total_load: watch.peak_total_load,
            violations: watch.violations,
            error,
            initial,
            fingerprint: final_snapshot.fingerprint(),
            final_snapshot,
            replay_fingerprint: None,
        })
    }
}

fn sweep_lever(session: &mut SimulationSession, rng: &mut SmallRng) -> Result<()> {
    match rng.gen_range(0..3) {
        0 => {
            let id = LeverId::ALL[rng.gen_range(0..LeverId::ALL.len())];
            let lever = &session.config().levers;
            let (min, max) = match id {
                LeverId::TrainCount => (lever.train_count.min, lever.train_count.max),
                LeverId::Interval => (lever.interval.min, lever.interval.max),
                LeverId::StopTime => (lever.stop_time.min, lever.stop_time.max),
                LeverId::Speed => (lever.speed.min, lever.speed.max),
            };
            let value = if max > min { rng.gen_range(min..=max) } else { min };
            session.set_lever_value(id, value)?;
        }
        1 => session.set_master_automation(rng.gen_range(0.0..=100.0))?,
        _ => session.set_target_relief(rng.gen_range(0.0..=1.0))?,
    }
    Ok(())
}

/// Per-tick observations and invariant checks.
#[derive(Debug, Default)]
struct Watch {
    dispatches: Vec<(TrainId, f64)>,
    exits: Vec<TrainId>,
    withdrawals: usize,
    boardings: Vec<(f64, f64)>,
    entry_blocked_ticks: usize,
    max_active: usize,
    peak_total_load: f64,
    positions: BTreeMap<TrainId, f64>,
    violations: Vec<String>,
}

impl Watch {
    fn record(&mut self, report: &TickReport, snapshot: &Snapshot, overdue_blocked: bool) {
        let dispatched = report
            .events
            .iter()
            .any(|event| matches!(event.kind, EventKind::TrainDispatched { .. }));
        if overdue_blocked && !dispatched {
            self.entry_blocked_ticks += 1;
        }
        for event in &report.events {
            match event.kind {
                EventKind::TrainDispatched { train } => self.dispatches.push((train, event.at)),
                EventKind::TrainExited { train } => {
                    self.exits.push(train);
                    self.positions.remove(&train);
                }
                EventKind::TrainWithdrawn { train, .. } => {
                    self.withdrawals += 1;
                    self.positions.remove(&train);
                }
                EventKind::PassengersBoarded {
                    boarded, remaining, ..
                } => self.boardings.push((boarded, remaining)),
                _ => {}
            }
        }
        self.max_active = self.max_active.max(snapshot.trains.len());
        self.peak_total_load = self.peak_total_load.max(snapshot.total_load());
        self.check(snapshot);
    }

    fn check(&mut self, snapshot: &Snapshot) {
        let mut holders = BTreeSet::new();
        for station in &snapshot.stations {
            if !(station.load.is_finite() && station.load >= 0.0) {
                self.violate(snapshot, format!("station {} load {}", station.index, station.load));
            }
            if let Some(holder) = station.holder {
                if !holders.insert(holder) {
                    self.violate(snapshot, format!("train {holder} holds two blocks"));
                }
                if snapshot.train(holder).is_none() {
                    self.violate(
                        snapshot,
                        format!("station {} held by removed train {holder}", station.index),
                    );
                }
            }
        }
        for pair in snapshot.stations.windows(2) {
            if pair[0].occupied && pair[1].occupied {
                self.violate(
                    snapshot,
                    format!("adjacent blocks {} and {} occupied", pair[0].index, pair[1].index),
                );
            }
        }
        for train in &snapshot.trains {
            if let Some(previous) = self.positions.insert(train.id, train.position)
                && train.position < previous
            {
                self.violate(
                    snapshot,
                    format!("train {} moved back {previous:.2} -> {:.2}", train.id, train.position),
                );
            }
        }
    }

    fn violate(&mut self, snapshot: &Snapshot, message: String) {
        self.violations
            .push(format!("t={:.2}s: {message}", snapshot.clock));
    }
}

fn log_outcome(snapshot: &Snapshot, error: Option<&str>) {
    let stats = &snapshot.stats;
    println!(
        "🏁 Line finished at {:.1}s | dispatched:{} completed:{} withdrawn:{} boarded:{:.0}",
        snapshot.clock,
        stats.dispatched,
        stats.completed,
        stats.withdrawn,
        stats.passengers_boarded
    );
    if let Some(error) = error {
        println!("   {}", error.red());
    }
}
