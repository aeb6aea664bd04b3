use anyhow::{Result, anyhow, ensure};

use crate::common::scenario::TestScenario;
use crate::logic::{SimulationPlan, SimulationSummary};
use transit_sim::numbers::floor_f64_to_usize;
use transit_sim::{LeverId, LineConfig, SimConfig, SimulationSession, Snapshot};

const TOLERANCE: f64 = 1e-9;

pub fn catalog_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::new(
            "bootstrap-dispatch",
            "Bootstrap Dispatch",
            "First train after the bootstrap delay, second held until station 0 clears",
            SimulationPlan::new(100, 0.5)
                .with_setup(two_train_levers)
                .with_expectation(bootstrap_dispatch_expectation),
        ),
        TestScenario::new(
            "master-floor",
            "Master Automation Floor",
            "Automation at 0 snaps every lever to its starting extreme",
            SimulationPlan::new(4, 0.5)
                .with_setup(|session| {
                    session.set_master_automation(100.0)?;
                    session.set_master_automation(0.0)?;
                    Ok(())
                })
                .with_expectation(master_floor_expectation),
        ),
        TestScenario::new(
            "master-ceiling",
            "Master Automation Ceiling",
            "Automation at 100 snaps every lever to its opposite extreme",
            SimulationPlan::new(4, 0.5)
                .with_setup(|session| Ok(session.set_master_automation(100.0)?))
                .with_expectation(master_ceiling_expectation),
        ),
        TestScenario::new(
            "boarding-limit",
            "Boarding Limit",
            "A two second stop takes 40 of 100 waiting passengers",
            SimulationPlan::new(400, 0.5)
                .with_config(single_still_platform)
                .with_setup(|session| {
                    session.set_target_pressure(0.0)?;
                    session.set_lever_value(LeverId::StopTime, 2.0)?;
                    session.state_mut().track.set_load(0, 100.0)?;
                    Ok(())
                })
                .with_expectation(boarding_limit_expectation),
        ),
        TestScenario::new(
            "relief-drag",
            "Relief Drag",
            "Dragging relief to 0.75 positions inverse and direct levers",
            SimulationPlan::new(4, 0.5)
                .with_setup(|session| Ok(session.set_target_relief(0.75)?))
                .with_expectation(relief_drag_expectation),
        ),
        TestScenario::new(
            "soak",
            "Full Automation Soak",
            "Long run at full automation keeps trains in order and under the cap",
            SimulationPlan::new(20_000, 0.1)
                .with_setup(|session| Ok(session.set_master_automation(100.0)?))
                .with_expectation(soak_expectation),
        ),
        TestScenario::new(
            "lever-sweep",
            "Randomized Lever Sweep",
            "Random lever, master and relief inputs while the line runs",
            SimulationPlan::new(20_000, 0.1)
                .with_sweep(250)
                .with_expectation(conservation_expectation),
        ),
        TestScenario::new(
            "determinism",
            "Seeded Replay",
            "Same seed and inputs reproduce the same final snapshot",
            SimulationPlan::new(4_000, 0.25)
                .with_sweep(100)
                .with_replay()
                .with_expectation(replay_expectation),
        ),
    ]
}

fn two_train_levers(session: &mut SimulationSession) -> Result<()> {
    session.set_lever_value(LeverId::TrainCount, 2.0)?;
    session.set_lever_value(LeverId::Interval, 8.0)?;
    session.set_lever_value(LeverId::StopTime, 2.0)?;
    session.set_lever_value(LeverId::Speed, 80.0)?;
    Ok(())
}

/// One platform with arrivals and decay switched off.
fn single_still_platform(config: &mut SimConfig) {
    config.line = LineConfig::with_stations(1);
    config.tuning.decay_factor = 1.0;
    config.tuning.base_arrival = 0.0;
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < TOLERANCE
}

fn raw_value(snapshot: &Snapshot, id: LeverId) -> Result<f64> {
    snapshot
        .lever(id)
        .map(|lever| lever.raw)
        .ok_or_else(|| anyhow!("lever {id:?} missing from snapshot"))
}

fn expect_levers(snapshot: &Snapshot, expected: [(LeverId, f64); 4]) -> Result<()> {
    for (id, value) in expected {
        let raw = raw_value(snapshot, id)?;
        ensure!(close(raw, value), "{id:?} at {raw}, expected {value}");
    }
    Ok(())
}

fn bootstrap_dispatch_expectation(summary: &SimulationSummary) -> Result<()> {
    let (first, first_at) = *summary
        .dispatches
        .first()
        .ok_or_else(|| anyhow!("no train dispatched"))?;
    ensure!(first == 1, "first dispatched train was {first}");
    ensure!(close(first_at, 5.0), "first dispatch at {first_at}s, expected 5s");

    let (second, second_at) = *summary
        .dispatches
        .get(1)
        .ok_or_else(|| anyhow!("second train never dispatched"))?;
    ensure!(second == 2, "second dispatched train was {second}");
    ensure!(close(second_at, 43.0), "second dispatch at {second_at}s, expected 43s");
    ensure!(
        summary.entry_blocked_ticks > 0,
        "dispatch was never overdue while station 0 was held"
    );
    ensure!(
        summary.max_active <= 2,
        "{} trains active under a cap of 2",
        summary.max_active
    );
    Ok(())
}

fn master_floor_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_levers(
        &summary.initial,
        [
            (LeverId::TrainCount, 2.0),
            (LeverId::Interval, 8.0),
            (LeverId::StopTime, 2.0),
            (LeverId::Speed, 80.0),
        ],
    )
}

fn master_ceiling_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_levers(
        &summary.initial,
        [
            (LeverId::TrainCount, 8.0),
            (LeverId::Interval, 2.0),
            (LeverId::StopTime, 5.0),
            (LeverId::Speed, 100.0),
        ],
    )?;
    let automation = summary.initial.automation;
    ensure!(close(automation, 100.0), "automation reads {automation}");
    Ok(())
}

fn boarding_limit_expectation(summary: &SimulationSummary) -> Result<()> {
    let (boarded, remaining) = *summary
        .boardings
        .first()
        .ok_or_else(|| anyhow!("no train stopped at the platform"))?;
    ensure!(close(boarded, 40.0), "boarded {boarded}, expected 40");
    ensure!(close(remaining, 60.0), "{remaining} left waiting, expected 60");
    Ok(())
}

fn relief_drag_expectation(summary: &SimulationSummary) -> Result<()> {
    let snapshot = &summary.initial;
    let interval = raw_value(snapshot, LeverId::Interval)?;
    ensure!(close(interval, 3.5), "interval at {interval}, expected 3.5");
    let trains = raw_value(snapshot, LeverId::TrainCount)?;
    ensure!(close(trains, 6.5), "train count at {trains}, expected 6.5");
    ensure!(
        close(snapshot.overall_relief, 0.75),
        "overall relief {}",
        snapshot.overall_relief
    );
    Ok(())
}

fn soak_expectation(summary: &SimulationSummary) -> Result<()> {
    let cap = floor_f64_to_usize(raw_value(&summary.final_snapshot, LeverId::TrainCount)?);
    ensure!(
        summary.max_active <= cap,
        "{} trains active under a cap of {cap}",
        summary.max_active
    );
    ensure!(summary.exits.len() > 3, "only {} trains finished", summary.exits.len());
    ensure!(
        summary.exits.windows(2).all(|pair| pair[0] < pair[1]),
        "trains left the line out of dispatch order"
    );
    conservation_expectation(summary)
}

fn conservation_expectation(summary: &SimulationSummary) -> Result<()> {
    let stats = &summary.final_snapshot.stats;
    ensure!(stats.dispatched > 0, "nothing dispatched");
    let active = u64::try_from(summary.final_snapshot.trains.len())?;
    ensure!(
        stats.completed + stats.withdrawn + active == stats.dispatched,
        "{} dispatched but {} completed, {} withdrawn and {active} active",
        stats.dispatched,
        stats.completed,
        stats.withdrawn
    );
    Ok(())
}

fn replay_expectation(summary: &SimulationSummary) -> Result<()> {
    let replay = summary
        .replay_fingerprint
        .ok_or_else(|| anyhow!("replay did not run"))?;
    ensure!(
        replay == summary.fingerprint,
        "replay fingerprint {replay:#x} differs from {:#x}",
        summary.fingerprint
    );
    Ok(())
}
