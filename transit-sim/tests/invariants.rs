use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use transit_sim::{EventKind, LeverId, SimulationSession, Snapshot, TrainId};

const DT: f64 = 0.1;

fn assert_block_table(snapshot: &Snapshot) {
    let mut holders = BTreeSet::new();
    for station in &snapshot.stations {
        assert_eq!(station.occupied, station.holder.is_some());
        if let Some(holder) = station.holder {
            assert!(
                holders.insert(holder),
                "train {holder} holds two stations at {}",
                snapshot.clock
            );
            assert!(
                snapshot.train(holder).is_some(),
                "station {} held by departed train {holder}",
                station.index
            );
        }
    }
    for pair in snapshot.stations.windows(2) {
        assert!(
            !(pair[0].occupied && pair[1].occupied),
            "adjacent stations {} and {} both occupied at {}",
            pair[0].index,
            pair[1].index,
            snapshot.clock
        );
    }
}

/// Upper bound on a single platform's load for a fixed tick length.
fn load_ceiling(session: &SimulationSession) -> f64 {
    let tuning = &session.config().tuning;
    let per_tick =
        tuning.base_arrival * (1.0 + tuning.arrival_pressure_gain) * DT * tuning.jitter_high;
    per_tick / (1.0 - tuning.decay_factor.powf(DT))
}

#[test]
fn randomized_lever_sweeps_preserve_protocol() {
    for seed in [1_u64, 7, 0xBEEF, 0x00C0_FFEE] {
        let mut session = SimulationSession::with_defaults(seed).unwrap();
        let mut driver = SmallRng::seed_from_u64(seed ^ 0x5EED);
        let ceiling = load_ceiling(&session) * 1.000_001;
        let mut last_position: BTreeMap<TrainId, f64> = BTreeMap::new();

        for tick in 0..20_000 {
            if tick % 250 == 0 {
                match driver.gen_range(0..4) {
                    0 => {
                        let id = LeverId::ALL[driver.gen_range(0..LeverId::ALL.len())];
                        let value = driver.gen_range(0.0..120.0);
                        session.set_lever_value(id, value).unwrap();
                    }
                    1 => session
                        .set_master_automation(driver.gen_range(-10.0..110.0))
                        .unwrap(),
                    2 => session
                        .set_target_pressure(driver.gen_range(0.0..1.0))
                        .unwrap(),
                    _ => session
                        .set_lever_value(LeverId::TrainCount, driver.gen_range(2.0..8.0))
                        .unwrap(),
                }
                let snapshot = session.snapshot();
                assert!(snapshot.trains.len() <= session.state().fleet_cap());
                assert_block_table(&snapshot);
            }

            let report = session.tick(DT).unwrap();
            for event in &report.events {
                if let EventKind::TrainWithdrawn { train, .. } | EventKind::TrainExited { train } =
                    event.kind
                {
                    last_position.remove(&train);
                }
            }

            let snapshot = session.snapshot();
            assert_block_table(&snapshot);
            for station in &snapshot.stations {
                assert!(station.load >= 0.0 && station.load.is_finite());
                assert!(station.load <= ceiling, "load {} above {ceiling}", station.load);
            }
            for train in &snapshot.trains {
                let previous = last_position.insert(train.id, train.position);
                if let Some(previous) = previous {
                    assert!(
                        train.position >= previous,
                        "train {} moved back from {previous} to {}",
                        train.id,
                        train.position
                    );
                }
            }
        }
        let stats = &session.state().stats;
        assert!(stats.dispatched > 0, "seed {seed} dispatched nothing");
        let active = session.state().trains.len() as u64;
        assert_eq!(stats.completed + stats.withdrawn + active, stats.dispatched);
    }
}

#[test]
fn trains_keep_dispatch_order_along_the_line() {
    let mut session = SimulationSession::with_defaults(3).unwrap();
    session.set_master_automation(100.0).unwrap();
    let mut exits = Vec::new();
    for _ in 0..30_000 {
        let report = session.tick(DT).unwrap();
        for event in &report.events {
            if let EventKind::TrainExited { train } = event.kind {
                exits.push(train);
            }
        }
        let snapshot = session.snapshot();
        // lower ids are always further down the line
        for pair in snapshot.trains.windows(2) {
            assert!(pair[0].position >= pair[1].position);
        }
    }
    assert!(exits.len() > 3);
    assert!(exits.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn forced_removal_never_strands_a_block() {
    let mut session = SimulationSession::with_defaults(11).unwrap();
    session.set_master_automation(100.0).unwrap();
    for round in 0..40 {
        session.run(300, DT).unwrap();
        let cap = if round % 2 == 0 { 2.0 } else { 8.0 };
        session.set_lever_value(LeverId::TrainCount, cap).unwrap();
        let snapshot = session.snapshot();
        assert!(snapshot.trains.len() <= session.state().fleet_cap());
        assert_block_table(&snapshot);
        for station in &snapshot.stations {
            let waiting: Vec<_> = session.state().track.waiting_at(station.index).collect();
            for train in waiting {
                assert!(snapshot.train(train).is_some());
            }
        }
    }
    assert!(session.state().stats.withdrawn > 0);
}

#[test]
fn pressure_scales_platform_load() {
    let mut session = SimulationSession::with_defaults(5).unwrap();
    session.set_target_pressure(0.0).unwrap();
    session.run(200, DT).unwrap();
    let calm = session.snapshot().total_load();

    let mut stressed = SimulationSession::with_defaults(5).unwrap();
    stressed.set_target_pressure(1.0).unwrap();
    stressed.run(200, DT).unwrap();
    assert!(stressed.snapshot().total_load() > calm * 3.0);
}
