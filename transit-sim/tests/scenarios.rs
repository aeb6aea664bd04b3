use transit_sim::{
    CurveKind, EventKind, LeverId, LineConfig, SimConfig, SimulationSession, TickReport, Track,
    TrainPhase, TuningConfig,
};

const DT: f64 = 0.5;

fn dispatched(report: &TickReport) -> Vec<u64> {
    report
        .events
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::TrainDispatched { train } => Some(train),
            _ => None,
        })
        .collect()
}

fn scenario_a_session() -> SimulationSession {
    let mut session = SimulationSession::with_defaults(0xA).unwrap();
    session.set_lever_value(LeverId::TrainCount, 2.0).unwrap();
    session.set_lever_value(LeverId::Interval, 8.0).unwrap();
    session.set_lever_value(LeverId::StopTime, 2.0).unwrap();
    session.set_lever_value(LeverId::Speed, 80.0).unwrap();
    session
}

#[test]
fn first_train_leaves_after_bootstrap_delay() {
    let mut session = scenario_a_session();
    for _ in 0..9 {
        let report = session.tick(DT).unwrap();
        assert!(dispatched(&report).is_empty(), "early dispatch at {}", report.clock);
    }
    let report = session.tick(DT).unwrap();
    assert_eq!(dispatched(&report), vec![1]);
    assert!((report.clock - 5.0).abs() < 1e-12);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.station(0).and_then(|s| s.holder), Some(1));
}

#[test]
fn second_dispatch_waits_for_station_zero() {
    let mut session = scenario_a_session();
    session.run(10, DT).unwrap();
    assert_eq!(session.state().trains.len(), 1);

    let mut overdue_while_blocked = false;
    let second = loop {
        let report = session.tick(DT).unwrap();
        if !dispatched(&report).is_empty() {
            break report;
        }
        assert!(report.clock < 60.0, "second train never dispatched");
        assert!(!session.state().track.is_free(0));
        if session.state().dispatcher.countdown() <= 0.0 {
            overdue_while_blocked = true;
        }
    };

    // cadence of 8 s x 2 elapsed at t = 21 s, long before train 1 cleared station 0
    assert!(overdue_while_blocked);
    assert_eq!(dispatched(&second), vec![2]);
    assert!((second.clock - 43.0).abs() < 1e-9);
    let release = second
        .events
        .iter()
        .position(|event| {
            event.kind
                == EventKind::BlockReleased {
                    train: 1,
                    station: 0,
                }
        })
        .unwrap();
    let dispatch = second
        .events
        .iter()
        .position(|event| event.kind == EventKind::TrainDispatched { train: 2 })
        .unwrap();
    assert!(release < dispatch);
}

#[test]
fn fleet_cap_holds_third_train_back() {
    let mut session = scenario_a_session();
    for _ in 0..2000 {
        session.tick(DT).unwrap();
        assert!(session.state().trains.len() <= 2);
    }
    assert!(session.state().stats.dispatched >= 3);
}

#[test]
fn master_zero_snaps_every_lever_to_its_starting_extreme() {
    for curve in CurveKind::ALL {
        let mut config = SimConfig::default();
        config.levers.train_count.curve = curve;
        config.levers.interval.curve = curve;
        config.levers.stop_time.curve = curve;
        config.levers.speed.curve = curve;
        let mut session = SimulationSession::new(config, 1).unwrap();
        session.set_master_automation(100.0).unwrap();
        session.set_master_automation(0.0).unwrap();
        let policy = &session.state().policy;
        assert_eq!(policy.value(LeverId::TrainCount), 2.0, "{curve:?}");
        assert_eq!(policy.value(LeverId::Interval), 8.0, "{curve:?}");
        assert_eq!(policy.value(LeverId::StopTime), 2.0, "{curve:?}");
        assert_eq!(policy.value(LeverId::Speed), 80.0, "{curve:?}");
    }
}

#[test]
fn master_hundred_snaps_every_lever_to_the_opposite_extreme() {
    for curve in CurveKind::ALL {
        let mut config = SimConfig::default();
        config.levers.train_count.curve = curve;
        config.levers.interval.curve = curve;
        config.levers.stop_time.curve = curve;
        config.levers.speed.curve = curve;
        let mut session = SimulationSession::new(config, 1).unwrap();
        session.set_master_automation(100.0).unwrap();
        let policy = &session.state().policy;
        assert!((policy.value(LeverId::TrainCount) - 8.0).abs() < 1e-12, "{curve:?}");
        assert!((policy.value(LeverId::Interval) - 2.0).abs() < 1e-12, "{curve:?}");
        assert!((policy.value(LeverId::StopTime) - 5.0).abs() < 1e-12, "{curve:?}");
        assert!((policy.value(LeverId::Speed) - 100.0).abs() < 1e-12, "{curve:?}");
        assert!((policy.automation() - 100.0).abs() < 1e-9);
    }
}

#[test]
fn boarding_takes_the_exchange_limit() {
    let tuning = TuningConfig::default();
    let mut track = Track::new(&LineConfig::with_stations(1));
    track.set_load(0, 100.0).unwrap();
    track.request(1, 0).unwrap();
    let boarding = track.board(1, 0, 2.0, &tuning).unwrap();
    assert!((boarding.boarded - 40.0).abs() < 1e-12);
    assert!((boarding.remaining - 60.0).abs() < 1e-12);
    assert!((track.total_load() - 60.0).abs() < 1e-12);
}

#[test]
fn boarding_through_a_running_session() {
    let mut config = SimConfig::default();
    config.line = LineConfig::with_stations(1);
    // hold the platform load steady so only boarding changes it
    config.tuning.decay_factor = 1.0;
    config.tuning.base_arrival = 0.0;
    let mut session = SimulationSession::new(config, 1).unwrap();
    session.set_target_pressure(0.0).unwrap();
    session.set_lever_value(LeverId::StopTime, 2.0).unwrap();
    session.state_mut().track.set_load(0, 100.0).unwrap();

    let mut boarded = None;
    for _ in 0..400 {
        let report = session.tick(DT).unwrap();
        boarded = report.events.iter().find_map(|event| match event.kind {
            EventKind::PassengersBoarded {
                boarded, remaining, ..
            } => Some((boarded, remaining)),
            _ => None,
        });
        if boarded.is_some() {
            break;
        }
    }
    let (taken, left) = boarded.unwrap();
    assert!((taken - 40.0).abs() < 1e-9);
    assert!((left - 60.0).abs() < 1e-9);
    assert_eq!(session.snapshot().trains[0].phase, TrainPhase::Boarding);
}

#[test]
fn pressure_drag_sets_inverse_lever_from_relief() {
    let mut session = SimulationSession::with_defaults(1).unwrap();
    session.set_target_relief(0.75).unwrap();
    let policy = &session.state().policy;
    assert!((policy.value(LeverId::Interval) - 3.5).abs() < 1e-12);
    assert!((policy.value(LeverId::TrainCount) - 6.5).abs() < 1e-12);
    assert!((policy.lever(LeverId::Speed).relief() - 0.75).abs() < 1e-12);
    assert!((session.overall_relief() - 0.75).abs() < 1e-12);
}
