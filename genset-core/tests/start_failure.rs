use genset_core::clock::SimInstant;
use genset_core::config::Configuration;
use genset_core::events::{EventKind, Severity};
use genset_core::plant::FixedEntropy;
use genset_core::sequencer::{
    EngineMode, FaultInjection, Sequencer, StartOutcome, StopOrigin,
};

type TestSequencer = Sequencer<SimInstant, FixedEntropy>;

fn sequencer() -> TestSequencer {
    Sequencer::new(Configuration::default(), FixedEntropy::new(0.0))
        .expect("default configuration is valid")
}

fn tick_through(sequencer: &mut TestSequencer, first: u64, last: u64) {
    for second in first..=last {
        sequencer.tick(SimInstant::from_secs(second));
    }
}

#[test]
fn stuck_start_relay_exhausts_attempts_into_fault() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(14.0);
    sequencer.set_temperature(15.0);
    sequencer.set_fault(FaultInjection::StartRelayStuck(true));
    sequencer.set_auto(false);

    assert_eq!(
        sequencer.request_start(SimInstant::ZERO),
        StartOutcome::Preheating { attempt: 1 }
    );

    tick_through(&mut sequencer, 1, 11);
    assert_eq!(sequencer.mode(), EngineMode::Crank);
    assert_eq!(
        sequencer.state().retry_deadline(),
        Some(SimInstant::from_secs(16))
    );

    sequencer.tick(SimInstant::from_secs(16));
    assert_eq!(sequencer.mode(), EngineMode::Preheat);
    assert_eq!(sequencer.start_attempts(), 2);

    tick_through(&mut sequencer, 17, 42);
    assert_eq!(sequencer.mode(), EngineMode::Crank);
    assert_eq!(sequencer.start_attempts(), 3);

    sequencer.tick(SimInstant::from_secs(43));
    assert_eq!(sequencer.mode(), EngineMode::Fault);
    assert!(sequencer.state().timer().is_none());

    let failure = sequencer.events().latest().copied().expect("failure event");
    assert_eq!(failure.severity, Severity::Error);
    assert_eq!(failure.kind, EventKind::StartFailure { attempts: 3 });
    assert_eq!(failure.kind.to_string(), "A002 start failure after 3 attempts");

    let crank_failures = sequencer
        .events()
        .oldest_first()
        .filter(|record| matches!(record.kind, EventKind::CrankFailed { .. }))
        .count();
    assert_eq!(crank_failures, 3);

    let retries: Vec<String> = sequencer
        .events()
        .oldest_first()
        .filter(|record| matches!(record.kind, EventKind::RetryScheduled { .. }))
        .map(|record| record.kind.to_string())
        .collect();
    assert_eq!(retries, ["retry 2/3 in 5s", "retry 3/3 in 5s"]);
}

#[test]
fn fault_is_left_by_a_fresh_start() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(14.0);
    sequencer.set_temperature(15.0);
    sequencer.set_fault(FaultInjection::StartRelayStuck(true));
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 43);
    assert_eq!(sequencer.mode(), EngineMode::Fault);

    sequencer.set_fault(FaultInjection::ClearAll);
    sequencer.set_battery_voltage(13.0);
    assert_eq!(
        sequencer.request_start(SimInstant::from_secs(50)),
        StartOutcome::Preheating { attempt: 1 }
    );
    tick_through(&mut sequencer, 51, 61);
    assert_eq!(sequencer.mode(), EngineMode::Run);
}

#[test]
fn automatic_mode_restarts_from_fault() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(14.0);
    sequencer.set_fault(FaultInjection::StartRelayStuck(true));
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 43);
    assert_eq!(sequencer.mode(), EngineMode::Fault);

    sequencer.set_fault(FaultInjection::ClearAll);
    sequencer.set_temperature(15.0);
    tick_through(&mut sequencer, 44, 46);
    assert_eq!(sequencer.mode(), EngineMode::Preheat);
    assert_eq!(sequencer.start_attempts(), 1);
}

#[test]
fn low_battery_refuses_start() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(11.5);

    let outcome = sequencer.request_start(SimInstant::from_secs(2));
    assert!(matches!(
        outcome,
        StartOutcome::BatteryLow { voltage } if (voltage - 11.5).abs() < 1e-9
    ));
    assert_eq!(sequencer.mode(), EngineMode::Idle);
    assert!(sequencer.state().timer().is_none());
    assert_eq!(sequencer.start_attempts(), 0);

    let alarm = sequencer.events().latest().copied().expect("alarm event");
    assert_eq!(alarm.severity, Severity::Error);
    assert_eq!(alarm.kind.alarm_code(), Some("A001"));
}

#[test]
fn retry_rechecks_battery_after_sag() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(12.2);
    sequencer.set_temperature(15.0);
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);

    tick_through(&mut sequencer, 1, 11);
    assert_eq!(sequencer.mode(), EngineMode::Crank);
    assert!(sequencer.state().retry_deadline().is_some());

    tick_through(&mut sequencer, 12, 16);
    assert_eq!(sequencer.mode(), EngineMode::Idle);
    assert!(sequencer.state().timer().is_none());
    assert_eq!(sequencer.start_attempts(), 1);

    let kinds: Vec<EventKind> = sequencer
        .events()
        .oldest_first()
        .map(|record| record.kind)
        .collect();
    assert!(matches!(
        kinds.as_slice(),
        [
            EventKind::PreheatStarted { attempt: 1 },
            EventKind::StarterEngaged { .. },
            EventKind::CrankFailed { attempt: 1 },
            EventKind::RetryScheduled { next_attempt: 2, .. },
            EventKind::BatteryLow { .. },
        ]
    ));
}

fn crank_failures(sequencer: &TestSequencer) -> usize {
    sequencer
        .events()
        .oldest_first()
        .filter(|record| matches!(record.kind, EventKind::CrankFailed { .. }))
        .count()
}

#[test]
fn battery_low_cancel_keeps_the_attempt_count() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(12.2);
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 16);
    assert_eq!(sequencer.mode(), EngineMode::Idle);
    assert_eq!(sequencer.start_attempts(), 1);

    sequencer.set_battery_voltage(14.0);
    assert_eq!(
        sequencer.request_start(SimInstant::from_secs(17)),
        StartOutcome::Preheating { attempt: 2 }
    );

    tick_through(&mut sequencer, 18, 43);
    assert_eq!(sequencer.mode(), EngineMode::Crank);
    assert_eq!(sequencer.start_attempts(), 3);

    sequencer.tick(SimInstant::from_secs(44));
    assert_eq!(sequencer.mode(), EngineMode::Fault);
    assert_eq!(
        sequencer.events().latest().map(|record| record.kind),
        Some(EventKind::StartFailure { attempts: 3 })
    );
    assert_eq!(crank_failures(&sequencer), 3);
}

#[test]
fn start_after_a_completed_run_counts_from_one() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(14.0);
    sequencer.set_temperature(15.0);
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 70);
    assert_eq!(sequencer.mode(), EngineMode::Run);

    sequencer.request_stop(SimInstant::from_secs(70), StopOrigin::Operator);
    sequencer.tick(SimInstant::from_secs(71));
    assert_eq!(sequencer.mode(), EngineMode::Idle);
    assert_eq!(sequencer.start_attempts(), 1);

    assert_eq!(
        sequencer.request_start(SimInstant::from_secs(72)),
        StartOutcome::Preheating { attempt: 1 }
    );
}

#[test]
fn aborting_the_last_attempt_spends_the_budget() {
    let mut sequencer = sequencer();
    sequencer.set_battery_voltage(14.0);
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 33);
    assert_eq!(sequencer.mode(), EngineMode::Preheat);
    assert_eq!(sequencer.start_attempts(), 3);

    sequencer.request_stop(SimInstant::from_secs(33), StopOrigin::Operator);
    sequencer.tick(SimInstant::from_secs(34));
    assert_eq!(sequencer.mode(), EngineMode::Idle);
    assert_eq!(crank_failures(&sequencer), 2);

    assert_eq!(
        sequencer.request_start(SimInstant::from_secs(35)),
        StartOutcome::Preheating { attempt: 1 }
    );
}

#[test]
fn operator_start_skips_pending_retry_delay() {
    let mut sequencer = sequencer();
    sequencer.set_auto(false);
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 11);
    assert!(sequencer.state().retry_deadline().is_some());

    let outcome = sequencer.request_start(SimInstant::from_millis(12_500));
    assert_eq!(outcome, StartOutcome::Preheating { attempt: 2 });
    assert_eq!(
        sequencer.state().preheat_deadline(),
        Some(SimInstant::from_millis(20_500))
    );
}

#[test]
fn start_request_during_crank_is_ignored() {
    let mut sequencer = sequencer();
    sequencer.request_start(SimInstant::ZERO);
    tick_through(&mut sequencer, 1, 8);
    assert_eq!(sequencer.mode(), EngineMode::Crank);

    let outcome = sequencer.request_start(SimInstant::from_secs(9));
    assert_eq!(
        outcome,
        StartOutcome::Ignored {
            mode: EngineMode::Crank
        }
    );
    assert_eq!(sequencer.start_attempts(), 1);
    assert_eq!(
        sequencer.events().latest().map(|record| record.severity),
        Some(Severity::Warn)
    );
}
