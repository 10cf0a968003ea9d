use genset_core::clock::SimInstant;
use genset_core::config::{ConfigError, Configuration};
use genset_core::events::EventKind;
use genset_core::plant::FixedEntropy;
use genset_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use genset_core::repl::status::StatusFormatter;
use genset_core::sequencer::{EngineMode, Sequencer, StartOutcome, StopOutcome};

type Console = CommandExecutor<Sequencer<SimInstant, FixedEntropy>>;

fn console() -> Console {
    let sequencer = Sequencer::new(Configuration::default(), FixedEntropy::midpoint())
        .expect("default configuration is valid");
    CommandExecutor::new(sequencer, SimInstant::ZERO)
}

fn run(console: &mut Console, line: &str) {
    if let Err(error) = console.execute(line) {
        panic!("`{line}` failed: {error}");
    }
}

#[test]
fn cold_morning_session() {
    let mut console = console();
    run(&mut console, "sim temp 16");

    run(&mut console, "advance 3s");
    assert_eq!(console.target().mode(), EngineMode::Preheat);

    run(&mut console, "advance 11s");
    assert_eq!(console.target().mode(), EngineMode::Run);
    assert_eq!(console.now(), SimInstant::from_secs(14));

    let outcome = console.execute("stop").expect("stop parses");
    assert_eq!(
        outcome,
        CommandOutcome::Stop(StopOutcome::Blocked {
            remaining_seconds: 59
        })
    );
    assert_eq!(console.target().mode(), EngineMode::Run);
}

#[test]
fn status_reflects_the_pending_phase() {
    let mut console = console();
    run(&mut console, "auto off");
    run(&mut console, "start");
    run(&mut console, "advance 2500ms");

    let snapshot = match console.execute("status").expect("status parses") {
        CommandOutcome::Status(Some(snapshot)) => snapshot,
        other => panic!("unexpected outcome: {other:?}"),
    };

    let mut rendered = String::new();
    StatusFormatter::new(&snapshot)
        .write_all(&mut rendered)
        .expect("render into a string");
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(
        lines[0],
        "engine mode=PREHEAT auto=off rpm=0 run=0s/60s attempts=1/3"
    );
    assert_eq!(
        lines[3],
        "relays IGN(Q1)=on GLOW(Q2)=on START(Q3)=off FAN(Q4)=off"
    );
    assert_eq!(lines[4], "timer preheat +5.5s");
}

#[test]
fn tick_command_steps_the_sequencer() {
    let mut console = console();
    run(&mut console, "start");

    match console.execute("tick 8").expect("tick parses") {
        CommandOutcome::Advanced(summary) => {
            assert_eq!(summary.ticks, 8);
            assert_eq!(summary.now, SimInstant::from_secs(8));
            let last = summary.last.expect("last tick report");
            assert!(last.transitioned());
            assert_eq!(last.mode, EngineMode::Crank);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn repeated_start_is_reported_not_raised() {
    let mut console = console();
    run(&mut console, "start");
    let outcome = console.execute("start").expect("start parses");
    assert_eq!(
        outcome,
        CommandOutcome::Start(StartOutcome::Ignored {
            mode: EngineMode::Preheat
        })
    );
}

#[test]
fn config_edits_reach_the_sequencer() {
    let mut console = console();
    run(&mut console, "config set min-runtime 5");
    run(&mut console, "config set noise on");
    let config = *console.target().config();
    assert_eq!(config.min_runtime_seconds, 5);
    assert!(config.noise_enabled);

    match console
        .execute(r#"config export "genset.json""#)
        .expect("export parses")
    {
        CommandOutcome::ConfigExport { path, json } => {
            assert_eq!(path, "genset.json");
            let exported = Configuration::from_json(&json).expect("export reloads");
            assert_eq!(exported, config);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    match console
        .execute(r#"config import "genset.json""#)
        .expect("import parses")
    {
        CommandOutcome::ConfigImport { path } => assert_eq!(path, "genset.json"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let merged = console
        .import_configuration(r#"{"TEMP_START": 15.0}"#)
        .expect("partial import merges");
    assert!((merged.start_temperature - 15.0).abs() < f64::EPSILON);
    assert_eq!(merged.min_runtime_seconds, 5);
}

#[test]
fn rejected_commands_change_nothing() {
    let mut console = console();
    run(&mut console, "advance 2s");
    let before_now = console.now();
    let before_events = console.target().events().len();

    for line in ["advance 3", "sim temp hot", "fault relay maybe", "launch"] {
        let error = console.execute(line).expect_err("line should be rejected");
        assert!(
            matches!(error, CommandError::Parse(_)),
            "`{line}` gave {error:?}"
        );
    }

    let error = console
        .import_configuration(r#"{"DT": -1.0}"#)
        .expect_err("negative hysteresis is invalid");
    assert!(matches!(error, ConfigError::Invalid { field: "DT", .. }));

    assert_eq!(console.now(), before_now);
    assert_eq!(console.target().events().len(), before_events);
    assert_eq!(*console.target().config(), Configuration::default());
    assert_eq!(console.target().mode(), EngineMode::Idle);
}

#[test]
fn log_and_help_are_front_end_outcomes() {
    let mut console = console();
    run(&mut console, "stop");
    assert!(matches!(
        console.target().events().latest().map(|record| record.kind),
        Some(EventKind::RequestIgnored { .. })
    ));

    assert_eq!(
        console.execute("log 5").expect("log parses"),
        CommandOutcome::Log { limit: Some(5) }
    );

    match console.execute("help fault").expect("help parses") {
        CommandOutcome::Help(lines) => {
            assert!(lines.iter().any(|line| line.starts_with("fault relay")));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(
        console.execute("help reboot"),
        Err(CommandError::UnknownTopic("reboot"))
    ));
}
