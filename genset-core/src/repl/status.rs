//! Status read-model for the console.
//!
//! [`StatusSnapshot`] freezes what the operator panel shows at one instant:
//! mode, thresholds, battery health, relay outputs, pending timer, and
//! injected faults. [`StatusFormatter`] keeps the textual rendering
//! consistent across front-ends.

use core::fmt;
use core::time::Duration;

use crate::clock::MonotonicInstant;
use crate::plant::EntropySource;
use crate::sequencer::{EngineMode, FaultFlags, PhaseTimer, Sequencer};
use crate::sequences::start::{MIN_START_VOLTAGE, RUN_RELAYS};
use crate::sequences::{ALL_RELAYS, PhaseKind, RelayId, START_TEMPLATE, relay_by_id};

/// Battery voltage at or above which the battery is reported healthy.
pub const BATTERY_HEALTHY_VOLTAGE: f64 = 12.3;

/// Colour band of the battery gauge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatteryHealth {
    Ok,
    Warn,
    Error,
}

impl BatteryHealth {
    #[must_use]
    pub fn from_voltage(voltage: f64) -> Self {
        if voltage < MIN_START_VOLTAGE {
            BatteryHealth::Error
        } else if voltage < BATTERY_HEALTHY_VOLTAGE {
            BatteryHealth::Warn
        } else {
            BatteryHealth::Ok
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            BatteryHealth::Ok => "ok",
            BatteryHealth::Warn => "warn",
            BatteryHealth::Error => "err",
        }
    }
}

/// Sampled state for a single relay output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaySample {
    pub id: RelayId,
    pub energized: bool,
}

/// Pending phase timer as shown to the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub label: &'static str,
    pub remaining: Duration,
}

/// Snapshot of everything the `status` command reports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub mode: EngineMode,
    pub auto_enabled: bool,
    pub sensed_temperature: f64,
    pub displayed_temperature: f64,
    pub start_temperature: f64,
    pub stop_temperature: f64,
    pub battery_voltage: f64,
    pub battery_health: BatteryHealth,
    pub rpm: u32,
    pub alternator_on: bool,
    pub run_elapsed_seconds: u32,
    pub min_runtime_seconds: u32,
    pub start_attempts: u8,
    pub max_attempts: u8,
    pub timer: Option<TimerSnapshot>,
    pub relays: [RelaySample; 4],
    pub faults: FaultFlags,
}

impl StatusSnapshot {
    /// Captures the sequencer state at `now`.
    #[must_use]
    pub fn capture<I, E>(sequencer: &Sequencer<I, E>, now: I) -> Self
    where
        I: MonotonicInstant,
        E: EntropySource,
    {
        let config = sequencer.config();
        let state = sequencer.state();
        let battery_voltage = state.battery_voltage();
        let timer = state.timer();

        Self {
            mode: state.mode(),
            auto_enabled: state.auto_enabled(),
            sensed_temperature: state.sensed_temperature(),
            displayed_temperature: sequencer.displayed_temperature(),
            start_temperature: config.start_temperature,
            stop_temperature: config.stop_temperature(),
            battery_voltage,
            battery_health: BatteryHealth::from_voltage(battery_voltage),
            rpm: state.rpm(),
            alternator_on: state.alternator_on(),
            run_elapsed_seconds: state.run_elapsed_seconds(),
            min_runtime_seconds: config.min_runtime_seconds,
            start_attempts: state.start_attempts(),
            max_attempts: START_TEMPLATE.max_attempts,
            timer: timer.map(|timer| TimerSnapshot {
                label: timer.label(),
                remaining: timer.deadline().saturating_duration_since(now),
            }),
            relays: relay_outputs(state.mode(), timer),
            faults: state.faults(),
        }
    }

    /// Returns `true` when `relay` is energized in this snapshot.
    #[must_use]
    pub fn energized(&self, relay: RelayId) -> bool {
        self.relays[relay.as_index()].energized
    }
}

/// Relay outputs implied by the mode and pending timer.
#[must_use]
pub fn relay_outputs<I: Copy>(mode: EngineMode, timer: Option<PhaseTimer<I>>) -> [RelaySample; 4] {
    let energized: &[RelayId] = match (mode, timer) {
        (EngineMode::Preheat, _) => START_TEMPLATE
            .phase(PhaseKind::Preheat)
            .map(|step| step.energized)
            .unwrap_or_default(),
        (EngineMode::Crank, Some(PhaseTimer::Crank { .. })) => START_TEMPLATE
            .phase(PhaseKind::Crank)
            .map(|step| step.energized)
            .unwrap_or_default(),
        (EngineMode::Crank, _) => &[RelayId::Ignition],
        (EngineMode::Run, _) => &RUN_RELAYS,
        (EngineMode::Idle | EngineMode::Cooldown | EngineMode::Fault, _) => &[],
    };

    ALL_RELAYS.map(|line| RelaySample {
        id: line.id,
        energized: energized.contains(&line.id),
    })
}

/// Platform hook that supplies live status information.
pub trait StatusProvider<Instant> {
    /// Returns a snapshot if the platform can currently provide one.
    fn snapshot(&mut self, now: Instant) -> Option<StatusSnapshot>;
}

impl<I, E> StatusProvider<I> for Sequencer<I, E>
where
    I: MonotonicInstant,
    E: EntropySource,
{
    fn snapshot(&mut self, now: I) -> Option<StatusSnapshot> {
        Some(StatusSnapshot::capture(self, now))
    }
}

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes every status line, each terminated by a newline.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_engine_line(writer)?;
        writer.write_char('\n')?;
        self.write_sensor_line(writer)?;
        writer.write_char('\n')?;
        self.write_battery_line(writer)?;
        writer.write_char('\n')?;
        self.write_relays_line(writer)?;
        writer.write_char('\n')?;
        self.write_timer_line(writer)?;
        writer.write_char('\n')?;
        self.write_faults_line(writer)?;
        writer.write_char('\n')
    }

    /// Writes the engine line (e.g. `engine mode=RUN auto=on rpm=3000 run=12s/60s attempts=1/3`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_engine_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let s = self.snapshot;
        write!(
            writer,
            "engine mode={} auto={} rpm={} run={}s/{}s attempts={}/{}",
            s.mode,
            on_off(s.auto_enabled),
            s.rpm,
            s.run_elapsed_seconds,
            s.min_runtime_seconds,
            s.start_attempts,
            s.max_attempts
        )
    }

    /// Writes the sensor line (e.g. `sensor temp=17.4C shown=17.5C start<=18.0C stop>=20.0C`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_sensor_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let s = self.snapshot;
        write!(
            writer,
            "sensor temp={:.1}C shown={:.1}C start<={:.1}C stop>={:.1}C",
            s.sensed_temperature, s.displayed_temperature, s.start_temperature, s.stop_temperature
        )
    }

    /// Writes the battery line (e.g. `battery 12.80V health=ok alternator=off`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_battery_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let s = self.snapshot;
        write!(
            writer,
            "battery {:.2}V health={} alternator={}",
            s.battery_voltage,
            s.battery_health.label(),
            on_off(s.alternator_on)
        )
    }

    /// Writes the relay line (e.g. `relays IGN(Q1)=on GLOW(Q2)=off ...`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_relays_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("relays")?;
        for sample in &self.snapshot.relays {
            let line = relay_by_id(sample.id);
            write!(
                writer,
                " {}({})={}",
                line.name,
                line.output,
                on_off(sample.energized)
            )?;
        }
        Ok(())
    }

    /// Writes the timer line (e.g. `timer crank +2.0s` or `timer none`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_timer_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self.snapshot.timer {
            Some(timer) => {
                write!(writer, "timer {} ", timer.label)?;
                write_duration(writer, timer.remaining)
            }
            None => writer.write_str("timer none"),
        }
    }

    /// Writes the fault line (e.g. `faults alternator=off relay=off bias=+0.0C`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_faults_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let faults = self.snapshot.faults;
        write!(
            writer,
            "faults alternator={} relay={} bias={:+.1}C",
            on_off(faults.alternator_fault),
            on_off(faults.start_relay_stuck),
            faults.sensor_bias
        )
    }
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn write_duration<W: fmt::Write>(writer: &mut W, value: Duration) -> fmt::Result {
    if value >= Duration::from_secs(1) {
        let millis = value.as_millis();
        let seconds = millis / 1_000;
        let tenths = (millis % 1_000) / 100;
        write!(writer, "+{seconds}.{tenths}s")
    } else {
        write!(writer, "+{}ms", value.as_millis())
    }
}
