//! Start/stop sequencing state machine.
//!
//! [`Sequencer`] owns the configuration, engine state, event log, temperature
//! history, and entropy source of one generator set. Callers step it with
//! [`Sequencer::tick`] at the configured cadence and issue operator commands
//! between ticks; every method takes the current instant explicitly.
//!
//! Per tick the sequencer resolves the pending phase timer, samples the
//! displayed temperature into the history, then either runs the stop
//! debounce and alternator charge (in `RUN`) or the battery drain and start
//! debounce (everywhere else). Modeled failures are never Rust errors: they
//! come back as outcome values and land in the event log.

use core::fmt;
use core::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::MonotonicInstant;
use crate::config::{ConfigError, Configuration};
use crate::events::{EventId, EventKind, EventLog, RequestKind};
use crate::plant::{EntropySource, TemperatureHistory};
use crate::sequences::start::{
    CRANK_TEMPERATURE_MARGIN, MIN_CRANK_VOLTAGE, MIN_START_VOLTAGE, NOMINAL_RPM,
};
use crate::sequences::{PhaseKind, START_TEMPLATE, STOP_TEMPLATE};

mod state;

pub use state::{EngineMode, EngineState, FaultFlags, FaultInjection, PhaseTimer};

/// Who asked for a stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopOrigin {
    /// Operator command; subject to the minimum-runtime guard.
    Operator,
    /// Stop debounce satisfied in automatic mode.
    Automatic,
}

impl fmt::Display for StopOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopOrigin::Operator => "operator",
            StopOrigin::Automatic => "automatic",
        })
    }
}

/// Result of a start request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StartOutcome {
    /// Preheat began for the given attempt.
    Preheating { attempt: u8 },
    /// Battery below the start threshold; the engine stays idle.
    BatteryLow { voltage: f64 },
    /// A start sequence is already running or the engine is running.
    Ignored { mode: EngineMode },
}

/// Result of a stop request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopOutcome {
    CoolingDown,
    /// A start sequence was abandoned before the engine ran.
    Aborted { mode: EngineMode },
    /// Minimum runtime not reached yet.
    Blocked { remaining_seconds: u32 },
    NotRunning { mode: EngineMode },
}

/// Summary of one tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickReport {
    pub previous_mode: EngineMode,
    pub mode: EngineMode,
    pub displayed_temperature: f64,
    pub events_recorded: usize,
}

impl TickReport {
    /// Returns `true` when the tick changed the mode.
    #[must_use]
    pub fn transitioned(&self) -> bool {
        self.previous_mode != self.mode
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum StartTrigger {
    Operator,
    Automatic,
    Retry,
}

/// Generator-set sequencer.
pub struct Sequencer<I, E> {
    config: Configuration,
    state: EngineState<I>,
    events: EventLog<I>,
    history: TemperatureHistory,
    entropy: E,
}

impl<I, E> Sequencer<I, E>
where
    I: MonotonicInstant,
    E: EntropySource,
{
    /// Creates a sequencer in its session defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(config: Configuration, entropy: E) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: EngineState::new(),
            events: EventLog::new(),
            history: TemperatureHistory::new(),
            entropy,
        })
    }

    /// Advances the state machine by one step.
    pub fn tick(&mut self, now: I) -> TickReport {
        let previous_mode = self.state.mode;
        let first_event = self.events.next_event_id();

        match self.state.timer {
            Some(PhaseTimer::Preheat { deadline }) if now >= deadline => self.begin_crank(now),
            Some(PhaseTimer::Crank { deadline }) if now >= deadline => self.resolve_crank(now),
            Some(PhaseTimer::Cooldown { deadline }) if now >= deadline => self.finish_cooldown(),
            _ => {}
        }
        if let Some(PhaseTimer::Retry { deadline }) = self.state.timer
            && now >= deadline
        {
            self.start_sequence(now, StartTrigger::Retry);
        }

        let displayed = self
            .state
            .sensor
            .read(self.config.noise_enabled, &mut self.entropy);
        self.history.write(displayed);

        if self.state.mode == EngineMode::Run {
            self.tick_running(now, displayed);
        } else {
            self.tick_stopped(now, displayed);
        }

        TickReport {
            previous_mode,
            mode: self.state.mode,
            displayed_temperature: displayed,
            events_recorded: self.events.since(first_event).count(),
        }
    }

    fn tick_running(&mut self, now: I, displayed: f64) {
        self.state.run_elapsed_seconds = self.state.run_elapsed_seconds.saturating_add(1);
        if self.state.alternator_on {
            self.state.battery.charge();
        }

        if displayed >= self.config.stop_temperature() {
            self.state.stop_debounce_counter = self.state.stop_debounce_counter.saturating_add(1);
            debug!(
                counter = self.state.stop_debounce_counter,
                target = self.config.stop_debounce,
                "stop condition held"
            );
            if self.state.auto_enabled
                && self.state.stop_debounce_counter >= self.config.stop_debounce
                && self.state.run_elapsed_seconds >= self.config.min_runtime_seconds
            {
                self.request_stop(now, StopOrigin::Automatic);
            }
        } else {
            self.state.stop_debounce_counter = 0;
        }
    }

    fn tick_stopped(&mut self, now: I, displayed: f64) {
        self.state.battery.drain();
        if !self.state.auto_enabled || !self.state.mode.is_stopped() {
            return;
        }

        if displayed <= self.config.start_temperature {
            self.state.start_debounce_counter = self.state.start_debounce_counter.saturating_add(1);
            debug!(
                counter = self.state.start_debounce_counter,
                target = self.config.start_debounce,
                "start condition held"
            );
            if self.state.start_debounce_counter >= self.config.start_debounce {
                self.state.start_debounce_counter = 0;
                self.start_sequence(now, StartTrigger::Automatic);
            }
        } else {
            self.state.start_debounce_counter = 0;
        }
    }

    /// Operator start. Bypasses the start debounce but not the battery guard
    /// or the attempt budget.
    ///
    /// Honored in `IDLE`, `FAULT`, and while a retry is pending; anywhere else
    /// the request is logged and ignored.
    pub fn request_start(&mut self, now: I) -> StartOutcome {
        match (self.state.mode, self.state.timer) {
            (mode, _) if mode.is_stopped() => self.start_sequence(now, StartTrigger::Operator),
            (EngineMode::Crank, Some(PhaseTimer::Retry { .. })) => {
                self.start_sequence(now, StartTrigger::Retry)
            }
            (mode, _) => {
                warn!(mode = %mode, "start request ignored");
                self.log(
                    EventKind::RequestIgnored {
                        request: RequestKind::Start,
                        mode,
                    },
                    now,
                );
                StartOutcome::Ignored { mode }
            }
        }
    }

    /// Stop request. The minimum-runtime guard applies to operator stops only.
    ///
    /// An operator stop during `PREHEAT` or `CRANK` abandons the start.
    pub fn request_stop(&mut self, now: I, origin: StopOrigin) -> StopOutcome {
        let mode = self.state.mode;
        match mode {
            EngineMode::Run => {
                let min_runtime = self.config.min_runtime_seconds;
                if origin == StopOrigin::Operator && self.state.run_elapsed_seconds < min_runtime {
                    let remaining_seconds = min_runtime - self.state.run_elapsed_seconds;
                    warn!(remaining_seconds, "stop blocked by minimum runtime");
                    self.log(EventKind::StopBlocked { remaining_seconds }, now);
                    return StopOutcome::Blocked { remaining_seconds };
                }
                self.enter_cooldown(now);
                self.log(EventKind::EngineStopped { origin }, now);
                StopOutcome::CoolingDown
            }
            EngineMode::Preheat | EngineMode::Crank if origin == StopOrigin::Operator => {
                warn!(mode = %mode, "start sequence aborted by operator");
                self.enter_cooldown(now);
                self.log(EventKind::StartAborted { mode }, now);
                StopOutcome::Aborted { mode }
            }
            _ => {
                warn!(mode = %mode, "stop request ignored");
                self.log(
                    EventKind::RequestIgnored {
                        request: RequestKind::Stop,
                        mode,
                    },
                    now,
                );
                StopOutcome::NotRunning { mode }
            }
        }
    }

    /// Enables or suspends automatic start/stop.
    pub fn set_auto(&mut self, enabled: bool) {
        if self.state.auto_enabled != enabled {
            debug!(enabled, "automatic mode changed");
            self.state.auto_enabled = enabled;
        }
    }

    /// Injects or clears a simulated fault. Takes effect on the next tick,
    /// except that alternator output follows the alternator fault immediately
    /// while running.
    pub fn set_fault(&mut self, injection: FaultInjection) {
        debug!(?injection, "fault injection");
        match injection {
            FaultInjection::AlternatorFailure(failed) => self.state.alternator_fault = failed,
            FaultInjection::StartRelayStuck(stuck) => self.state.start_relay_stuck = stuck,
            FaultInjection::SensorBias(bias) if !bias.is_finite() => {
                warn!(bias, "ignoring non-finite sensor bias");
            }
            FaultInjection::SensorBias(bias) => self.state.sensor.set_bias(bias),
            FaultInjection::ClearAll => {
                self.state.alternator_fault = false;
                self.state.start_relay_stuck = false;
                self.state.sensor.set_bias(0.0);
            }
        }
        if self.state.mode == EngineMode::Run {
            self.state.alternator_on = !self.state.alternator_fault;
        }
    }

    /// Replaces the configuration. Deadlines already scheduled keep their instants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and keeps the current configuration when
    /// `config` is invalid.
    pub fn set_configuration(&mut self, config: Configuration) -> Result<(), ConfigError> {
        config.validate()?;
        debug!(?config, "configuration replaced");
        self.config = config;
        Ok(())
    }

    /// Supplies a new true temperature from the driver layer.
    pub fn set_temperature(&mut self, temperature: f64) {
        self.state.sensor.set_temperature(temperature);
    }

    /// Supplies a new battery voltage from the driver layer, clamped to the
    /// physical range.
    pub fn set_battery_voltage(&mut self, voltage: f64) {
        self.state.battery.set_voltage(voltage);
    }

    #[must_use]
    pub const fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> &EngineState<I> {
        &self.state
    }

    #[must_use]
    pub const fn mode(&self) -> EngineMode {
        self.state.mode
    }

    #[must_use]
    pub const fn battery_voltage(&self) -> f64 {
        self.state.battery.voltage()
    }

    #[must_use]
    pub const fn alternator_on(&self) -> bool {
        self.state.alternator_on
    }

    #[must_use]
    pub const fn run_elapsed_seconds(&self) -> u32 {
        self.state.run_elapsed_seconds
    }

    #[must_use]
    pub const fn start_attempts(&self) -> u8 {
        self.state.start_attempts
    }

    /// Biased temperature without noise, as used by the crank check.
    #[must_use]
    pub fn sensed_temperature(&self) -> f64 {
        self.state.sensor.sensed()
    }

    /// Most recent displayed temperature, or the sensed value before the first tick.
    #[must_use]
    pub fn displayed_temperature(&self) -> f64 {
        self.history
            .recent()
            .copied()
            .unwrap_or_else(|| self.sensed_temperature())
    }

    /// Displayed-temperature samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.oldest_ordered().copied()
    }

    #[must_use]
    pub const fn events(&self) -> &EventLog<I> {
        &self.events
    }

    /// Time left on the pending phase timer.
    #[must_use]
    pub fn timer_remaining(&self, now: I) -> Option<Duration> {
        self.state
            .timer
            .map(|timer| timer.deadline().saturating_duration_since(now))
    }

    fn start_sequence(&mut self, now: I, trigger: StartTrigger) -> StartOutcome {
        if trigger != StartTrigger::Retry && self.attempt_budget_resets() {
            self.state.start_attempts = 0;
            self.state.attempts_settled = false;
        }

        let voltage = self.state.battery.voltage();
        if voltage < MIN_START_VOLTAGE {
            warn!(voltage, ?trigger, "start cancelled, battery low");
            self.log(EventKind::BatteryLow { voltage }, now);
            self.transition(EngineMode::Idle, None);
            return StartOutcome::BatteryLow { voltage };
        }

        self.state.start_attempts = self.state.start_attempts.saturating_add(1);
        let attempt = self.state.start_attempts;
        let deadline = now + self.config.scale(START_TEMPLATE.hold_for(PhaseKind::Preheat));
        self.transition(EngineMode::Preheat, Some(PhaseTimer::Preheat { deadline }));
        self.log(EventKind::PreheatStarted { attempt }, now);
        StartOutcome::Preheating { attempt }
    }

    /// A fresh start counts from one after `FAULT`, after a chain that reached
    /// `RUN`, or once the budget is spent. A chain cancelled for low battery
    /// keeps its count.
    fn attempt_budget_resets(&self) -> bool {
        self.state.mode == EngineMode::Fault
            || self.state.attempts_settled
            || self.state.start_attempts >= START_TEMPLATE.max_attempts
    }

    fn begin_crank(&mut self, now: I) {
        let sag = self.state.battery.crank_sag(&mut self.entropy);
        let voltage = self.state.battery.voltage();
        debug!(sag, voltage, "starter load applied");

        let deadline = now + self.config.scale(START_TEMPLATE.hold_for(PhaseKind::Crank));
        self.transition(EngineMode::Crank, Some(PhaseTimer::Crank { deadline }));
        self.log(EventKind::StarterEngaged { voltage }, now);
    }

    fn resolve_crank(&mut self, now: I) {
        let voltage = self.state.battery.voltage();
        let sensed = self.state.sensor.sensed();
        let ignited = !self.state.start_relay_stuck
            && voltage > MIN_CRANK_VOLTAGE
            && sensed <= self.config.start_temperature + CRANK_TEMPERATURE_MARGIN;

        if ignited {
            self.enter_run(now);
            return;
        }

        let attempt = self.state.start_attempts;
        warn!(
            attempt,
            voltage,
            sensed,
            relay_stuck = self.state.start_relay_stuck,
            "crank failed"
        );
        self.log(EventKind::CrankFailed { attempt }, now);

        let max_attempts = START_TEMPLATE.max_attempts;
        match START_TEMPLATE.retry_delay {
            Some(retry_delay) if attempt < max_attempts => {
                let delay = self.config.scale(retry_delay);
                self.state.timer = Some(PhaseTimer::Retry {
                    deadline: now + delay,
                });
                self.log(
                    EventKind::RetryScheduled {
                        next_attempt: attempt.saturating_add(1),
                        max_attempts,
                        delay,
                    },
                    now,
                );
            }
            _ => {
                self.transition(EngineMode::Fault, None);
                self.log(EventKind::StartFailure { attempts: attempt }, now);
            }
        }
    }

    fn enter_run(&mut self, now: I) {
        self.state.rpm = NOMINAL_RPM;
        self.state.alternator_on = !self.state.alternator_fault;
        self.state.run_elapsed_seconds = 0;
        self.state.attempts_settled = true;
        self.state.start_debounce_counter = 0;
        self.state.stop_debounce_counter = 0;
        self.transition(EngineMode::Run, None);
        self.log(
            EventKind::EngineRunning {
                alternator_on: self.state.alternator_on,
            },
            now,
        );
    }

    fn enter_cooldown(&mut self, now: I) {
        self.state.rpm = 0;
        self.state.alternator_on = false;
        let deadline = now + self.config.scale(STOP_TEMPLATE.cooldown);
        self.transition(EngineMode::Cooldown, Some(PhaseTimer::Cooldown { deadline }));
    }

    fn finish_cooldown(&mut self) {
        self.transition(EngineMode::Idle, None);
    }

    fn transition(&mut self, next: EngineMode, timer: Option<PhaseTimer<I>>) {
        let previous = self.state.mode;
        self.state.mode = next;
        self.state.timer = timer;
        if previous != next {
            info!(from = %previous, to = %next, "mode transition");
        }
    }

    fn log(&mut self, kind: EventKind, now: I) -> EventId {
        self.events.record(kind, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimInstant;
    use crate::events::Severity;
    use crate::plant::FixedEntropy;

    fn sequencer() -> Sequencer<SimInstant, FixedEntropy> {
        Sequencer::new(Configuration::default(), FixedEntropy::midpoint())
            .expect("default configuration is valid")
    }

    #[test]
    fn starts_idle_with_empty_log() {
        let sequencer = sequencer();
        assert_eq!(sequencer.mode(), EngineMode::Idle);
        assert!(sequencer.events().is_empty());
        assert!(sequencer.state().timer().is_none());
        assert!((sequencer.displayed_temperature() - 22.0).abs() < f64::EPSILON);
    }

    #[test]
    fn manual_start_schedules_preheat() {
        let mut sequencer = sequencer();
        let now = SimInstant::from_secs(1);
        assert_eq!(
            sequencer.request_start(now),
            StartOutcome::Preheating { attempt: 1 }
        );
        assert_eq!(sequencer.mode(), EngineMode::Preheat);
        assert_eq!(
            sequencer.state().preheat_deadline(),
            Some(now + Duration::from_secs(8))
        );
        let latest = sequencer.events().latest().expect("preheat event");
        assert_eq!(latest.severity, Severity::Info);
    }

    #[test]
    fn start_while_running_a_sequence_is_ignored() {
        let mut sequencer = sequencer();
        let now = SimInstant::from_secs(1);
        sequencer.request_start(now);
        assert_eq!(
            sequencer.request_start(now),
            StartOutcome::Ignored {
                mode: EngineMode::Preheat
            }
        );
        assert_eq!(sequencer.start_attempts(), 1);
    }

    #[test]
    fn operator_stop_aborts_preheat_into_cooldown() {
        let mut sequencer = sequencer();
        sequencer.request_start(SimInstant::from_secs(1));
        let outcome = sequencer.request_stop(SimInstant::from_secs(2), StopOrigin::Operator);
        assert_eq!(
            outcome,
            StopOutcome::Aborted {
                mode: EngineMode::Preheat
            }
        );
        assert_eq!(sequencer.mode(), EngineMode::Cooldown);
        assert_eq!(sequencer.state().preheat_deadline(), None);

        sequencer.tick(SimInstant::from_millis(2_800));
        assert_eq!(sequencer.mode(), EngineMode::Idle);
    }

    #[test]
    fn stop_while_idle_is_a_guarded_no_op() {
        let mut sequencer = sequencer();
        let outcome = sequencer.request_stop(SimInstant::ZERO, StopOrigin::Operator);
        assert_eq!(
            outcome,
            StopOutcome::NotRunning {
                mode: EngineMode::Idle
            }
        );
        assert_eq!(sequencer.mode(), EngineMode::Idle);
        assert_eq!(
            sequencer.events().latest().map(|record| record.severity),
            Some(Severity::Warn)
        );
    }

    #[test]
    fn set_auto_is_idempotent() {
        let mut sequencer = sequencer();
        sequencer.set_auto(false);
        sequencer.set_auto(false);
        assert!(!sequencer.state().auto_enabled());
        assert!(sequencer.events().is_empty());
    }

    #[test]
    fn invalid_configuration_is_refused() {
        let mut sequencer = sequencer();
        let invalid = Configuration {
            hysteresis_delta: -3.0,
            ..Configuration::default()
        };
        assert!(sequencer.set_configuration(invalid).is_err());
        assert_eq!(*sequencer.config(), Configuration::default());
    }

    #[test]
    fn sensor_bias_shifts_displayed_temperature() {
        let mut sequencer = sequencer();
        sequencer.set_fault(FaultInjection::SensorBias(0.8));
        let report = sequencer.tick(SimInstant::from_secs(1));
        assert!((report.displayed_temperature - 22.8).abs() < 1e-9);
        sequencer.set_fault(FaultInjection::ClearAll);
        assert!(!sequencer.state().faults().any());
    }

    #[test]
    fn non_finite_bias_keeps_the_injected_bias() {
        let mut sequencer = sequencer();
        sequencer.set_fault(FaultInjection::SensorBias(0.8));
        sequencer.set_fault(FaultInjection::SensorBias(f64::NAN));
        sequencer.set_fault(FaultInjection::SensorBias(f64::INFINITY));
        assert!((sequencer.state().faults().sensor_bias - 0.8).abs() < 1e-9);
        assert!((sequencer.sensed_temperature() - 22.8).abs() < 1e-9);
    }
}
