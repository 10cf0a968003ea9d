//! Engine state owned by the sequencer.

use core::fmt;

use crate::plant::{Battery, INITIAL_BATTERY_VOLTAGE, INITIAL_TEMPERATURE, TemperatureSensor};

/// Sequencer modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EngineMode {
    Idle,
    Preheat,
    Crank,
    Run,
    Cooldown,
    Fault,
}

impl EngineMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            EngineMode::Idle => "IDLE",
            EngineMode::Preheat => "PREHEAT",
            EngineMode::Crank => "CRANK",
            EngineMode::Run => "RUN",
            EngineMode::Cooldown => "COOLDOWN",
            EngineMode::Fault => "FAULT",
        }
    }

    /// Returns `true` in modes where a fresh start sequence may begin.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, EngineMode::Idle | EngineMode::Fault)
    }

    /// Returns `true` while a start sequence is in flight.
    #[must_use]
    pub const fn is_starting(self) -> bool {
        matches!(self, EngineMode::Preheat | EngineMode::Crank)
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single pending phase deadline.
///
/// Each variant belongs to exactly one mode (see [`PhaseTimer::owner`]). The
/// sequencer clears the timer on every mode transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseTimer<I> {
    Preheat { deadline: I },
    Crank { deadline: I },
    /// A failed crank waiting for the next attempt. Owned by [`EngineMode::Crank`].
    Retry { deadline: I },
    Cooldown { deadline: I },
}

impl<I: Copy> PhaseTimer<I> {
    #[must_use]
    pub const fn deadline(&self) -> I {
        match *self {
            PhaseTimer::Preheat { deadline }
            | PhaseTimer::Crank { deadline }
            | PhaseTimer::Retry { deadline }
            | PhaseTimer::Cooldown { deadline } => deadline,
        }
    }

    /// Mode in which this timer may be pending.
    #[must_use]
    pub const fn owner(&self) -> EngineMode {
        match self {
            PhaseTimer::Preheat { .. } => EngineMode::Preheat,
            PhaseTimer::Crank { .. } | PhaseTimer::Retry { .. } => EngineMode::Crank,
            PhaseTimer::Cooldown { .. } => EngineMode::Cooldown,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            PhaseTimer::Preheat { .. } => "preheat",
            PhaseTimer::Crank { .. } => "crank",
            PhaseTimer::Retry { .. } => "retry",
            PhaseTimer::Cooldown { .. } => "cooldown",
        }
    }
}

/// Injected fault conditions.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FaultFlags {
    pub alternator_fault: bool,
    pub start_relay_stuck: bool,
    pub sensor_bias: f64,
}

impl FaultFlags {
    /// Returns `true` when any fault is injected.
    #[must_use]
    pub fn any(&self) -> bool {
        self.alternator_fault || self.start_relay_stuck || self.sensor_bias.abs() > f64::EPSILON
    }
}

/// Operator-requested change to the injected faults.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FaultInjection {
    AlternatorFailure(bool),
    StartRelayStuck(bool),
    SensorBias(f64),
    ClearAll,
}

/// Mutable engine state. Only the sequencer writes it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineState<I> {
    pub(crate) mode: EngineMode,
    pub(crate) sensor: TemperatureSensor,
    pub(crate) battery: Battery,
    pub(crate) rpm: u32,
    pub(crate) auto_enabled: bool,
    pub(crate) alternator_on: bool,
    pub(crate) run_elapsed_seconds: u32,
    pub(crate) start_attempts: u8,
    /// Set once a start chain reaches `RUN`; the next fresh start counts from one.
    pub(crate) attempts_settled: bool,
    pub(crate) start_debounce_counter: u32,
    pub(crate) stop_debounce_counter: u32,
    pub(crate) alternator_fault: bool,
    pub(crate) start_relay_stuck: bool,
    pub(crate) timer: Option<PhaseTimer<I>>,
}

impl<I: Copy> EngineState<I> {
    /// Session defaults: idle, automatic mode, 22 degrees, 12.8 V.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: EngineMode::Idle,
            sensor: TemperatureSensor::new(INITIAL_TEMPERATURE),
            battery: Battery::new(INITIAL_BATTERY_VOLTAGE),
            rpm: 0,
            auto_enabled: true,
            alternator_on: false,
            run_elapsed_seconds: 0,
            start_attempts: 0,
            attempts_settled: true,
            start_debounce_counter: 0,
            stop_debounce_counter: 0,
            alternator_fault: false,
            start_relay_stuck: false,
            timer: None,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> EngineMode {
        self.mode
    }

    /// True temperature, before bias and noise.
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.sensor.temperature()
    }

    /// Temperature with the injected bias applied and no noise.
    #[must_use]
    pub fn sensed_temperature(&self) -> f64 {
        self.sensor.sensed()
    }

    #[must_use]
    pub const fn battery_voltage(&self) -> f64 {
        self.battery.voltage()
    }

    #[must_use]
    pub const fn rpm(&self) -> u32 {
        self.rpm
    }

    #[must_use]
    pub const fn auto_enabled(&self) -> bool {
        self.auto_enabled
    }

    #[must_use]
    pub const fn alternator_on(&self) -> bool {
        self.alternator_on
    }

    #[must_use]
    pub const fn run_elapsed_seconds(&self) -> u32 {
        self.run_elapsed_seconds
    }

    #[must_use]
    pub const fn start_attempts(&self) -> u8 {
        self.start_attempts
    }

    #[must_use]
    pub const fn start_debounce_counter(&self) -> u32 {
        self.start_debounce_counter
    }

    #[must_use]
    pub const fn stop_debounce_counter(&self) -> u32 {
        self.stop_debounce_counter
    }

    #[must_use]
    pub const fn faults(&self) -> FaultFlags {
        FaultFlags {
            alternator_fault: self.alternator_fault,
            start_relay_stuck: self.start_relay_stuck,
            sensor_bias: self.sensor.bias(),
        }
    }

    #[must_use]
    pub const fn timer(&self) -> Option<PhaseTimer<I>> {
        self.timer
    }

    #[must_use]
    pub fn preheat_deadline(&self) -> Option<I> {
        match self.timer {
            Some(PhaseTimer::Preheat { deadline }) => Some(deadline),
            _ => None,
        }
    }

    #[must_use]
    pub fn crank_deadline(&self) -> Option<I> {
        match self.timer {
            Some(PhaseTimer::Crank { deadline }) => Some(deadline),
            _ => None,
        }
    }

    #[must_use]
    pub fn retry_deadline(&self) -> Option<I> {
        match self.timer {
            Some(PhaseTimer::Retry { deadline }) => Some(deadline),
            _ => None,
        }
    }

    #[must_use]
    pub fn cooldown_deadline(&self) -> Option<I> {
        match self.timer {
            Some(PhaseTimer::Cooldown { deadline }) => Some(deadline),
            _ => None,
        }
    }

    /// Returns `true` when the pending timer, if any, belongs to the current mode.
    #[must_use]
    pub fn timer_matches_mode(&self) -> bool {
        self.timer.is_none_or(|timer| timer.owner() == self.mode)
    }
}

impl<I: Copy> Default for EngineState<I> {
    fn default() -> Self {
        Self::new()
    }
}
