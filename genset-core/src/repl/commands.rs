//! Console command dispatcher.
//!
//! [`CommandExecutor`] parses a line, drives the sequencer through the
//! [`SequencerControl`] seam, and owns the simulated clock that `tick` and
//! `advance` move forward. Commands that only render or touch files come back
//! as outcomes for the front-end to finish.

use core::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::clock::MonotonicInstant;
use crate::config::{ConfigError, ConfigSetting, Configuration};
use crate::plant::EntropySource;
use crate::sequencer::{
    FaultInjection, Sequencer, StartOutcome, StopOrigin, StopOutcome, TickReport,
};

use super::catalog;
use super::grammar::{self, Command, ConfigCommand, FaultCommand, ParseError, SimCommand};
use super::status::{StatusProvider, StatusSnapshot};

/// Operations the console needs from a sequencer.
pub trait SequencerControl {
    type Instant: MonotonicInstant;

    fn tick(&mut self, now: Self::Instant) -> TickReport;
    fn request_start(&mut self, now: Self::Instant) -> StartOutcome;
    fn request_stop(&mut self, now: Self::Instant, origin: StopOrigin) -> StopOutcome;
    fn set_auto(&mut self, enabled: bool);
    fn set_fault(&mut self, injection: FaultInjection);
    fn set_temperature(&mut self, temperature: f64);
    fn set_battery_voltage(&mut self, voltage: f64);
    fn configuration(&self) -> Configuration;
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` is rejected.
    fn set_configuration(&mut self, config: Configuration) -> Result<(), ConfigError>;
}

impl<I, E> SequencerControl for Sequencer<I, E>
where
    I: MonotonicInstant,
    E: EntropySource,
{
    type Instant = I;

    fn tick(&mut self, now: I) -> TickReport {
        Sequencer::tick(self, now)
    }

    fn request_start(&mut self, now: I) -> StartOutcome {
        Sequencer::request_start(self, now)
    }

    fn request_stop(&mut self, now: I, origin: StopOrigin) -> StopOutcome {
        Sequencer::request_stop(self, now, origin)
    }

    fn set_auto(&mut self, enabled: bool) {
        Sequencer::set_auto(self, enabled);
    }

    fn set_fault(&mut self, injection: FaultInjection) {
        Sequencer::set_fault(self, injection);
    }

    fn set_temperature(&mut self, temperature: f64) {
        Sequencer::set_temperature(self, temperature);
    }

    fn set_battery_voltage(&mut self, voltage: f64) {
        Sequencer::set_battery_voltage(self, voltage);
    }

    fn configuration(&self) -> Configuration {
        *self.config()
    }

    fn set_configuration(&mut self, config: Configuration) -> Result<(), ConfigError> {
        Sequencer::set_configuration(self, config)
    }
}

/// Summary of a `tick` or `advance` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdvanceSummary<Instant> {
    pub ticks: u32,
    pub now: Instant,
    pub last: Option<TickReport>,
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome<'a, Instant> {
    Start(StartOutcome),
    Stop(StopOutcome),
    Auto { enabled: bool },
    Fault(FaultInjection),
    Sensor(SimCommand),
    ConfigApplied(ConfigSetting),
    ConfigShow(Configuration),
    /// Pretty JSON for the front-end to write to `path`.
    ConfigExport { path: &'a str, json: String },
    /// The front-end should read `path` and pass its text to
    /// [`CommandExecutor::import_configuration`].
    ConfigImport { path: &'a str },
    Advanced(AdvanceSummary<Instant>),
    Status(Option<StatusSnapshot>),
    Log { limit: Option<u32> },
    Help(Vec<String>),
}

/// Errors surfaced while executing a command. None of them mutate state.
#[derive(Debug, Error)]
pub enum CommandError<'a> {
    #[error("{0}")]
    Parse(ParseError<'a>),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no help for `{0}`")]
    UnknownTopic(&'a str),
}

impl<'a> From<ParseError<'a>> for CommandError<'a> {
    fn from(error: ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

type CommandResult<'a, S> =
    Result<CommandOutcome<'a, <S as SequencerControl>::Instant>, CommandError<'a>>;

/// Dispatches console commands into a sequencer on a simulated clock.
pub struct CommandExecutor<S: SequencerControl> {
    target: S,
    now: S::Instant,
    next_tick: S::Instant,
}

impl<S: SequencerControl> CommandExecutor<S> {
    /// Creates an executor whose clock starts at `start`; the first tick falls
    /// one interval later.
    #[must_use]
    pub fn new(target: S, start: S::Instant) -> Self {
        let next_tick = start + target.configuration().tick_interval();
        Self {
            target,
            now: start,
            next_tick,
        }
    }

    #[must_use]
    pub fn target(&self) -> &S {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut S {
        &mut self.target
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.target
    }

    /// Current simulated instant.
    #[must_use]
    pub fn now(&self) -> S::Instant {
        self.now
    }

    /// Instant of the next scheduled tick.
    #[must_use]
    pub fn next_tick(&self) -> S::Instant {
        self.next_tick
    }

    /// Advances by `count` ticks, each at the configured cadence.
    pub fn tick(&mut self, count: u32) -> AdvanceSummary<S::Instant> {
        let mut last = None;
        for _ in 0..count {
            last = Some(self.step());
        }
        AdvanceSummary {
            ticks: count,
            now: self.now,
            last,
        }
    }

    /// Advances simulated time by `duration`, ticking at every cadence
    /// boundary crossed on the way.
    pub fn advance(&mut self, duration: Duration) -> AdvanceSummary<S::Instant> {
        let target = self.now + duration;
        let mut ticks = 0_u32;
        let mut last = None;
        while self.next_tick <= target {
            last = Some(self.step());
            ticks = ticks.saturating_add(1);
        }
        self.now = target;
        AdvanceSummary {
            ticks,
            now: self.now,
            last,
        }
    }

    /// Merges a JSON document into the active configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and keeps the current configuration when the
    /// document is malformed or the merged result is invalid.
    pub fn import_configuration(&mut self, text: &str) -> Result<Configuration, ConfigError> {
        let mut config = self.target.configuration();
        config.merge_json(text)?;
        self.target.set_configuration(config)?;
        Ok(config)
    }

    fn step(&mut self) -> TickReport {
        self.now = self.next_tick;
        let report = self.target.tick(self.now);
        self.next_tick = self.now + self.target.configuration().tick_interval();
        report
    }
}

impl<S> CommandExecutor<S>
where
    S: SequencerControl + StatusProvider<<S as SequencerControl>::Instant>,
{
    /// Parses and executes a console command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the line does not parse, a configuration
    /// edit is rejected, or a help topic is unknown.
    pub fn execute<'a>(&mut self, line: &'a str) -> CommandResult<'a, S> {
        let command = grammar::parse(line)?;
        debug!(?command, "console command");
        self.dispatch(command)
    }

    fn dispatch<'a>(&mut self, command: Command<'a>) -> CommandResult<'a, S> {
        let now = self.now;
        let outcome = match command {
            Command::Start => CommandOutcome::Start(self.target.request_start(now)),
            Command::Stop => {
                CommandOutcome::Stop(self.target.request_stop(now, StopOrigin::Operator))
            }
            Command::Auto(enabled) => {
                self.target.set_auto(enabled);
                CommandOutcome::Auto { enabled }
            }
            Command::Fault(action) => {
                let injection = match action {
                    FaultCommand::Alternator(on) => FaultInjection::AlternatorFailure(on),
                    FaultCommand::Relay(on) => FaultInjection::StartRelayStuck(on),
                    FaultCommand::Bias(bias) => FaultInjection::SensorBias(bias),
                    FaultCommand::Clear => FaultInjection::ClearAll,
                };
                self.target.set_fault(injection);
                CommandOutcome::Fault(injection)
            }
            Command::Sim(input) => {
                match input {
                    SimCommand::Temperature(value) => self.target.set_temperature(value),
                    SimCommand::Battery(value) => self.target.set_battery_voltage(value),
                }
                CommandOutcome::Sensor(input)
            }
            Command::Config(action) => self.handle_config(action)?,
            Command::Tick { count } => CommandOutcome::Advanced(self.tick(count)),
            Command::Advance(duration) => CommandOutcome::Advanced(self.advance(duration)),
            Command::Status => CommandOutcome::Status(self.target.snapshot(now)),
            Command::Log { limit } => CommandOutcome::Log { limit },
            Command::Help(help) => CommandOutcome::Help(help_lines(help.topic)?),
        };
        Ok(outcome)
    }

    fn handle_config<'a>(&mut self, action: ConfigCommand<'a>) -> CommandResult<'a, S> {
        let config = self.target.configuration();
        Ok(match action {
            ConfigCommand::Show => CommandOutcome::ConfigShow(config),
            ConfigCommand::Export(path) => CommandOutcome::ConfigExport {
                path,
                json: config.to_json_pretty()?,
            },
            ConfigCommand::Import(path) => CommandOutcome::ConfigImport { path },
            ConfigCommand::Set(setting) => {
                let next = config.with_setting(setting)?;
                self.target.set_configuration(next)?;
                CommandOutcome::ConfigApplied(setting)
            }
        })
    }
}

/// Renders `help` output: the command list, or the usage of one command.
///
/// # Errors
///
/// Returns [`CommandError::UnknownTopic`] when `topic` names no command.
pub fn help_lines(topic: Option<&str>) -> Result<Vec<String>, CommandError<'_>> {
    match topic {
        None => Ok(catalog::commands()
            .iter()
            .map(|spec| format!("{:<8} {}", spec.name, spec.summary))
            .collect()),
        Some(name) => catalog::find(name)
            .map(catalog::usage_lines)
            .ok_or(CommandError::UnknownTopic(name)),
    }
}
