use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use genset_core::clock::SimInstant;
use genset_core::config::Configuration;
use genset_core::events::{EventId, EventRecord, Severity};
use genset_core::plant::RngEntropy;
use genset_core::repl::commands::{AdvanceSummary, CommandError, CommandExecutor, CommandOutcome};
use genset_core::repl::completion::{CompletionEngine, Replacement};
use genset_core::repl::grammar::SimCommand;
use genset_core::repl::status::StatusFormatter;
use genset_core::sequencer::{FaultInjection, Sequencer, StartOutcome, StopOutcome};
use genset_core::sequences::START_TEMPLATE;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

type GensetSequencer = Sequencer<SimInstant, RngEntropy<ChaCha8Rng>>;

const DEFAULT_LOG_LIMIT: u32 = 20;

/// Where a session transcript is written and the header it opens with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TranscriptProfile {
    pub log_path: &'static str,
    pub header: &'static str,
}

impl TranscriptProfile {
    pub const INTERACTIVE: Self = Self {
        log_path: "transcripts/genset-session.log",
        header: "Genset Sequencer Emulator session transcript",
    };
}

/// One line of console output. Event lines carry their severity for colouring.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseLine {
    pub severity: Option<Severity>,
    pub text: String,
}

impl ResponseLine {
    fn plain(text: String) -> Self {
        Self {
            severity: None,
            text,
        }
    }

    fn event(record: &EventRecord<SimInstant>) -> Self {
        Self {
            severity: Some(record.severity),
            text: format!(
                "EVT #{} +{}ms {} {}",
                record.id,
                record.timestamp.since_start().as_millis(),
                record.severity,
                record.kind
            ),
        }
    }
}

#[derive(Debug)]
pub enum CompletionResponse {
    NoMatches,
    Applied { replacement: Replacement },
    Suggestions { options: Vec<&'static str> },
}

pub struct Session {
    executor: CommandExecutor<GensetSequencer>,
    transcript: TranscriptLogger,
    completion: CompletionEngine,
    next_event: EventId,
}

impl Session {
    pub fn new(profile: TranscriptProfile, seed: u64) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile, seed)?;
        let entropy = RngEntropy::new(ChaCha8Rng::seed_from_u64(seed));
        let sequencer = Sequencer::new(Configuration::default(), entropy)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        Ok(Self {
            executor: CommandExecutor::new(sequencer, SimInstant::ZERO),
            transcript,
            completion: CompletionEngine::new(),
            next_event: 0,
        })
    }

    fn elapsed(&self) -> Duration {
        self.executor.now().since_start()
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<ResponseLine>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript
            .append_line(self.elapsed(), TranscriptRole::Host, trimmed)?;

        let mut lines: Vec<ResponseLine> = match self.executor.execute(trimmed) {
            Ok(outcome) => self.render_outcome(outcome),
            Err(err) => vec![ResponseLine::plain(describe_error(&err))],
        };
        lines.extend(self.drain_events());

        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn handle_completion(
        &mut self,
        buffer: &str,
        cursor: usize,
    ) -> io::Result<CompletionResponse> {
        let cursor = cursor.min(buffer.len());
        let (prefix, suffix) = buffer.split_at(cursor);
        let elapsed = self.elapsed();
        self.transcript
            .log_completion_request(elapsed, prefix, suffix, cursor)?;

        let result = self.completion.complete(buffer, cursor);
        if result.options.is_empty() {
            self.transcript.log_completion_none(elapsed)?;
            return Ok(CompletionResponse::NoMatches);
        }

        let options: Vec<&'static str> = result.options.iter().copied().collect();
        if let Some(replacement) = result.replacement {
            self.transcript
                .log_completion_applied(elapsed, &replacement)?;
            return Ok(CompletionResponse::Applied { replacement });
        }

        self.transcript.log_completion_options(elapsed, &options)?;
        Ok(CompletionResponse::Suggestions { options })
    }

    fn render_outcome(&mut self, outcome: CommandOutcome<'_, SimInstant>) -> Vec<ResponseLine> {
        let text = match outcome {
            CommandOutcome::Start(start @ StartOutcome::Preheating { .. }) => {
                return vec![
                    ResponseLine::plain(describe_start(start)),
                    ResponseLine::plain(self.describe_start_plan()),
                ];
            }
            CommandOutcome::Start(start) => describe_start(start),
            CommandOutcome::Stop(stop) => describe_stop(stop),
            CommandOutcome::Auto { enabled } => format!("OK auto {}", on_off(enabled)),
            CommandOutcome::Fault(injection) => describe_fault(injection),
            CommandOutcome::Sensor(SimCommand::Temperature(value)) => {
                format!("OK sim temp={value:.1}C")
            }
            CommandOutcome::Sensor(SimCommand::Battery(_)) => format!(
                "OK sim battery={:.2}V",
                self.executor.target().battery_voltage()
            ),
            CommandOutcome::ConfigApplied(setting) => format!("OK config {setting}"),
            CommandOutcome::ConfigShow(config) => describe_config(&config),
            CommandOutcome::ConfigExport { path, json } => export_config(path, &json),
            CommandOutcome::ConfigImport { path } => self.import_config(path),
            CommandOutcome::Advanced(summary) => self.describe_advance(&summary),
            CommandOutcome::Status(Some(snapshot)) => {
                let mut rendered = String::new();
                if StatusFormatter::new(&snapshot)
                    .write_all(&mut rendered)
                    .is_err()
                {
                    return vec![ResponseLine::plain("ERR status render".to_string())];
                }
                return rendered
                    .lines()
                    .map(|line| ResponseLine::plain(line.to_string()))
                    .collect();
            }
            CommandOutcome::Status(None) => "ERR status unavailable".to_string(),
            CommandOutcome::Log { limit } => return self.render_log(limit),
            CommandOutcome::Help(lines) => {
                return lines.into_iter().map(ResponseLine::plain).collect();
            }
        };
        vec![ResponseLine::plain(text)]
    }

    fn import_config(&mut self, path: &str) -> String {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path, %err, "configuration import failed");
                return format!("ERR io {path}: {err}");
            }
        };
        match self.executor.import_configuration(&text) {
            Ok(config) => {
                debug!(path, ?config, "configuration imported");
                format!("OK config imported from {path}")
            }
            Err(err) => format!("ERR config {err}"),
        }
    }

    fn describe_start_plan(&self) -> String {
        let config = self.executor.target().config();
        let phases: Vec<String> = START_TEMPLATE
            .steps()
            .iter()
            .map(|step| {
                format!(
                    "{}={}",
                    step.phase.label(),
                    format_seconds(config.scale(step.hold_for))
                )
            })
            .collect();
        let retry = START_TEMPLATE
            .retry_delay
            .map_or_else(|| "none".to_string(), |delay| format_seconds(config.scale(delay)));
        format!(
            "plan {} total={} attempts={} retry={retry}",
            phases.join(" "),
            format_seconds(config.scale(START_TEMPLATE.total_hold())),
            START_TEMPLATE.max_attempts
        )
    }

    fn describe_advance(&self, summary: &AdvanceSummary<SimInstant>) -> String {
        format!(
            "OK t=+{}ms ticks={} mode={}",
            summary.now.since_start().as_millis(),
            summary.ticks,
            self.executor.target().mode()
        )
    }

    fn render_log(&self, limit: Option<u32>) -> Vec<ResponseLine> {
        let limit = usize::try_from(limit.unwrap_or(DEFAULT_LOG_LIMIT)).unwrap_or(usize::MAX);
        let events = self.executor.target().events();
        if events.is_empty() {
            return vec![ResponseLine::plain("log empty".to_string())];
        }
        events
            .newest_first()
            .take(limit)
            .map(ResponseLine::event)
            .collect()
    }

    fn drain_events(&mut self) -> Vec<ResponseLine> {
        let events = self.executor.target().events();
        let lines = events
            .since(self.next_event)
            .map(ResponseLine::event)
            .collect();
        self.next_event = events.next_event_id();
        lines
    }

    fn record_output(&mut self, lines: &[ResponseLine]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, &line.text)?;
        }
        Ok(())
    }
}

fn describe_error(error: &CommandError<'_>) -> String {
    match error {
        CommandError::Parse(err) => format!("ERR syntax {err}"),
        CommandError::Config(err) => format!("ERR config {err}"),
        CommandError::UnknownTopic(topic) => format!("ERR help no topic `{topic}`"),
    }
}

fn describe_start(outcome: StartOutcome) -> String {
    match outcome {
        StartOutcome::Preheating { attempt } => format!("OK start preheating attempt={attempt}"),
        StartOutcome::BatteryLow { voltage } => format!("ERR start battery-low {voltage:.2}V"),
        StartOutcome::Ignored { mode } => format!("ERR start ignored mode={mode}"),
    }
}

fn describe_stop(outcome: StopOutcome) -> String {
    match outcome {
        StopOutcome::CoolingDown => "OK stop cooldown".to_string(),
        StopOutcome::Aborted { mode } => format!("OK stop aborted mode={mode}"),
        StopOutcome::Blocked { remaining_seconds } => {
            format!("ERR stop blocked remaining={remaining_seconds}s")
        }
        StopOutcome::NotRunning { mode } => format!("ERR stop ignored mode={mode}"),
    }
}

fn describe_fault(injection: FaultInjection) -> String {
    match injection {
        FaultInjection::AlternatorFailure(on) => format!("OK fault alternator={}", on_off(on)),
        FaultInjection::StartRelayStuck(on) => format!("OK fault relay={}", on_off(on)),
        FaultInjection::SensorBias(bias) => format!("OK fault bias={bias:+.1}C"),
        FaultInjection::ClearAll => "OK fault cleared".to_string(),
    }
}

fn describe_config(config: &Configuration) -> String {
    format!(
        "config TEMP_START={:.1} DT={:.1} MIN_RUNTIME_S={} START_DEBOUNCE={} STOP_DEBOUNCE={} noise={} fast={}",
        config.start_temperature,
        config.hysteresis_delta,
        config.min_runtime_seconds,
        config.start_debounce,
        config.stop_debounce,
        on_off(config.noise_enabled),
        on_off(config.fast_mode)
    )
}

fn export_config(path: &str, json: &str) -> String {
    match fs::write(path, json) {
        Ok(()) => format!("OK config exported to {path}"),
        Err(err) => {
            warn!(path, %err, "configuration export failed");
            format!("ERR io {path}: {err}")
        }
    }
}

fn format_seconds(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

struct TranscriptLogger {
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile, seed: u64) -> io::Result<Self> {
        let path = Path::new(profile.log_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile, seed)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile, seed: u64) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header)?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since session start (seed {seed})"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }

    fn log_completion_request(
        &mut self,
        elapsed: Duration,
        prefix: &str,
        suffix: &str,
        cursor: usize,
    ) -> io::Result<()> {
        let message = format!("[TAB] prefix={prefix:?} suffix={suffix:?} cursor={cursor}");
        self.append_line(elapsed, TranscriptRole::Host, &message)
    }

    fn log_completion_none(&mut self, elapsed: Duration) -> io::Result<()> {
        self.append_line(elapsed, TranscriptRole::Emulator, "completion: no matches")
    }

    fn log_completion_applied(
        &mut self,
        elapsed: Duration,
        replacement: &Replacement,
    ) -> io::Result<()> {
        let message = format!(
            "completion applied: {} (range={}..{})",
            replacement.value, replacement.start, replacement.end
        );
        self.append_line(elapsed, TranscriptRole::Emulator, &message)
    }

    fn log_completion_options(
        &mut self,
        elapsed: Duration,
        options: &[&'static str],
    ) -> io::Result<()> {
        let summary = format!("completion options ({})", options.len());
        self.append_line(elapsed, TranscriptRole::Emulator, &summary)?;
        for option in options {
            let line = format!("  {option}");
            self.append_line(elapsed, TranscriptRole::Emulator, &line)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
