//! Operator-facing event log.
//!
//! Every alarm and status message the sequencer emits lands here as a typed
//! [`EventKind`] with a [`Severity`]. The log is a fixed-size ring: once full,
//! the oldest record is evicted. Presentation layers read it newest first.

use core::fmt;
use core::time::Duration;

use heapless::HistoryBuf;

use crate::sequencer::{EngineMode, StopOrigin};

/// Total number of events retained in memory.
pub const EVENT_LOG_CAPACITY: usize = 128;

/// Sequential identifier assigned to each recorded event.
pub type EventId = u32;

/// Severity attached to every event.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Info,
    Ok,
    Warn,
    Error,
}

impl Severity {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Ok => "ok",
            Severity::Warn => "warn",
            Severity::Error => "err",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operator request that the sequencer can decline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestKind {
    Start,
    Stop,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Start => "start",
            RequestKind::Stop => "stop",
        })
    }
}

/// Events emitted by the sequencer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EventKind {
    /// A001: start refused because the battery is below the start threshold.
    BatteryLow { voltage: f64 },
    PreheatStarted { attempt: u8 },
    StarterEngaged { voltage: f64 },
    EngineRunning { alternator_on: bool },
    CrankFailed { attempt: u8 },
    RetryScheduled {
        next_attempt: u8,
        max_attempts: u8,
        delay: Duration,
    },
    /// A002: attempt budget exhausted.
    StartFailure { attempts: u8 },
    StopBlocked { remaining_seconds: u32 },
    EngineStopped { origin: StopOrigin },
    StartAborted { mode: EngineMode },
    RequestIgnored { request: RequestKind, mode: EngineMode },
}

impl EventKind {
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            EventKind::PreheatStarted { .. } | EventKind::StarterEngaged { .. } => Severity::Info,
            EventKind::EngineRunning { .. } | EventKind::EngineStopped { .. } => Severity::Ok,
            EventKind::CrankFailed { .. }
            | EventKind::RetryScheduled { .. }
            | EventKind::StopBlocked { .. }
            | EventKind::StartAborted { .. }
            | EventKind::RequestIgnored { .. } => Severity::Warn,
            EventKind::BatteryLow { .. } | EventKind::StartFailure { .. } => Severity::Error,
        }
    }

    /// Alarm code for events that raise an alarm.
    #[must_use]
    pub const fn alarm_code(&self) -> Option<&'static str> {
        match self {
            EventKind::BatteryLow { .. } => Some("A001"),
            EventKind::StartFailure { .. } => Some("A002"),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.alarm_code() {
            write!(f, "{code} ")?;
        }
        match self {
            EventKind::BatteryLow { voltage } => {
                write!(f, "battery low ({voltage:.2} V), start cancelled")
            }
            EventKind::PreheatStarted { attempt } => {
                write!(f, "preheating glow plugs (attempt {attempt})")
            }
            EventKind::StarterEngaged { voltage } => {
                write!(f, "starter motor engaged, battery {voltage:.2} V")
            }
            EventKind::EngineRunning { alternator_on } => write!(
                f,
                "engine running, alternator {}",
                if *alternator_on { "ON" } else { "KO" }
            ),
            EventKind::CrankFailed { attempt } => write!(f, "start attempt {attempt} failed"),
            EventKind::RetryScheduled {
                next_attempt,
                max_attempts,
                delay,
            } => write!(
                f,
                "retry {next_attempt}/{max_attempts} in {}s",
                delay.as_secs_f64()
            ),
            EventKind::StartFailure { attempts } => {
                write!(f, "start failure after {attempts} attempts")
            }
            EventKind::StopBlocked { remaining_seconds } => {
                write!(f, "stop blocked, {remaining_seconds}s of minimum runtime remaining")
            }
            EventKind::EngineStopped { origin } => write!(f, "engine stopped ({origin})"),
            EventKind::StartAborted { mode } => write!(f, "start aborted during {mode}"),
            EventKind::RequestIgnored { request, mode } => {
                write!(f, "{request} request ignored in {mode}")
            }
        }
    }
}

/// Event record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EventRecord<I> {
    pub id: EventId,
    pub timestamp: I,
    pub kind: EventKind,
    pub severity: Severity,
}

/// Records events into a fixed-size ring buffer.
pub struct EventLog<I, const CAPACITY: usize = EVENT_LOG_CAPACITY> {
    ring: HistoryBuf<EventRecord<I>, CAPACITY>,
    next_event_id: EventId,
}

impl<I: Copy, const CAPACITY: usize> EventLog<I, CAPACITY> {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event and returns its identifier.
    pub fn record(&mut self, kind: EventKind, timestamp: I) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(EventRecord {
            id,
            timestamp,
            kind,
            severity: kind.severity(),
        });

        id
    }

    /// Returns the stored records, most recent first.
    pub fn newest_first(&self) -> impl Iterator<Item = &EventRecord<I>> {
        let records: Vec<&EventRecord<I>> = self.ring.oldest_ordered().collect();
        records.into_iter().rev()
    }

    /// Returns the stored records in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &EventRecord<I>> {
        self.ring.oldest_ordered()
    }

    /// Records with an identifier at or after `first`, in chronological order.
    pub fn since(&self, first: EventId) -> impl Iterator<Item = &EventRecord<I>> {
        self.ring
            .oldest_ordered()
            .filter(move |record| record.id >= first)
    }

    /// Returns the most recent record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&EventRecord<I>> {
        self.ring.recent()
    }

    /// Identifier the next recorded event will receive.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<I: Copy, const CAPACITY: usize> Default for EventLog<I, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_numbered_and_classified() {
        let mut log = EventLog::<u64>::new();
        let first = log.record(EventKind::PreheatStarted { attempt: 1 }, 10);
        let second = log.record(EventKind::BatteryLow { voltage: 11.2 }, 20);
        assert_eq!((first, second), (0, 1));

        let latest = log.latest().copied().expect("latest record");
        assert_eq!(latest.severity, Severity::Error);
        assert_eq!(latest.timestamp, 20);
        assert_eq!(latest.kind.alarm_code(), Some("A001"));
    }

    #[test]
    fn newest_first_reverses_chronology() {
        let mut log = EventLog::<u64>::new();
        log.record(EventKind::PreheatStarted { attempt: 1 }, 1);
        log.record(EventKind::StarterEngaged { voltage: 12.1 }, 2);
        log.record(EventKind::EngineRunning { alternator_on: true }, 3);

        let stamps: Vec<u64> = log.newest_first().map(|record| record.timestamp).collect();
        assert_eq!(stamps, [3, 2, 1]);
    }

    #[test]
    fn ring_evicts_oldest_when_full() {
        let mut log = EventLog::<u64, 4>::new();
        for stamp in 0..6 {
            log.record(EventKind::CrankFailed { attempt: 1 }, stamp);
        }
        assert_eq!(log.len(), 4);
        let ids: Vec<EventId> = log.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids, [2, 3, 4, 5]);
        assert_eq!(log.since(4).count(), 2);
        assert_eq!(log.next_event_id(), 6);
    }

    #[test]
    fn messages_carry_alarm_codes_and_details() {
        let failure = EventKind::StartFailure { attempts: 3 };
        assert_eq!(failure.to_string(), "A002 start failure after 3 attempts");

        let retry = EventKind::RetryScheduled {
            next_attempt: 2,
            max_attempts: 3,
            delay: Duration::from_secs(5),
        };
        assert_eq!(retry.to_string(), "retry 2/3 in 5s");
        assert_eq!(retry.severity(), Severity::Warn);

        let blocked = EventKind::StopBlocked {
            remaining_seconds: 12,
        };
        assert_eq!(
            blocked.to_string(),
            "stop blocked, 12s of minimum runtime remaining"
        );

        let running = EventKind::EngineRunning {
            alternator_on: false,
        };
        assert_eq!(running.to_string(), "engine running, alternator KO");
        assert_eq!(running.severity(), Severity::Ok);
    }
}
