//! Start and stop sequence timing shared by the sequencer and console front-ends.
//!
//! A [`SequenceTemplate`] describes the ordered phases of a sequence, the relay
//! outputs each phase energizes, how long each phase holds, and the cooldown
//! and retry budget that follow. The sequencer reads hold durations from the
//! templates; the console renders them for operators.

use core::time::Duration;

pub mod start;
pub mod stop;

pub use start::START_TEMPLATE;
pub use stop::STOP_TEMPLATE;

/// Identifier for the relay outputs driven by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RelayId {
    Ignition,
    Glow,
    Starter,
    Fan,
}

impl RelayId {
    /// Deterministic index for lookups into [`ALL_RELAYS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            RelayId::Ignition => 0,
            RelayId::Glow => 1,
            RelayId::Starter => 2,
            RelayId::Fan => 3,
        }
    }
}

/// Wiring metadata for a relay output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RelayLine {
    pub id: RelayId,
    pub name: &'static str,
    pub output: &'static str,
    pub terminal: &'static str,
}

impl RelayLine {
    #[must_use]
    pub const fn new(
        id: RelayId,
        name: &'static str,
        output: &'static str,
        terminal: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            output,
            terminal,
        }
    }
}

/// Compile-time catalog of every relay output.
pub const ALL_RELAYS: [RelayLine; 4] = [
    RelayLine::new(RelayId::Ignition, "IGN", "Q1", "15"),
    RelayLine::new(RelayId::Glow, "GLOW", "Q2", "87"),
    RelayLine::new(RelayId::Starter, "START", "Q3", "50"),
    RelayLine::new(RelayId::Fan, "FAN", "Q4", "A1/A2"),
];

/// Retrieve relay metadata by identifier.
#[must_use]
pub const fn relay_by_id(id: RelayId) -> RelayLine {
    ALL_RELAYS[id.as_index()]
}

/// Timed phase of a sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseKind {
    Preheat,
    Crank,
}

impl PhaseKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PhaseKind::Preheat => "preheat",
            PhaseKind::Crank => "crank",
        }
    }
}

/// One phase of a sequence and the relays it energizes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhaseStep {
    pub phase: PhaseKind,
    pub hold_for: Duration,
    pub energized: &'static [RelayId],
}

impl PhaseStep {
    #[must_use]
    pub const fn new(phase: PhaseKind, hold_for: Duration, energized: &'static [RelayId]) -> Self {
        Self {
            phase,
            hold_for,
            energized,
        }
    }

    #[must_use]
    pub fn energizes(&self, relay: RelayId) -> bool {
        self.energized.contains(&relay)
    }
}

/// The type of sequence described by a template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceKind {
    Start,
    Stop,
}

/// Immutable sequence template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceTemplate {
    pub kind: SequenceKind,
    pub phases: &'static [PhaseStep],
    pub cooldown: Duration,
    pub max_attempts: u8,
    pub retry_delay: Option<Duration>,
}

impl SequenceTemplate {
    #[must_use]
    pub const fn new(
        kind: SequenceKind,
        phases: &'static [PhaseStep],
        cooldown: Duration,
        max_attempts: u8,
        retry_delay: Option<Duration>,
    ) -> Self {
        Self {
            kind,
            phases,
            cooldown,
            max_attempts,
            retry_delay,
        }
    }

    /// Returns the ordered phases that make up the sequence.
    #[must_use]
    pub const fn steps(&self) -> &'static [PhaseStep] {
        self.phases
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.phases.len()
    }

    /// Looks up the step for `phase`, if the sequence contains one.
    #[must_use]
    pub fn phase(&self, phase: PhaseKind) -> Option<&'static PhaseStep> {
        self.phases.iter().find(|step| step.phase == phase)
    }

    /// Hold duration for `phase`, or zero when the sequence has no such phase.
    #[must_use]
    pub fn hold_for(&self, phase: PhaseKind) -> Duration {
        self.phase(phase).map_or(Duration::ZERO, |step| step.hold_for)
    }

    /// Sum of every phase hold.
    #[must_use]
    pub fn total_hold(&self) -> Duration {
        self.phases
            .iter()
            .fold(Duration::ZERO, |total, step| total + step.hold_for)
    }
}
