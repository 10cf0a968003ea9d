//! Start sequence: preheat the glow plugs, then engage the starter.
//!
//! A failed crank is retried after a fixed delay until the attempt budget is
//! spent. Each new attempt re-checks the battery before preheating.

use core::time::Duration;

use super::{PhaseKind, PhaseStep, RelayId, SequenceKind, SequenceTemplate};

/// Glow-plug warm-up before cranking.
pub const PREHEAT_HOLD: Duration = Duration::from_secs(8);
/// Starter engagement window.
pub const CRANK_HOLD: Duration = Duration::from_secs(3);
/// Delay between a failed crank and the next attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Start attempts allowed before latching a fault.
pub const MAX_START_ATTEMPTS: u8 = 3;

/// Battery voltage required to begin a start attempt.
pub const MIN_START_VOLTAGE: f64 = 11.8;
/// Battery voltage that must remain after crank sag for ignition to succeed.
pub const MIN_CRANK_VOLTAGE: f64 = 11.6;
/// Allowed excess of sensed temperature over the start threshold at crank end.
pub const CRANK_TEMPERATURE_MARGIN: f64 = 1.0;
/// Engine speed once running.
pub const NOMINAL_RPM: u32 = 3_000;

/// Relays held while the engine runs.
pub const RUN_RELAYS: [RelayId; 2] = [RelayId::Ignition, RelayId::Fan];

/// Ordered phases of the start sequence.
pub const START_STEPS: [PhaseStep; 2] = [
    PhaseStep::new(
        PhaseKind::Preheat,
        PREHEAT_HOLD,
        &[RelayId::Ignition, RelayId::Glow],
    ),
    PhaseStep::new(
        PhaseKind::Crank,
        CRANK_HOLD,
        &[RelayId::Ignition, RelayId::Starter],
    ),
];

pub const START_TEMPLATE: SequenceTemplate = SequenceTemplate::new(
    SequenceKind::Start,
    &START_STEPS,
    Duration::ZERO,
    MAX_START_ATTEMPTS,
    Some(RETRY_DELAY),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_template_matches_field_timings() {
        assert_eq!(START_TEMPLATE.kind, SequenceKind::Start);
        assert_eq!(START_TEMPLATE.step_count(), 2);

        let preheat = &START_STEPS[0];
        assert_eq!(preheat.phase, PhaseKind::Preheat);
        assert_eq!(preheat.hold_for, Duration::from_secs(8));
        assert!(preheat.energizes(RelayId::Glow));

        let crank = &START_STEPS[1];
        assert_eq!(crank.phase, PhaseKind::Crank);
        assert_eq!(crank.hold_for, Duration::from_secs(3));
        assert!(crank.energizes(RelayId::Starter));

        assert_eq!(START_TEMPLATE.max_attempts, 3);
        assert_eq!(START_TEMPLATE.retry_delay, Some(Duration::from_secs(5)));
    }
}
