//! Stop sequence: drop fuel and ignition, then settle before returning to idle.

use core::time::Duration;

use super::{SequenceKind, SequenceTemplate};

/// Settling time after the engine stops.
pub const STOP_COOLDOWN: Duration = Duration::from_millis(800);

pub const STOP_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::Stop, &[], STOP_COOLDOWN, 1, None);
