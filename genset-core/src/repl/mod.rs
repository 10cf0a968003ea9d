//! Operator console shared by the emulator and the capture tooling.
//!
//! The grammar lives in [`grammar`] and is implemented with a token/parse
//! pipeline over the [`catalog`] tree; [`commands`] dispatches parsed lines
//! into a sequencer on a simulated clock.

pub mod catalog;
pub mod commands;
pub mod completion;
pub mod grammar;
pub mod status;
