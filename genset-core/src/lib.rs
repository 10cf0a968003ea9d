// Supervisory control logic for a diesel-generator start/stop sequencer.
//
// The crate owns the configuration, the simplified physical model, the
// sequencing state machine and its event log. Front-ends drive it through the
// console dispatcher in `repl` or by calling the sequencer directly.

pub mod clock;
pub mod config;
pub mod events;
pub mod plant;
pub mod repl;
pub mod sequencer;
pub mod sequences;
