//! WASM bindings for the Phaseflow core. The browser tools construct a
//! [`PhasePortrait`] or [`ParamSimulation`] from formula text and drive it
//! frame by frame; all rendering stays on the JavaScript side.

mod portrait;
mod simulation;

pub use portrait::PhasePortrait;
pub use simulation::ParamSimulation;
