//! handlight: hand-pose gesture control for smart lights.
//!
//! Tracker frames flow through joint angles, finger states and hand-state
//! classification, get debounced, and drive a gesture state machine that
//! selects, toggles, dims, recolors and places lights. A depth sampler
//! finds the nearest surface under the tracked wrist.

pub mod control;
pub mod depth;
pub mod error;
pub mod geometry;
pub mod hand;
pub mod ipc;
pub mod runtime;
pub mod state;
