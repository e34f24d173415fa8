//! # Introduction
//!
//! tracescope asks a language model to act as a compiler/VM for a piece of
//! source code, turns whatever comes back into a well-formed execution trace,
//! and lets you step through that trace forward and backward in a terminal UI
//! built with [ratatui](https://docs.rs/ratatui).
//!
//! ## Pipeline
//!
//! ```text
//! Request → Generator → raw text → Normalizer → Trace → Player → Snapshot → Scene → TUI
//!                                      ↘ Validator (diagnostics)
//! ```
//!
//! 1. [`analyzer`] - checks the request, sequences it per session and drives
//!    the rest of the pipeline.
//! 2. [`generator`] - produces raw trace text, from OpenAI or a fixed mock.
//! 3. [`trace`] - the trace schema, the structural [`trace::validate`] pass and
//!    the total [`trace::normalize`] pass.
//! 4. [`session`] - per-session summaries, last trace and request sequencing.
//! 5. [`player`] - the step-through state machine over a loaded trace.
//! 6. [`snapshot`] - the fold that rebuilds cumulative state from step deltas.
//! 7. [`scene`] - pure projection of a snapshot into display groups.
//! 8. [`ui`] - ratatui-based TUI; not part of the stable library API.
//!
//! Producer output is never trusted: anything that is not JSON becomes the
//! sentinel trace, and everything else is repaired rather than rejected.

pub mod analyzer;
pub mod config;
pub mod generator;
pub mod player;
pub mod scene;
pub mod session;
pub mod snapshot;
pub mod trace;
pub mod ui;
