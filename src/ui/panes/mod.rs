//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`source`]: Source code display with syntax highlighting and current line indicator
//! - [`group`]: One scene group (variables, call stack, heap) as a label/value list
//! - [`terminal`]: Program output and errors
//! - [`status`]: Status bar with keybindings and playback state
//!
//! Each pane module exports a `render_*` function and, where the pane scrolls,
//! its scroll state type.

pub mod group;
pub mod source;
pub mod status;
pub mod terminal;

pub use group::{render_group_pane, GroupScrollState};
pub use source::{render_source_pane, resolve_current_line, SourceScrollState};
pub use status::{render_status_bar, StatusRenderData};
pub use terminal::render_terminal_pane;
