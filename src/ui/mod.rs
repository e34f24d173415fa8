//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! The UI is organized into three layers:
//!
//! - **[`app`]** - application state, keyboard event loop, pane focus, background analysis
//! - **[`panes`]** - stateless render functions for each visible pane (source, variables,
//!   stack, heap, terminal, status bar)
//! - **[`theme`]** - centralized color palette used by all panes
//!
//! The UI only ever sees [`Scene`]s: each frame projects the player's current
//! snapshot and paints the groups.
//!
//! [`Scene`]: crate::scene::Scene

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
