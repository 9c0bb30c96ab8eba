//! TUI pane rendering modules
//!
//! - [`variables`]: watches, locals and globals as expandable trees
//! - [`output`]: scrollback lines written by traced watches and failed loads
//! - [`status`]: status bar with keybindings and load state
//!
//! Each pane module exports a primary `render_*()` function plus the state
//! types it needs between frames.

pub mod output;
pub mod status;
pub mod variables;

pub use output::render_output_pane;
pub use status::{render_status_bar, StatusRenderData};
pub use variables::{
    collect_rows, render_variables_pane, OpenSet, Row, VariablesRenderData, VariablesScrollState,
};
