//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! - **[`app`]**: application state, keyboard event loop, pane focus, and the
//!   per-frame drain of background load events
//! - **[`panes`]**: render functions for each visible pane
//! - **[`theme`]**: centralized color palette used by all panes
//!
//! Construct an [`App`] with a [`LoadCoordinator`] and call [`App::run`].
//!
//! [`LoadCoordinator`]: crate::inspect::LoadCoordinator
//! [`App::run`]: app::App::run

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
