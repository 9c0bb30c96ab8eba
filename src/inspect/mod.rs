//! Variable inspection engine
//!
//! Turns [`RawValue`](crate::remote::value::RawValue) snapshots into
//! navigable display trees and grows them on demand:
//!
//! - [`formatter`]: which text a value is shown as
//! - [`expression`]: labels and re-evaluable expressions for children
//! - [`wrap`]: snapshot to [`tree::DisplayNode`] conversion
//! - [`tree`]: the per-panel node arena and the auto-load heuristic
//! - [`loader`]: single-flight background loads merged into the trees
//! - [`panels`]: locals, globals and watch expressions
//! - [`pretty`] and [`time`]: text renderings

pub mod expression;
pub mod formatter;
pub mod loader;
pub mod panels;
pub mod pretty;
pub mod time;
pub mod tree;
pub mod wrap;

pub use formatter::{CustomFormatter, FormatterRegistry, ValueOverride};
pub use loader::{LoadCoordinator, LoadEvent, LoadRequest, NodeRef};
pub use panels::{PanelId, WatchExpr, Workspace};
pub use tree::{DisplayNode, DisplayTree, NodeId};
pub use wrap::Wrapper;
