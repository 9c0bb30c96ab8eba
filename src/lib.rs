//! # Introduction
//!
//! varscope turns the raw variable snapshots a debugger reports at a stop
//! into navigable display trees, and fills in whatever the first evaluation
//! left out (array and map tails, structs reported by address only) with
//! background loads that never block the front-end.
//!
//! ## Data flow
//!
//! ```text
//! DebuggerService → RawValue → Wrapper → DisplayTree → TUI
//!                      ↑                      │
//!                      └──── LoadCoordinator ─┘
//! ```
//!
//! 1. [`remote`]: the debugger-facing types, the [`remote::DebuggerService`]
//!    trait, and a replay service answering from a recorded session.
//! 2. [`inspect`]: formatting, child expression synthesis, display trees,
//!    panels and the single-flight load coordinator.
//! 3. [`scrollback`]: the shared output log written by traced watches and
//!    failed loads.
//! 4. [`config`]: persisted load limits and custom formatters.
//! 5. [`ui`]: ratatui-based TUI; not part of the stable library API.

pub mod config;
pub mod errors;
pub mod inspect;
pub mod remote;
pub mod scrollback;
pub mod ui;
