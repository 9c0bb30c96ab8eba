//! Background loading of truncated values
//!
//! The [`LoadCoordinator`] fills in what the first evaluation left out:
//! array, slice and map tails, and structs or pointer targets that were
//! reported address-only. Each request performs exactly one remote
//! evaluation on a background thread and merges the result into the
//! [`Workspace`] under its lock.
//!
//! At most one load runs at a time across every panel. A request made while
//! another is in flight is dropped, not queued; the front-end re-issues it on
//! a later frame. Requests carry the generation of the tree they target, so a
//! result that arrives after its tree was replaced is discarded.
//!
//! Locks are never nested: the workspace lock and the in-flight flag are
//! always taken one after the other.

use crate::errors::EvalError;
use crate::inspect::panels::{evaluate_watch, PanelId, Workspace};
use crate::inspect::pretty::quote_str;
use crate::inspect::tree::NodeId;
use crate::inspect::wrap::Wrapper;
use crate::remote::value::{Kind, RawValue};
use crate::remote::{DebuggerService, EvalScope, LoadPolicy};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A node in a specific generation of a panel tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub panel: PanelId,
    pub generation: u64,
    pub node: NodeId,
}

/// Completion notice sent once a background load has been applied. The
/// front-end redraws on receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    Merged(NodeRef),
    /// The evaluation failed; the node was clamped or marked unreadable
    Failed(NodeRef, EvalError),
    /// The target tree was replaced while the load was running
    Stale(NodeRef),
    WatchReloaded(u64),
}

/// What became of a load request
#[derive(Debug)]
pub enum LoadRequest {
    /// A background load was started
    Issued(JoinHandle<()>),
    /// Another load is running; the request was dropped
    InFlight,
    /// The node is fully loaded, already loading, or gone
    NothingToLoad,
}

impl LoadRequest {
    pub fn is_issued(&self) -> bool {
        matches!(self, LoadRequest::Issued(_))
    }

    /// Block until an issued load has been merged
    pub fn wait(self) {
        if let LoadRequest::Issued(handle) = self {
            if handle.join().is_err() {
                warn!("background load panicked");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    ArrayOrSlice,
    Map,
    Struct,
}

#[derive(Debug, Clone)]
struct Plan {
    kind: LoadKind,
    expr: String,
    policy: LoadPolicy,
    scope: EvalScope,
    /// Elements (pairs, for maps) present when the load was planned
    loaded: usize,
}

/// Issues and merges background loads for a shared [`Workspace`]
#[derive(Clone)]
pub struct LoadCoordinator {
    service: Arc<dyn DebuggerService>,
    workspace: Arc<Mutex<Workspace>>,
    in_flight: Arc<Mutex<bool>>,
    events: Sender<LoadEvent>,
}

impl LoadCoordinator {
    /// The receiver gets one [`LoadEvent`] per finished load
    pub fn new(
        service: Arc<dyn DebuggerService>,
        workspace: Arc<Mutex<Workspace>>,
    ) -> (Self, Receiver<LoadEvent>) {
        let (events, rx) = mpsc::channel();
        let coordinator = LoadCoordinator {
            service,
            workspace,
            in_flight: Arc::new(Mutex::new(false)),
            events,
        };
        (coordinator, rx)
    }

    pub fn workspace(&self) -> &Arc<Mutex<Workspace>> {
        &self.workspace
    }

    pub fn service(&self) -> &Arc<dyn DebuggerService> {
        &self.service
    }

    /// A background load is outstanding
    pub fn is_loading(&self) -> bool {
        *lock(&self.in_flight)
    }

    /// Fetch the next elements of a truncated array or slice
    pub fn load_more_array_or_slice(&self, target: NodeRef) -> LoadRequest {
        self.issue(target, LoadKind::ArrayOrSlice)
    }

    /// Fetch the next entries of a truncated map
    pub fn load_more_map(&self, target: NodeRef) -> LoadRequest {
        self.issue(target, LoadKind::Map)
    }

    /// Re-evaluate a value at its address and replace the node in place
    pub fn load_more_struct(&self, target: NodeRef) -> LoadRequest {
        self.issue(target, LoadKind::Struct)
    }

    /// The load that fits the node's kind
    pub fn load_more(&self, target: NodeRef) -> LoadRequest {
        let kind = {
            let ws = lock(&self.workspace);
            ws.tree(target.panel)
                .and_then(|t| t.get(target.node))
                .map(|n| n.kind())
        };
        match kind {
            Some(Kind::Array | Kind::Slice) => self.load_more_array_or_slice(target),
            Some(Kind::Map) => self.load_more_map(target),
            Some(_) => self.load_more_struct(target),
            None => LoadRequest::NothingToLoad,
        }
    }

    /// Refresh the first open node of `panel` that needs it, if any
    pub fn autoload<F>(&self, panel: PanelId, is_open: F) -> LoadRequest
    where
        F: FnMut(NodeId) -> bool,
    {
        let target = {
            let ws = lock(&self.workspace);
            let Some(tree) = ws.tree(panel) else {
                return LoadRequest::NothingToLoad;
            };
            match tree.autoload_target(is_open) {
                Some(node) => NodeRef {
                    panel,
                    generation: tree.generation(),
                    node,
                },
                None => return LoadRequest::NothingToLoad,
            }
        };
        debug!(?target, "autoload");
        self.load_more_struct(target)
    }

    /// Re-evaluate one watch expression in the background. This does not
    /// take the single-flight slot.
    pub fn reload_watch(&self, id: u64) -> Option<JoinHandle<()>> {
        let (spec, scope, policy) = {
            let ws = lock(&self.workspace);
            let spec = ws.watch(id)?.spec.clone();
            let policy = ws.watch_policy(&spec);
            (spec, ws.scope(), policy)
        };
        let this = self.clone();
        Some(thread::spawn(move || {
            let value = evaluate_watch(this.service.as_ref(), scope, &spec, policy);
            lock(&this.workspace).set_watch_value(id, &spec.expr, value, false);
            let _ = this.events.send(LoadEvent::WatchReloaded(id));
        }))
    }

    fn issue(&self, target: NodeRef, kind: LoadKind) -> LoadRequest {
        let plan = {
            let ws = lock(&self.workspace);
            match plan(&ws, target, kind) {
                Some(plan) => plan,
                None => return LoadRequest::NothingToLoad,
            }
        };

        {
            let mut busy = lock(&self.in_flight);
            if *busy {
                debug!(expr = %plan.expr, "load dropped, another load is in flight");
                return LoadRequest::InFlight;
            }
            *busy = true;
        }

        if let Some(n) = lock(&self.workspace)
            .tree_mut(target.panel)
            .filter(|t| t.generation() == target.generation)
            .and_then(|t| t.get_mut(target.node))
        {
            n.loading = true;
        }

        debug!(expr = %plan.expr, ?target, "load issued");
        let this = self.clone();
        let handle = thread::spawn(move || {
            let slot = InFlightSlot {
                coordinator: &this,
                target,
            };
            let result = this.service.evaluate(plan.scope, &plan.expr, plan.policy);
            let event = merge(&mut lock(&this.workspace), target, &plan, result);
            drop(slot);
            let _ = this.events.send(event);
        });
        LoadRequest::Issued(handle)
    }
}

/// Frees the single-flight slot when a background load ends, including by
/// panic. A load that panicked also leaves its node no longer loading.
struct InFlightSlot<'a> {
    coordinator: &'a LoadCoordinator,
    target: NodeRef,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(node = ?self.target, "background load panicked");
            if let Some(n) = lock(&self.coordinator.workspace)
                .tree_mut(self.target.panel)
                .filter(|t| t.generation() == self.target.generation)
                .and_then(|t| t.get_mut(self.target.node))
            {
                n.loading = false;
            }
        }
        *lock(&self.coordinator.in_flight) = false;
    }
}

fn plan(ws: &Workspace, target: NodeRef, kind: LoadKind) -> Option<Plan> {
    let tree = ws.tree(target.panel)?;
    if tree.generation() != target.generation {
        return None;
    }
    let node = tree.get(target.node)?;
    if node.loading || node.raw.addr == 0 || node.full_type().is_empty() {
        return None;
    }
    let ty = quote_str(node.full_type());
    let (expr, policy, loaded) = match kind {
        LoadKind::ArrayOrSlice | LoadKind::Map => {
            if !node.has_more() {
                return None;
            }
            let loaded = node.loaded_len();
            let expr = format!("(*(*{})({:#x}))[{}:]", ty, node.raw.addr, loaded);
            (expr, LoadPolicy::LONG_ARRAY, loaded)
        }
        LoadKind::Struct => (
            format!("*(*{})({:#x})", ty, node.raw.addr),
            ws.policy(),
            node.loaded_len(),
        ),
    };
    Some(Plan {
        kind,
        expr,
        policy,
        scope: ws.scope(),
        loaded,
    })
}

fn merge(
    ws: &mut Workspace,
    target: NodeRef,
    plan: &Plan,
    result: Result<RawValue, EvalError>,
) -> LoadEvent {
    let scrollback = ws.scrollback().clone();
    let Some((tree, formatters)) = ws.tree_and_formatters(target.panel) else {
        debug!(?target, "load finished for a removed panel");
        return LoadEvent::Stale(target);
    };
    if tree.generation() != target.generation {
        debug!(?target, current = tree.generation(), "discarding stale load");
        return LoadEvent::Stale(target);
    }
    let Some((kind, expression, name, display_name, unique_id)) = tree.get(target.node).map(|n| {
        (
            n.kind(),
            n.expression.clone(),
            n.raw.name.clone(),
            n.display_name.clone(),
            n.unique_id.clone(),
        )
    }) else {
        return LoadEvent::Stale(target);
    };
    let wrapper = Wrapper::new(formatters, true);

    match (plan.kind, result) {
        (LoadKind::ArrayOrSlice | LoadKind::Map, Ok(v)) => {
            let parent = if plan.kind == LoadKind::Map { Kind::Map } else { kind };
            let added = wrapper.wrap_collection(tree, v.children, Some(parent), plan.loaded, &expression, 1);
            if let Some(n) = tree.get_mut(target.node) {
                n.loading = false;
                if added.is_empty() {
                    // nothing new past the end: stop offering more
                    n.raw.len = plan.loaded as i64;
                }
                n.children.extend(added);
            }
            LoadEvent::Merged(target)
        }
        (LoadKind::ArrayOrSlice | LoadKind::Map, Err(e)) => {
            warn!(expr = %plan.expr, error = %e, "loading more elements failed");
            scrollback.error(&format!("Error loading array contents {}: {}", plan.expr, e));
            if let Some(n) = tree.get_mut(target.node) {
                n.loading = false;
                n.raw.len = plan.loaded as i64;
            }
            LoadEvent::Failed(target, e)
        }
        (LoadKind::Struct, Ok(mut v)) => {
            v.name = name;
            let label = v.name.clone();
            let mut node = wrapper.build(tree, v, &label, &expression, 0);
            node.display_name = display_name;
            node.unique_id = unique_id;
            tree.replace(target.node, node);
            LoadEvent::Merged(target)
        }
        (LoadKind::Struct, Err(e)) => {
            warn!(expr = %plan.expr, error = %e, "reloading value failed");
            scrollback.error(&format!("Error loading {}: {}", plan.expr, e));
            if let Some(n) = tree.get_mut(target.node) {
                n.loading = false;
                n.raw.unreadable = e.to_string();
            }
            LoadEvent::Failed(target, e)
        }
    }
}
