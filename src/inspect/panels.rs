//! The trees shown by the front-end: locals, globals and watch expressions
//!
//! A [`Workspace`] owns one [`DisplayTree`] per panel together with the
//! [`FormatterRegistry`] used to build them. Refreshing a panel replaces its
//! tree wholesale with a new generation; the previous tree is kept when the
//! bulk listing fails.

use crate::errors::{EvalError, FormatterError};
use crate::inspect::formatter::{FormatterRegistry, ValueOverride};
use crate::inspect::pretty::{multiline, singleline};
use crate::inspect::tree::{DisplayTree, NodeId};
use crate::inspect::wrap::Wrapper;
use crate::remote::expr::{is_pinned, parse_scoped, pin};
use crate::remote::value::{Kind, RawValue};
use crate::remote::{DebuggerService, EvalScope, LoadPolicy};
use crate::scrollback::Scrollback;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// Which tree a node lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelId {
    Locals,
    Globals,
    /// A watch expression, by its stable id
    Watch(u64),
}

/// A user-entered expression re-evaluated on every stop
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchExpr {
    pub expr: String,
    /// When positive, replaces the default array cap (and the string cap)
    pub max_array_values: i32,
    pub max_string_len: i32,
    /// Print `expr = value` to the scrollback on every refresh
    pub traced: bool,
}

impl WatchExpr {
    pub fn new(expr: impl Into<String>) -> Self {
        WatchExpr {
            expr: expr.into(),
            ..WatchExpr::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Watch {
    id: u64,
    pub spec: WatchExpr,
    tree: DisplayTree,
}

impl Watch {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tree(&self) -> &DisplayTree {
        &self.tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.roots().first().copied()
    }
}

/// Evaluate a watch expression, honoring a scope prefix. Failures become an
/// unreadable value named after the expression.
pub fn evaluate_watch(
    service: &dyn DebuggerService,
    scope: EvalScope,
    spec: &WatchExpr,
    policy: LoadPolicy,
) -> RawValue {
    let (prefix, bare) = parse_scoped(&spec.expr);
    let scope = prefix.map_or(scope, |p| p.apply(scope));
    let mut v = match service.evaluate(scope, bare, policy) {
        Ok(v) => v,
        Err(e) => {
            debug!(expr = %spec.expr, error = %e, "watch evaluation failed");
            RawValue::unreadable(&spec.expr, e.to_string())
        }
    };
    v.name = spec.expr.clone();
    v
}

/// A local reported as `&x` (moved to the heap) is shown as `x`
fn unwrap_escaped(v: RawValue) -> RawValue {
    if v.kind == Kind::Ptr && v.name.len() > 1 && v.name.starts_with('&') && !v.children.is_empty() {
        let name = v.name[1..].to_string();
        let mut children = v.children;
        let mut target = children.swap_remove(0);
        target.name = name;
        return target;
    }
    v
}

/// All panel trees plus the formatting state used to build them
#[derive(Debug)]
pub struct Workspace {
    formatters: FormatterRegistry,
    policy: LoadPolicy,
    scope: EvalScope,
    locals: DisplayTree,
    globals: DisplayTree,
    watches: Vec<Watch>,
    next_generation: u64,
    next_watch_id: u64,
    scrollback: Scrollback,
}

impl Workspace {
    pub fn new(formatters: FormatterRegistry, policy: LoadPolicy, scrollback: Scrollback) -> Self {
        Workspace {
            formatters,
            policy,
            scope: EvalScope::default(),
            locals: DisplayTree::new(0),
            globals: DisplayTree::new(0),
            watches: Vec::new(),
            next_generation: 0,
            next_watch_id: 0,
            scrollback,
        }
    }

    pub fn scope(&self) -> EvalScope {
        self.scope
    }

    /// Change the evaluation scope; trees are rebuilt on the next refresh
    pub fn set_scope(&mut self, scope: EvalScope) {
        self.scope = scope;
    }

    /// Policy for default ("long") loads
    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    pub fn formatters_mut(&mut self) -> &mut FormatterRegistry {
        &mut self.formatters
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    fn fresh_tree(&mut self) -> DisplayTree {
        self.next_generation += 1;
        DisplayTree::new(self.next_generation)
    }

    pub fn tree(&self, panel: PanelId) -> Option<&DisplayTree> {
        match panel {
            PanelId::Locals => Some(&self.locals),
            PanelId::Globals => Some(&self.globals),
            PanelId::Watch(id) => self.watch(id).map(|w| &w.tree),
        }
    }

    pub fn tree_mut(&mut self, panel: PanelId) -> Option<&mut DisplayTree> {
        match panel {
            PanelId::Locals => Some(&mut self.locals),
            PanelId::Globals => Some(&mut self.globals),
            PanelId::Watch(id) => self
                .watches
                .iter_mut()
                .find(|w| w.id == id)
                .map(|w| &mut w.tree),
        }
    }

    /// A panel tree together with the formatters needed to grow it
    pub fn tree_and_formatters(
        &mut self,
        panel: PanelId,
    ) -> Option<(&mut DisplayTree, &FormatterRegistry)> {
        let tree = match panel {
            PanelId::Locals => &mut self.locals,
            PanelId::Globals => &mut self.globals,
            PanelId::Watch(id) => &mut self.watches.iter_mut().find(|w| w.id == id)?.tree,
        };
        Some((tree, &self.formatters))
    }

    /// Rebuild the locals tree: arguments then locals, ordered by declaration
    /// line, with same-named entries told apart by a counter.
    pub fn refresh_locals(&mut self, service: &dyn DebuggerService) -> Result<(), EvalError> {
        let args = service.list_function_args(self.scope, self.policy)?;
        let locals = service.list_local_variables(self.scope, self.policy)?;
        let vars: Vec<RawValue> = args
            .into_iter()
            .chain(locals.into_iter().map(unwrap_escaped))
            .collect();

        let mut tree = self.fresh_tree();
        let wrapper = Wrapper::new(&self.formatters, true);
        for id in wrapper
            .wrap_collection(&mut tree, vars, None, 0, "", 0)
            .into_iter()
            .flatten()
        {
            tree.push_root(id);
        }
        tree.sort_roots_by(|a, b| a.raw.decl_line.cmp(&b.raw.decl_line));

        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        for id in tree.roots().to_vec() {
            if let Some(n) = tree.get_mut(id) {
                let count = seen.entry(n.unique_id.clone()).or_insert(0);
                n.unique_id = format!("{} {}", n.unique_id, count);
                *count += 1;
            }
        }

        info!(scope = ?self.scope, count = tree.roots().len(), "locals refreshed");
        for &id in tree.roots() {
            if let Some(n) = tree.get(id) {
                trace!("\t{} = {}", n.display_name, multiline(&tree, id, "\t"));
            }
        }
        self.locals = tree;
        Ok(())
    }

    /// Rebuild the globals tree, sorted by name
    pub fn refresh_globals(
        &mut self,
        service: &dyn DebuggerService,
        filter: &str,
    ) -> Result<(), EvalError> {
        let globals = service.list_package_variables(filter, self.policy)?;
        let mut tree = self.fresh_tree();
        let wrapper = Wrapper::new(&self.formatters, true);
        for id in wrapper
            .wrap_collection(&mut tree, globals, None, 0, "", 0)
            .into_iter()
            .flatten()
        {
            tree.push_root(id);
        }
        tree.sort_roots_by(|a, b| a.raw.name.cmp(&b.raw.name));
        info!(count = tree.roots().len(), "globals refreshed");
        self.globals = tree;
        Ok(())
    }

    /// Re-evaluate every watch expression; traced ones are echoed
    pub fn refresh_watches(&mut self, service: &dyn DebuggerService) {
        let specs: Vec<(u64, WatchExpr)> = self
            .watches
            .iter()
            .map(|w| (w.id, w.spec.clone()))
            .collect();
        for (id, spec) in specs {
            let v = evaluate_watch(service, self.scope, &spec, self.watch_policy(&spec));
            self.set_watch_value(id, &spec.expr, v, true);
        }
    }

    /// Locals, watches and globals, in that order. Stops at the first failed
    /// listing.
    pub fn refresh_all(&mut self, service: &dyn DebuggerService) -> Result<(), EvalError> {
        self.refresh_locals(service)?;
        self.refresh_watches(service);
        self.refresh_globals(service, "")
    }

    /// Drop everything tied to the old process
    pub fn restart(&mut self) {
        self.formatters.clear_overrides();
        self.locals = self.fresh_tree();
        self.globals = self.fresh_tree();
        for i in 0..self.watches.len() {
            let tree = self.fresh_tree();
            self.watches[i].tree = tree;
        }
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    pub fn watch(&self, id: u64) -> Option<&Watch> {
        self.watches.iter().find(|w| w.id == id)
    }

    fn watch_mut(&mut self, id: u64) -> Option<&mut Watch> {
        self.watches.iter_mut().find(|w| w.id == id)
    }

    /// The default policy with the watch's own caps applied
    pub fn watch_policy(&self, spec: &WatchExpr) -> LoadPolicy {
        let mut policy = self.policy;
        if spec.max_array_values > 0 {
            policy.max_array_values = spec.max_array_values;
            policy.max_string_len = spec.max_string_len;
        }
        policy
    }

    /// Append a watch; its tree is empty until it is evaluated
    pub fn add_watch(&mut self, spec: WatchExpr) -> u64 {
        let id = self.next_watch_id;
        self.next_watch_id += 1;
        let tree = self.fresh_tree();
        self.watches.push(Watch { id, spec, tree });
        id
    }

    pub fn edit_watch(&mut self, id: u64, expr: &str) -> bool {
        match self.watch_mut(id) {
            Some(w) => {
                w.spec.expr = expr.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_watch(&mut self, id: u64) -> bool {
        let before = self.watches.len();
        self.watches.retain(|w| w.id != id);
        self.watches.len() != before
    }

    pub fn set_traced(&mut self, id: u64, traced: bool) -> bool {
        self.watch_mut(id).map(|w| w.spec.traced = traced).is_some()
    }

    pub fn set_watch_limits(&mut self, id: u64, max_array_values: i32, max_string_len: i32) -> bool {
        self.watch_mut(id)
            .map(|w| {
                w.spec.max_array_values = max_array_values;
                w.spec.max_string_len = max_string_len;
            })
            .is_some()
    }

    /// Pin the watch to the current scope, or unpin it if it already is
    pub fn toggle_pin(&mut self, id: u64) -> bool {
        let scope = self.scope;
        match self.watch_mut(id) {
            Some(w) => {
                w.spec.expr = if is_pinned(&w.spec.expr) {
                    parse_scoped(&w.spec.expr).1.to_string()
                } else {
                    pin(scope, &w.spec.expr)
                };
                true
            }
            None => false,
        }
    }

    /// Replace a watch's tree with `value`. Ignored when the watch was removed
    /// or its expression changed since `expr` was evaluated.
    pub fn set_watch_value(&mut self, id: u64, expr: &str, value: RawValue, trace: bool) -> bool {
        if self.watch(id).map_or(true, |w| w.spec.expr != expr) {
            debug!(id, expr, "discarding result for an edited watch");
            return false;
        }
        let mut tree = self.fresh_tree();
        let root = Wrapper::new(&self.formatters, true).wrap(&mut tree, value, expr, expr);
        tree.push_root(root);
        if trace && self.watch(id).is_some_and(|w| w.spec.traced) {
            self.scrollback
                .write(&format!("{} = {}", expr, singleline(&tree, root, true, false)));
        }
        if let Some(w) = self.watch_mut(id) {
            w.tree = tree;
        }
        true
    }

    /// Install an address override for a node and re-render every node at
    /// that address
    pub fn install_override(
        &mut self,
        panel: PanelId,
        node: NodeId,
        value_override: ValueOverride,
    ) -> Result<(), FormatterError> {
        let Some(raw) = self.tree(panel).and_then(|t| t.get(node)).map(|n| n.raw.clone()) else {
            return Ok(());
        };
        self.formatters.install_override(&raw, value_override)?;
        self.reformat_address(raw.addr);
        Ok(())
    }

    pub fn remove_override(&mut self, addr: u64) {
        if self.formatters.remove_override(addr).is_some() {
            self.reformat_address(addr);
        }
    }

    fn reformat_address(&mut self, addr: u64) {
        let formatters = &self.formatters;
        let trees = [&mut self.locals, &mut self.globals]
            .into_iter()
            .chain(self.watches.iter_mut().map(|w| &mut w.tree));
        for tree in trees {
            for n in tree.iter_mut() {
                if n.raw.addr == addr && (n.kind().is_integer() || n.kind().is_float()) {
                    n.formatted_value = formatters.format(&n.raw, true);
                }
            }
        }
    }
}
