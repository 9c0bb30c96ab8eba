// Integration tests for background loading of truncated values

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use varscope::errors::EvalError;
use varscope::inspect::tree::MAX_AUTOLOAD_DEPTH;
use varscope::inspect::{
    DisplayNode, FormatterRegistry, LoadCoordinator, LoadEvent, LoadRequest, NodeRef, PanelId,
    Workspace,
};
use varscope::remote::value::{Kind, RawValue};
use varscope::remote::{DebuggerService, EvalScope, LoadPolicy};
use varscope::scrollback::Scrollback;

type Responder = Box<dyn Fn(&str) -> Result<RawValue, EvalError> + Send + Sync>;

/// Two rendezvous points around each evaluation, so a test can act while a
/// load is known to be running
struct Gate {
    entered: Barrier,
    release: Barrier,
}

struct Scripted {
    locals: Vec<RawValue>,
    respond: Responder,
    calls: AtomicUsize,
    gate: Option<Gate>,
}

impl Scripted {
    fn new<F>(locals: Vec<RawValue>, respond: F) -> Self
    where
        F: Fn(&str) -> Result<RawValue, EvalError> + Send + Sync + 'static,
    {
        Scripted {
            locals,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(mut self) -> Self {
        self.gate = Some(Gate {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one gated evaluation through
    fn step(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.wait();
            gate.release.wait();
        }
    }
}

impl DebuggerService for Scripted {
    fn evaluate(&self, _: EvalScope, expr: &str, _: LoadPolicy) -> Result<RawValue, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.wait();
            gate.release.wait();
        }
        (self.respond)(expr)
    }

    fn list_package_variables(&self, _: &str, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
        Ok(Vec::new())
    }

    fn list_function_args(&self, _: EvalScope, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
        Ok(Vec::new())
    }

    fn list_local_variables(&self, _: EvalScope, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
        Ok(self.locals.clone())
    }
}

fn int(n: usize, addr: u64) -> RawValue {
    RawValue {
        kind: Kind::Int,
        type_name: "int".into(),
        value: n.to_string(),
        addr,
        ..RawValue::default()
    }
}

fn ints(start: usize, count: usize, base: u64) -> Vec<RawValue> {
    (start..start + count)
        .map(|i| int(i, base + 8 * i as u64))
        .collect()
}

fn slice(name: &str, addr: u64, len: usize, loaded: usize) -> RawValue {
    RawValue {
        name: name.into(),
        kind: Kind::Slice,
        type_name: "[]int".into(),
        addr,
        len: len as i64,
        cap: len as i64,
        children: ints(0, loaded, addr),
        ..RawValue::default()
    }
}

fn string(s: &str) -> RawValue {
    RawValue {
        kind: Kind::String,
        type_name: "string".into(),
        value: s.into(),
        len: s.len() as i64,
        addr: 0x9000,
        ..RawValue::default()
    }
}

fn shallow_struct(name: &str, addr: u64) -> RawValue {
    RawValue {
        name: name.into(),
        kind: Kind::Struct,
        type_name: "main.T".into(),
        addr,
        len: 2,
        ..RawValue::default()
    }
}

fn setup(service: Scripted) -> (Arc<Scripted>, LoadCoordinator, Receiver<LoadEvent>) {
    let service = Arc::new(service);
    let mut workspace = Workspace::new(FormatterRegistry::new(), LoadPolicy::LONG, Scrollback::new());
    workspace
        .refresh_locals(service.as_ref())
        .expect("locals listed");
    let shared: Arc<dyn DebuggerService> = service.clone();
    let (coordinator, events) = LoadCoordinator::new(shared, Arc::new(Mutex::new(workspace)));
    (service, coordinator, events)
}

fn root(coordinator: &LoadCoordinator, unique_id: &str) -> NodeRef {
    let ws = coordinator.workspace().lock().expect("workspace lock");
    let tree = ws.tree(PanelId::Locals).expect("locals tree");
    NodeRef {
        panel: PanelId::Locals,
        generation: tree.generation(),
        node: tree.find_root(unique_id).expect("root exists"),
    }
}

fn node(coordinator: &LoadCoordinator, target: NodeRef) -> DisplayNode {
    let ws = coordinator.workspace().lock().expect("workspace lock");
    ws.tree(target.panel)
        .and_then(|t| t.get(target.node))
        .cloned()
        .expect("node exists")
}

fn child_names(coordinator: &LoadCoordinator, target: NodeRef) -> Vec<String> {
    let ws = coordinator.workspace().lock().expect("workspace lock");
    let tree = ws.tree(target.panel).expect("tree");
    tree.children(target.node)
        .filter_map(|c| tree.get(c))
        .map(|c| c.display_name.clone())
        .collect()
}

fn next_event(events: &Receiver<LoadEvent>) -> LoadEvent {
    events
        .recv_timeout(Duration::from_secs(5))
        .expect("load event")
}

const SLICE_TAIL: &str = r#"(*(*"[]int")(0x1000))[16:]"#;

#[test]
fn test_load_more_appends_slice_tail() {
    let service = Scripted::new(vec![slice("s", 0x1000, 40, 16)], |expr| {
        if expr != SLICE_TAIL {
            return Err(EvalError::UnknownVariable(expr.to_string()));
        }
        Ok(RawValue {
            kind: Kind::Slice,
            type_name: "[]int".into(),
            addr: 0x1000,
            len: 24,
            children: ints(16, 24, 0x1000),
            ..RawValue::default()
        })
    });
    let (service, coordinator, events) = setup(service);
    let target = root(&coordinator, "s 0");
    assert_eq!(node(&coordinator, target).remaining(), 24);

    coordinator.load_more_array_or_slice(target).wait();
    assert_eq!(next_event(&events), LoadEvent::Merged(target));

    let s = node(&coordinator, target);
    assert_eq!(s.loaded_len(), 40);
    assert!(!s.has_more());
    assert!(!s.loading);

    {
        let ws = coordinator.workspace().lock().expect("workspace lock");
        let tree = ws.tree(PanelId::Locals).expect("tree");
        let children: Vec<_> = tree.children(target.node).collect();
        let appended = tree.get(children[16]).expect("appended child");
        assert_eq!(appended.display_name, "[16]");
        assert_eq!(appended.expression, "s[16]");
        assert_eq!(appended.raw.value, "16");
    }

    // fully loaded: asking again does nothing
    assert!(matches!(
        coordinator.load_more_array_or_slice(target),
        LoadRequest::NothingToLoad
    ));
    assert_eq!(service.calls(), 1);
}

#[test]
fn test_failed_tail_load_clamps_length() {
    let service = Scripted::new(vec![slice("s", 0x1000, 40, 16)], |_| {
        Err(EvalError::Disconnected("connection reset".into()))
    });
    let (_, coordinator, events) = setup(service);
    let target = root(&coordinator, "s 0");

    coordinator.load_more(target).wait();
    assert_eq!(
        next_event(&events),
        LoadEvent::Failed(target, EvalError::Disconnected("connection reset".into()))
    );

    let s = node(&coordinator, target);
    assert_eq!(s.raw.len, 16);
    assert!(!s.has_more());
    assert!(!s.loading);

    let output = coordinator
        .workspace()
        .lock()
        .expect("workspace lock")
        .scrollback()
        .get_output();
    assert_eq!(
        output,
        vec![format!(
            "Error loading array contents {}: debugger service unavailable: connection reset",
            SLICE_TAIL
        )]
    );
}

#[test]
fn test_struct_reload_replaces_node_in_place() {
    let service = Scripted::new(vec![shallow_struct("t", 0x2000)], |expr| {
        if expr != r#"*(*"main.T")(0x2000)"# {
            return Err(EvalError::UnknownVariable(expr.to_string()));
        }
        let mut a = int(1, 0x2000);
        a.name = "A".into();
        let mut b = int(2, 0x2008);
        b.name = "B".into();
        Ok(RawValue {
            name: expr.to_string(),
            children: vec![a, b],
            ..shallow_struct("", 0x2000)
        })
    });
    let (_, coordinator, events) = setup(service);
    let target = root(&coordinator, "t 0");

    let request = coordinator.autoload(PanelId::Locals, |_| true);
    assert!(request.is_issued());
    request.wait();
    assert_eq!(next_event(&events), LoadEvent::Merged(target));

    let t = node(&coordinator, target);
    assert_eq!(t.display_name, "t");
    assert_eq!(t.unique_id, "t 0");
    assert_eq!(t.raw.name, "t");
    assert_eq!(t.expression, "t");
    assert_eq!(child_names(&coordinator, target), vec!["A", "B"]);
    assert_eq!(root(&coordinator, "t 0"), target);

    assert!(matches!(
        coordinator.autoload(PanelId::Locals, |_| true),
        LoadRequest::NothingToLoad
    ));
}

#[test]
fn test_failed_struct_reload_marks_node_unreadable() {
    let service = Scripted::new(vec![shallow_struct("t", 0x2000)], |_| {
        Err(EvalError::NoObjectAt(0x2000))
    });
    let (service, coordinator, events) = setup(service);
    let target = root(&coordinator, "t 0");

    coordinator.load_more_struct(target).wait();
    assert!(matches!(next_event(&events), LoadEvent::Failed(t, _) if t == target));

    let t = node(&coordinator, target);
    assert!(t.is_unreadable());
    assert!(!t.loading);
    let output = coordinator
        .workspace()
        .lock()
        .expect("workspace lock")
        .scrollback()
        .get_output();
    assert_eq!(
        output,
        vec![r#"Error loading *(*"main.T")(0x2000): no object recorded at 0x2000"#.to_string()]
    );

    // unreadable nodes are not retried automatically
    assert!(matches!(
        coordinator.autoload(PanelId::Locals, |_| true),
        LoadRequest::NothingToLoad
    ));
    assert_eq!(service.calls(), 1);
}

#[test]
fn test_second_request_is_dropped_while_a_load_runs() {
    let service = Scripted::new(
        vec![slice("a", 0x1000, 40, 16), slice("b", 0x3000, 40, 16)],
        |_| {
            Ok(RawValue {
                kind: Kind::Slice,
                type_name: "[]int".into(),
                len: 24,
                children: ints(16, 24, 0x1000),
                ..RawValue::default()
            })
        },
    )
    .gated();
    let (service, coordinator, _events) = setup(service);
    let a = root(&coordinator, "a 0");
    let b = root(&coordinator, "b 0");

    let first = coordinator.load_more(a);
    assert!(first.is_issued());
    let gate = service.gate.as_ref().expect("gated");
    gate.entered.wait();

    assert!(coordinator.is_loading());
    assert!(node(&coordinator, a).loading);
    assert!(matches!(coordinator.load_more(b), LoadRequest::InFlight));
    // already loading
    assert!(matches!(coordinator.load_more(a), LoadRequest::NothingToLoad));

    gate.release.wait();
    first.wait();
    assert_eq!(service.calls(), 1);
    assert!(!coordinator.is_loading());
    assert!(node(&coordinator, b).has_more());

    // re-issued on a later frame, it goes through
    let second = coordinator.load_more(b);
    assert!(second.is_issued());
    service.step();
    second.wait();
    assert_eq!(service.calls(), 2);
    assert!(!node(&coordinator, b).has_more());
}

#[test]
fn test_panicked_load_frees_the_slot() {
    let service = Scripted::new(
        vec![slice("a", 0x1000, 40, 16), slice("b", 0x3000, 40, 16)],
        |expr| {
            if expr.contains("0x1000") {
                panic!("backend fault");
            }
            Ok(RawValue {
                kind: Kind::Slice,
                type_name: "[]int".into(),
                len: 24,
                children: ints(16, 24, 0x3000),
                ..RawValue::default()
            })
        },
    );
    let (service, coordinator, events) = setup(service);
    let a = root(&coordinator, "a 0");
    let b = root(&coordinator, "b 0");

    coordinator.load_more(a).wait();
    assert!(!coordinator.is_loading());
    assert!(!node(&coordinator, a).loading);

    let next = coordinator.load_more(b);
    assert!(next.is_issued());
    next.wait();
    assert_eq!(next_event(&events), LoadEvent::Merged(b));
    assert_eq!(service.calls(), 2);
    assert!(!node(&coordinator, b).has_more());
}

#[test]
fn test_result_for_replaced_tree_is_discarded() {
    let service = Scripted::new(vec![slice("s", 0x1000, 40, 16)], |_| {
        Ok(RawValue {
            kind: Kind::Slice,
            type_name: "[]int".into(),
            len: 24,
            children: ints(16, 24, 0x1000),
            ..RawValue::default()
        })
    })
    .gated();
    let (service, coordinator, events) = setup(service);
    let target = root(&coordinator, "s 0");

    let request = coordinator.load_more(target);
    let gate = service.gate.as_ref().expect("gated");
    gate.entered.wait();
    coordinator
        .workspace()
        .lock()
        .expect("workspace lock")
        .refresh_locals(service.as_ref())
        .expect("locals listed");
    gate.release.wait();
    request.wait();

    assert_eq!(next_event(&events), LoadEvent::Stale(target));
    let fresh = root(&coordinator, "s 0");
    assert_ne!(fresh.generation, target.generation);
    let s = node(&coordinator, fresh);
    assert_eq!(s.loaded_len(), 16);
    assert!(!s.loading);
    assert!(!coordinator.is_loading());
}

#[test]
fn test_autoload_stops_at_depth_limit() {
    // a self-referencing list: every reload reveals another unloaded node
    let unloaded = RawValue {
        kind: Kind::Struct,
        type_name: "main.L".into(),
        addr: 0x6000,
        only_addr: true,
        ..RawValue::default()
    };
    let next = RawValue {
        name: "Next".into(),
        kind: Kind::Ptr,
        type_name: "*main.L".into(),
        addr: 0x6008,
        len: 1,
        children: vec![unloaded],
        ..RawValue::default()
    };
    let head = RawValue {
        name: "l".into(),
        ..next.clone()
    };
    let service = Scripted::new(vec![head], move |_| {
        Ok(RawValue {
            kind: Kind::Struct,
            type_name: "main.L".into(),
            addr: 0x6000,
            len: 1,
            children: vec![next.clone()],
            ..RawValue::default()
        })
    });
    let (service, coordinator, _events) = setup(service);

    loop {
        match coordinator.autoload(PanelId::Locals, |_| true) {
            LoadRequest::NothingToLoad => break,
            LoadRequest::InFlight => panic!("no load should be outstanding"),
            request => request.wait(),
        }
        assert!(service.calls() <= MAX_AUTOLOAD_DEPTH, "autoload did not stop");
    }
    // targets sit at depths 1, 3, 5, 7 and 9
    assert_eq!(service.calls(), 5);
}

#[test]
fn test_map_tail_continues_pair_numbering() {
    let long_key = "a key that is far too long to fold";
    let local = RawValue {
        name: "m".into(),
        kind: Kind::Map,
        type_name: "map[string]int".into(),
        addr: 0x4000,
        len: 5,
        children: vec![string("k0"), int(0, 0x4100), string("k1"), int(1, 0x4108)],
        ..RawValue::default()
    };
    let service = Scripted::new(vec![local], move |expr| {
        if expr != r#"(*(*"map[string]int")(0x4000))[2:]"# {
            return Err(EvalError::UnknownVariable(expr.to_string()));
        }
        Ok(RawValue {
            kind: Kind::Map,
            type_name: "map[string]int".into(),
            addr: 0x4000,
            len: 3,
            children: vec![
                string("k2"),
                int(2, 0x4110),
                string(long_key),
                int(3, 0x4118),
                string("k4"),
                int(4, 0x4120),
            ],
            ..RawValue::default()
        })
    });
    let (_, coordinator, events) = setup(service);
    let target = root(&coordinator, "m 0");
    assert_eq!(node(&coordinator, target).remaining(), 3);

    coordinator.load_more_map(target).wait();
    assert_eq!(next_event(&events), LoadEvent::Merged(target));

    let m = node(&coordinator, target);
    assert_eq!(m.loaded_len(), 5);
    assert!(!m.has_more());
    assert_eq!(
        child_names(&coordinator, target),
        vec![
            r#"["k0"]"#,
            r#"["k1"]"#,
            r#"["k2"]"#,
            "[3 key]",
            "[3 value]",
            r#"["k4"]"#,
        ]
    );
}
