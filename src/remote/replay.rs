//! Offline debugger service replaying a recorded stop
//!
//! A recorded session is a JSON document:
//!
//! ```text
//! {
//!   "scope":   { "goroutine_id": 1, "frame": 0, "deferred_call": 0 },
//!   "globals": [ RawValue, ... ],
//!   "frames":  [ { "function": "main.main", "args": [...], "locals": [...] } ],
//!   "objects": [ RawValue, ... ]
//! }
//! ```
//!
//! `objects` holds fully materialized values keyed by their `addr`. Variables
//! in the frames may be stored shallow (address-only pointer targets, empty
//! structs, truncated arrays); evaluation fills them in from the object table
//! and then cuts the result back down according to the requested
//! [`LoadPolicy`], the way a live debugger would.

use super::expr::{parse_path, parse_scoped, Path};
use super::value::{Kind, RawValue};
use super::{DebuggerService, EvalScope, LoadPolicy};
use crate::errors::{ConfigError, EvalError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path as FsPath;

/// One recorded stack frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameRecord {
    pub function: String,
    pub args: Vec<RawValue>,
    pub locals: Vec<RawValue>,
}

/// A recorded debugger stop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub scope: EvalScope,
    pub globals: Vec<RawValue>,
    pub frames: Vec<FrameRecord>,
    pub objects: Vec<RawValue>,
}

/// [`DebuggerService`] answering from a [`Session`]
#[derive(Debug)]
pub struct ReplayService {
    session: Session,
    objects: FxHashMap<u64, RawValue>,
}

impl ReplayService {
    pub fn new(session: Session) -> Self {
        let objects = session
            .objects
            .iter()
            .filter(|o| o.addr != 0)
            .map(|o| (o.addr, o.clone()))
            .collect();
        ReplayService { session, objects }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn from_file(path: &FsPath) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Scope the session was recorded at
    pub fn scope(&self) -> EvalScope {
        self.session.scope
    }

    pub fn frame_count(&self) -> usize {
        self.session.frames.len()
    }

    pub fn function_name(&self, frame: i32) -> Option<&str> {
        self.frame(frame).ok().map(|f| f.function.as_str())
    }

    fn frame(&self, frame: i32) -> Result<&FrameRecord, EvalError> {
        usize::try_from(frame)
            .ok()
            .and_then(|i| self.session.frames.get(i))
            .ok_or(EvalError::NoSuchFrame(frame))
    }

    fn lookup(&self, scope: EvalScope, name: &str) -> Result<RawValue, EvalError> {
        let frame = self.frame(scope.frame)?;
        let escaped = format!("&{}", name);
        for v in frame.locals.iter().rev() {
            if v.name == name {
                return Ok(v.clone());
            }
            if v.name == escaped && v.kind == Kind::Ptr {
                if let Some(target) = v.children.first() {
                    let mut target = self.materialize(target.clone())?;
                    target.name = name.to_string();
                    return Ok(target);
                }
            }
        }
        frame
            .args
            .iter()
            .chain(self.session.globals.iter())
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }

    /// Replace a shallow value with its recorded object, when there is one
    fn fill(&self, v: RawValue) -> RawValue {
        let shallow = v.only_addr
            || match v.kind {
                Kind::Struct => v.children.is_empty() && v.len > 0,
                Kind::Array | Kind::Slice | Kind::Map => (v.loaded_len() as i64) < v.len,
                _ => false,
            };
        if !shallow || v.addr == 0 {
            return v;
        }
        match self.objects.get(&v.addr) {
            Some(obj) => {
                let mut obj = obj.clone();
                obj.name = v.name;
                obj
            }
            None => v,
        }
    }

    /// Like [`fill`](Self::fill), but an address-only value with no recorded
    /// object is an error
    fn materialize(&self, v: RawValue) -> Result<RawValue, EvalError> {
        if v.only_addr && !self.objects.contains_key(&v.addr) {
            return Err(EvalError::NoObjectAt(v.addr));
        }
        Ok(self.fill(v))
    }

    fn resolve(&self, scope: EvalScope, path: &Path) -> Result<RawValue, EvalError> {
        match path {
            Path::Ident(name) => self.lookup(scope, name),
            Path::Field(base, field) => {
                let v = match self.resolve(scope, base) {
                    Ok(v) => v,
                    Err(EvalError::UnknownVariable(pkg)) => {
                        return self.lookup(scope, &format!("{}.{}", pkg, field));
                    }
                    Err(e) => return Err(e),
                };
                let mut v = self.materialize(v)?;
                if v.kind == Kind::Ptr {
                    v = self.deref(v)?;
                }
                if !matches!(v.kind, Kind::Struct | Kind::Chan) {
                    return Err(EvalError::NoSuchField {
                        type_name: v.type_name,
                        field: field.clone(),
                    });
                }
                match v.children.iter().find(|c| &c.name == field) {
                    Some(c) => Ok(c.clone()),
                    None => Err(EvalError::NoSuchField {
                        type_name: v.type_name,
                        field: field.clone(),
                    }),
                }
            }
            Path::Index(base, index) => {
                let v = self.materialize(self.resolve(scope, base)?)?;
                if !v.kind.is_sequence() {
                    return Err(EvalError::Unsupported(format!("index of {:?}", v.kind)));
                }
                usize::try_from(*index)
                    .ok()
                    .and_then(|i| v.children.get(i))
                    .cloned()
                    .ok_or(EvalError::IndexOutOfRange {
                        index: *index,
                        len: v.len,
                    })
            }
            Path::Tail(base, start) => {
                let mut v = self.materialize(self.resolve(scope, base)?)?;
                let per_item = match v.kind {
                    Kind::Array | Kind::Slice => 1,
                    Kind::Map => 2,
                    other => return Err(EvalError::Unsupported(format!("slice of {:?}", other))),
                };
                if *start < 0 || *start > v.len {
                    return Err(EvalError::IndexOutOfRange {
                        index: *start,
                        len: v.len,
                    });
                }
                let skip = (*start as usize * per_item).min(v.children.len());
                v.children.drain(..skip);
                v.len -= start;
                if v.kind != Kind::Map {
                    v.cap = (v.cap - start).max(v.len);
                }
                Ok(v)
            }
            Path::Deref(base) => {
                let v = self.resolve(scope, base)?;
                self.deref(v)
            }
            Path::TypedAddr { type_name, addr } => Ok(RawValue {
                kind: Kind::Ptr,
                type_name: format!("*{}", type_name),
                len: 1,
                children: vec![RawValue {
                    addr: *addr,
                    only_addr: true,
                    type_name: type_name.clone(),
                    ..RawValue::default()
                }],
                ..RawValue::default()
            }),
        }
    }

    fn deref(&self, v: RawValue) -> Result<RawValue, EvalError> {
        if v.kind != Kind::Ptr {
            return Err(EvalError::NotAddressable(v.name));
        }
        let name = format!("*{}", v.name);
        match v.children.into_iter().next() {
            Some(target) if target.addr != 0 => {
                let mut target = self.materialize(target)?;
                if target.name.is_empty() {
                    target.name = name;
                }
                Ok(target)
            }
            _ => Err(EvalError::NotAddressable(name)),
        }
    }

    /// Cut a value down to what `policy` allows at recursion level `depth`
    fn limit(&self, v: RawValue, policy: LoadPolicy, depth: i32) -> RawValue {
        let mut v = self.fill(v);
        match v.kind {
            Kind::String => {
                if policy.max_string_len >= 0 {
                    let mut keep = policy.max_string_len as usize;
                    if keep < v.value.len() {
                        while !v.value.is_char_boundary(keep) {
                            keep -= 1;
                        }
                        v.value.truncate(keep);
                    }
                }
            }
            Kind::Array | Kind::Slice | Kind::Map => {
                let per_item = if v.kind == Kind::Map { 2 } else { 1 };
                if policy.max_array_values >= 0 {
                    v.children
                        .truncate(policy.max_array_values as usize * per_item);
                }
                v.children = self.limit_all(v.children, policy, depth + 1);
            }
            Kind::Struct | Kind::Chan => {
                if v.len == 0 {
                    v.len = v.children.len() as i64;
                }
                if depth > policy.max_variable_recurse {
                    v.children.clear();
                } else {
                    if policy.max_struct_fields >= 0 {
                        v.children.truncate(policy.max_struct_fields as usize);
                    }
                    v.children = self.limit_all(v.children, policy, depth + 1);
                }
            }
            Kind::Ptr | Kind::UnsafePointer => {
                v.children = v
                    .children
                    .into_iter()
                    .map(|target| {
                        if target.addr == 0 {
                            target
                        } else if !policy.follow_pointers || depth > policy.max_variable_recurse {
                            target.placeholder()
                        } else {
                            // pointers do not count as a level unless they chain
                            let next = if target.kind == Kind::Ptr { depth + 1 } else { depth };
                            self.limit(target, policy, next)
                        }
                    })
                    .collect();
            }
            Kind::Interface => {
                v.children = self.limit_all(v.children, policy, depth);
            }
            _ => {}
        }
        v
    }

    fn limit_all(&self, values: Vec<RawValue>, policy: LoadPolicy, depth: i32) -> Vec<RawValue> {
        values
            .into_iter()
            .map(|c| self.limit(c, policy, depth))
            .collect()
    }
}

impl DebuggerService for ReplayService {
    fn evaluate(
        &self,
        scope: EvalScope,
        expr: &str,
        policy: LoadPolicy,
    ) -> Result<RawValue, EvalError> {
        let (prefix, bare) = parse_scoped(expr);
        let scope = prefix.map_or(scope, |p| p.apply(scope));
        let path = parse_path(bare)?;
        let v = self.resolve(scope, &path)?;
        Ok(self.limit(v, policy, 0))
    }

    fn list_package_variables(
        &self,
        filter: &str,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError> {
        Ok(self
            .session
            .globals
            .iter()
            .filter(|g| g.name.contains(filter))
            .map(|g| self.limit(g.clone(), policy, 0))
            .collect())
    }

    fn list_function_args(
        &self,
        scope: EvalScope,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError> {
        let frame = self.frame(scope.frame)?;
        Ok(self.limit_all(frame.args.clone(), policy, 0))
    }

    fn list_local_variables(
        &self,
        scope: EvalScope,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError> {
        let frame = self.frame(scope.frame)?;
        Ok(self.limit_all(frame.locals.clone(), policy, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str, n: i64) -> RawValue {
        RawValue {
            name: name.into(),
            kind: Kind::Int,
            type_name: "int".into(),
            value: n.to_string(),
            addr: 0x100 + n as u64,
            ..RawValue::default()
        }
    }

    fn service() -> ReplayService {
        let elems: Vec<RawValue> = (0..100).map(|i| int("", i)).collect();
        let slice = RawValue {
            name: "s".into(),
            kind: Kind::Slice,
            type_name: "[]int".into(),
            addr: 0xc000,
            len: 100,
            cap: 128,
            children: elems,
            ..RawValue::default()
        };
        let point = RawValue {
            name: "".into(),
            kind: Kind::Struct,
            type_name: "main.Point".into(),
            addr: 0xd000,
            len: 2,
            children: vec![int("X", 1), int("Y", 2)],
            ..RawValue::default()
        };
        let ptr = RawValue {
            name: "p".into(),
            kind: Kind::Ptr,
            type_name: "*main.Point".into(),
            addr: 0xe000,
            len: 1,
            children: vec![point.placeholder()],
            ..RawValue::default()
        };
        ReplayService::new(Session {
            scope: EvalScope::default(),
            globals: vec![int("main.counter", 7)],
            frames: vec![FrameRecord {
                function: "main.main".into(),
                args: vec![],
                locals: vec![slice.placeholder_with_len(), ptr],
            }],
            objects: vec![slice, point],
        })
    }

    impl RawValue {
        fn placeholder_with_len(&self) -> RawValue {
            RawValue {
                only_addr: false,
                len: self.len,
                cap: self.cap,
                ..self.placeholder()
            }
        }
    }

    #[test]
    fn test_evaluate_applies_array_cap() {
        let svc = service();
        let v = svc
            .evaluate(EvalScope::default(), "s", LoadPolicy::LONG)
            .expect("evaluates");
        assert_eq!(v.len, 100);
        assert_eq!(v.children.len(), 16);
    }

    #[test]
    fn test_evaluate_tail_of_slice() {
        let svc = service();
        let v = svc
            .evaluate(
                EvalScope::default(),
                r#"(*(*"[]int")(0xc000))[16:]"#,
                LoadPolicy::LONG_ARRAY,
            )
            .expect("evaluates");
        assert_eq!(v.children.len(), 64);
        assert_eq!(v.children[0].value, "16");
        assert_eq!(v.len, 84);
    }

    #[test]
    fn test_field_through_pointer() {
        let svc = service();
        let v = svc
            .evaluate(EvalScope::default(), "(*(p)).Y", LoadPolicy::LONG)
            .expect("evaluates");
        assert_eq!(v.value, "2");
        let v = svc
            .evaluate(EvalScope::default(), "p.X", LoadPolicy::LONG)
            .expect("evaluates");
        assert_eq!(v.value, "1");
    }

    #[test]
    fn test_short_policy_leaves_pointer_targets_unloaded() {
        let svc = service();
        let v = svc
            .evaluate(EvalScope::default(), "p", LoadPolicy::SHORT)
            .expect("evaluates");
        assert!(v.children[0].only_addr);
        let v = svc
            .evaluate(EvalScope::default(), "p", LoadPolicy::LONG)
            .expect("evaluates");
        assert!(!v.children[0].only_addr);
        assert_eq!(v.children[0].children.len(), 2);
    }

    #[test]
    fn test_string_cap_counts_bytes() {
        let svc = service();
        let s = RawValue {
            name: "s".into(),
            kind: Kind::String,
            type_name: "string".into(),
            value: "héllo".into(),
            len: 6,
            ..RawValue::default()
        };
        let policy = |max_string_len| LoadPolicy {
            max_string_len,
            ..LoadPolicy::LONG
        };
        // the cap lands inside 'é', so the cut backs off to the boundary
        assert_eq!(svc.limit(s.clone(), policy(2), 0).value, "h");
        assert_eq!(svc.limit(s.clone(), policy(3), 0).value, "hé");
        assert_eq!(svc.limit(s.clone(), policy(6), 0).value, "héllo");
        assert_eq!(svc.limit(s, policy(-1), 0).len, 6);
    }

    #[test]
    fn test_package_qualified_global() {
        let svc = service();
        let v = svc
            .evaluate(EvalScope::default(), "main.counter", LoadPolicy::LONG)
            .expect("evaluates");
        assert_eq!(v.value, "7");
    }

    #[test]
    fn test_errors() {
        let svc = service();
        let scope = EvalScope::default();
        assert_eq!(
            svc.evaluate(scope, "nope", LoadPolicy::LONG),
            Err(EvalError::UnknownVariable("nope".into()))
        );
        assert_eq!(
            svc.evaluate(scope, r#"*(*"main.T")(0x1)"#, LoadPolicy::LONG),
            Err(EvalError::NoObjectAt(1))
        );
        assert!(matches!(
            svc.evaluate(scope, "p.Z", LoadPolicy::LONG),
            Err(EvalError::NoSuchField { .. })
        ));
        let far = EvalScope {
            frame: 3,
            ..scope
        };
        assert_eq!(
            svc.list_local_variables(far, LoadPolicy::LONG),
            Err(EvalError::NoSuchFrame(3))
        );
    }
}
