//! Runtime values and the opaque, type-erased user-function handles that
//! flow through node parameters.
//!
//! User predicates and transforms are black boxes to the IR (see
//! `SPEC_FULL.md` §9): rather than storing closures directly on
//! [`crate::ir::Node`] (which would make `Node` unable to derive the trait
//! bounds the rest of the crate wants — `Clone`, `PartialEq`, `Debug`), a
//! node stores a small [`FunctionRef`] handle and the actual closure lives
//! in a [`FunctionRegistry`] side table. Two handles are equal only if they
//! are the *same* registration; this is what gives the optimizer's CSE
//! pass its conservative reference-identity rule for free.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A runtime value flowing through a compiled plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An opaque handle referencing a user-supplied predicate or transform.
///
/// Equality is handle equality, not behavioral equality: two handles
/// minted from textually-identical closures are still distinct unless one
/// was literally cloned from the other (see [`FunctionRegistry::register`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(u64);

/// A single-argument predicate: `Value -> Result<bool>`.
pub type PredicateFn = Arc<dyn Fn(&Value) -> anyhow::Result<bool> + Send + Sync>;
/// A single-argument transform: `Value -> Result<Value>`.
pub type TransformFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;
/// A two-argument fold step, used by `Reduce`: `(Value, Value) -> Result<Value>`.
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> anyhow::Result<Value> + Send + Sync>;
/// A key-extraction function, used by `Sort`/`GroupBy`: `Value -> Result<Value>`.
pub type KeyFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;
/// A two-argument join predicate: `(Value, Value) -> Result<bool>`.
pub type JoinPredicateFn = Arc<dyn Fn(&Value, &Value) -> anyhow::Result<bool> + Send + Sync>;

/// The concrete closure behind a [`FunctionRef`], tagged by the shape the
/// node that captured it expects.
#[derive(Clone)]
pub enum UserFunction {
    Predicate(PredicateFn),
    Transform(TransformFn),
    Binary(BinaryFn),
    Key(KeyFn),
    JoinPredicate(JoinPredicateFn),
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            UserFunction::Predicate(_) => "Predicate",
            UserFunction::Transform(_) => "Transform",
            UserFunction::Binary(_) => "Binary",
            UserFunction::Key(_) => "Key",
            UserFunction::JoinPredicate(_) => "JoinPredicate",
        };
        write!(f, "UserFunction::{tag}(..)")
    }
}

impl UserFunction {
    /// Call this as a single-argument predicate, if that's the shape it is.
    pub fn call_predicate(&self, v: &Value) -> anyhow::Result<bool> {
        match self {
            UserFunction::Predicate(f) => f(v),
            other => anyhow::bail!("expected Predicate function, found {other:?}"),
        }
    }

    /// Call this as a single-argument transform, if that's the shape it is.
    pub fn call_transform(&self, v: &Value) -> anyhow::Result<Value> {
        match self {
            UserFunction::Transform(f) => f(v),
            other => anyhow::bail!("expected Transform function, found {other:?}"),
        }
    }

    /// Call this as a two-argument fold step, if that's the shape it is.
    pub fn call_binary(&self, a: &Value, b: &Value) -> anyhow::Result<Value> {
        match self {
            UserFunction::Binary(f) => f(a, b),
            other => anyhow::bail!("expected Binary function, found {other:?}"),
        }
    }

    /// Call this as a key-extraction function, if that's the shape it is.
    pub fn call_key(&self, v: &Value) -> anyhow::Result<Value> {
        match self {
            UserFunction::Key(f) => f(v),
            other => anyhow::bail!("expected Key function, found {other:?}"),
        }
    }

    /// Call this as a two-argument join predicate, if that's the shape it is.
    pub fn call_join_predicate(&self, l: &Value, r: &Value) -> anyhow::Result<bool> {
        match self {
            UserFunction::JoinPredicate(f) => f(l, r),
            other => anyhow::bail!("expected JoinPredicate function, found {other:?}"),
        }
    }
}

/// Side table mapping [`FunctionRef`] handles to the closures they name.
///
/// Shared (via `Arc`) between the graph builder, the optimizer (which
/// synthesizes new handles when it fuses/rewrites nodes), and the solver's
/// lowering step (which resolves handles into a `FunctionTable` at compile
/// time). A single mutex around the map matches the profiler's shared-state
/// discipline (`SPEC_FULL.md` §5).
#[derive(Default)]
pub struct FunctionRegistry {
    next_id: AtomicU64,
    functions: Mutex<HashMap<FunctionRef, UserFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("count", &self.functions.lock().len())
            .finish()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh, never-reused handle for `function`.
    ///
    /// Each call allocates a new handle even if an identical closure was
    /// registered before — callable equality in this crate is always
    /// reference equality (`SPEC_FULL.md` §4.6.2, §9).
    pub fn register(&self, function: UserFunction) -> FunctionRef {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = FunctionRef(id);
        self.functions.lock().insert(handle, function);
        handle
    }

    #[must_use]
    pub fn get(&self, handle: FunctionRef) -> Option<UserFunction> {
        self.functions.lock().get(&handle).cloned()
    }
}

/// A node parameter: either literal data or a reference to a user function.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Literal(Value),
    Function(FunctionRef),
}

impl ParamValue {
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ParamValue::Literal(v) => Some(v),
            ParamValue::Function(_) => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<FunctionRef> {
        match self {
            ParamValue::Function(h) => Some(*h),
            ParamValue::Literal(_) => None,
        }
    }
}

/// Parameter comparison for CSE (`SPEC_FULL.md` §4.6.2): literals compare
/// by deep equality, function handles compare by identity (handle
/// equality), and a literal never equals a function handle.
impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Literal(a), ParamValue::Literal(b)) => a == b,
            (ParamValue::Function(a), ParamValue::Function(b)) => a == b,
            _ => false,
        }
    }
}
