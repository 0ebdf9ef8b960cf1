//! Strategies: concrete executors per node kind (`SPEC_FULL.md` §4.3).
//!
//! A [`Strategy`] is a stateless emitter: given a node and the function
//! registry its parameters reference, it produces an [`Action`] — a
//! closure that, given the already-computed values of the node's inputs
//! (in `node.inputs` order), computes the node's output.
//!
//! `Input` and `Constant` have no strategy of their own; they're zero-arity
//! and lowered directly by [`crate::solver::SolverKernel`] (pulling from
//! the invocation's bindings, or returning a literal).

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::ir::{Node, NodeId, NodeKindTag};
use crate::value::{FunctionRegistry, ParamValue, Value};

/// An executable node action: input values (in `node.inputs` order) in,
/// output value out.
pub type Action = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// A concrete code emitter for a subset of node kinds.
pub trait Strategy: Send + Sync {
    /// The name used as the profiler's `strategy_name` key.
    fn name(&self) -> &'static str;

    /// Can this strategy compute nodes of `kind`?
    fn can_handle(&self, kind: NodeKindTag) -> bool;

    /// Emit an [`Action`] computing `node`'s output. Captures any user
    /// functions `node` references by resolving them out of `functions`.
    fn emit(&self, node: &Node, functions: &FunctionRegistry, node_id: NodeId) -> Action;

    /// A closed-form cost heuristic, used only when the profiler has no
    /// data for `(kind, strategy, bucket)` (`SPEC_FULL.md` §4.4).
    fn static_cost(&self, node: &Node, input_sizes: &[usize]) -> f64 {
        default_static_cost(node.kind, input_sizes)
    }
}

/// The solver's profiler-fallback default: a per-kind linear (or
/// quadratic, for `Join`) multiplier over input size.
#[must_use]
pub fn default_static_cost(kind: NodeKindTag, input_sizes: &[usize]) -> f64 {
    let n = input_sizes.first().copied().unwrap_or(0) as f64;
    match kind {
        NodeKindTag::Input | NodeKindTag::Constant => 0.0,
        NodeKindTag::Filter => n * 0.01,
        NodeKindTag::Map => n * 0.012,
        NodeKindTag::Reduce => n * 0.01,
        NodeKindTag::Distinct => n * 0.02,
        NodeKindTag::Flatten => n * 0.015,
        NodeKindTag::Assert => n * 0.008,
        NodeKindTag::Sort => {
            if n > 1.0 {
                n * n.log2() * 0.01
            } else {
                0.0
            }
        }
        NodeKindTag::GroupBy => n * 0.03,
        NodeKindTag::Join => {
            let r = input_sizes.get(1).copied().unwrap_or(0) as f64;
            n * r * 0.02
        }
    }
}

fn get_fn(functions: &FunctionRegistry, params: &std::collections::HashMap<String, ParamValue>, key: &str) -> Option<crate::value::UserFunction> {
    params.get(key).and_then(ParamValue::as_function).and_then(|h| functions.get(h))
}

fn tag_failure(node_id: NodeId, err: anyhow::Error) -> RuntimeError {
    RuntimeError::UserFunctionFailure {
        node: node_id,
        source: Arc::new(err),
    }
}

/// Total ordering over [`Value`]s, used by `Sort`: `Bool` < numerics <
/// `Str` < `List`, with numeric cross-comparison between `Int`/`Float`.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let c = compare_values(xi, yi);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        // Cross-type comparisons are stable but otherwise arbitrary; rank
        // by a fixed type order so sort remains deterministic.
        (a, b) => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::Str(_) => 2,
        Value::List(_) => 3,
    }
}

fn as_list<'a>(v: &'a Value, node_id: NodeId) -> Result<&'a [Value], RuntimeError> {
    v.as_list().ok_or_else(|| {
        tag_failure(node_id, anyhow::anyhow!("expected a list input, found {v:?}"))
    })
}

/// One-pass, explicitly-iterated execution: the "textbook" strategy.
pub struct NaiveStrategy;

impl Strategy for NaiveStrategy {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn can_handle(&self, kind: NodeKindTag) -> bool {
        matches!(
            kind,
            NodeKindTag::Filter
                | NodeKindTag::Map
                | NodeKindTag::Reduce
                | NodeKindTag::Sort
                | NodeKindTag::GroupBy
                | NodeKindTag::Join
                | NodeKindTag::Flatten
                | NodeKindTag::Distinct
                | NodeKindTag::Assert
        )
    }

    fn emit(&self, node: &Node, functions: &FunctionRegistry, node_id: NodeId) -> Action {
        emit_common(node, functions, node_id, false)
    }
}

/// Built-in-backed execution: where the host offers a faster primitive for
/// the same semantics (`SPEC_FULL.md` §4.3).
pub struct OptimizedStrategy;

impl Strategy for OptimizedStrategy {
    fn name(&self) -> &'static str {
        "optimized"
    }

    fn can_handle(&self, kind: NodeKindTag) -> bool {
        NaiveStrategy.can_handle(kind)
    }

    fn emit(&self, node: &Node, functions: &FunctionRegistry, node_id: NodeId) -> Action {
        emit_common(node, functions, node_id, true)
    }
}

/// A declared but non-capable extension point (`SPEC_FULL.md` §4.3): never
/// selected by the solver, but present so the strategy registry has
/// somewhere to grow a real vectorized backend later.
pub struct VectorizedStrategy;

impl Strategy for VectorizedStrategy {
    fn name(&self) -> &'static str {
        "vectorized"
    }

    fn can_handle(&self, _kind: NodeKindTag) -> bool {
        false
    }

    fn emit(&self, _node: &Node, _functions: &FunctionRegistry, node_id: NodeId) -> Action {
        Arc::new(move |_inputs| {
            Err(tag_failure(
                node_id,
                anyhow::anyhow!("vectorized strategy is a stub and cannot execute"),
            ))
        })
    }
}

/// Shared implementation for `NaiveStrategy`/`OptimizedStrategy`.
///
/// Both strategies are observably identical (the split exists so the
/// solver has two genuinely distinct emitters to choose between, and so a
/// later implementation can make `optimized` literally faster without
/// touching `naive`'s guaranteed-correct baseline); `use_builtins` only
/// picks which Rust idiom computes the same result.
fn emit_common(node: &Node, functions: &FunctionRegistry, node_id: NodeId, use_builtins: bool) -> Action {
    match node.kind {
        NodeKindTag::Filter => {
            let predicate = get_fn(functions, &node.params, "predicate")
                .expect("Filter node missing predicate");
            Arc::new(move |inputs: &[Value]| {
                let items = as_list(&inputs[0], node_id)?;
                let mut out = Vec::new();
                if use_builtins {
                    out = items
                        .iter()
                        .map(|item| predicate.call_predicate(item).map(|keep| (keep, item.clone())))
                        .collect::<anyhow::Result<Vec<_>>>()
                        .map_err(|e| tag_failure(node_id, e))?
                        .into_iter()
                        .filter_map(|(keep, item)| keep.then_some(item))
                        .collect();
                } else {
                    for item in items {
                        if predicate.call_predicate(item).map_err(|e| tag_failure(node_id, e))? {
                            out.push(item.clone());
                        }
                    }
                }
                Ok(Value::List(out))
            })
        }

        NodeKindTag::Map => {
            let transform =
                get_fn(functions, &node.params, "transform").expect("Map node missing transform");
            Arc::new(move |inputs: &[Value]| {
                let items = as_list(&inputs[0], node_id)?;
                let out = if use_builtins {
                    items
                        .iter()
                        .map(|item| transform.call_transform(item))
                        .collect::<anyhow::Result<Vec<_>>>()
                        .map_err(|e| tag_failure(node_id, e))?
                } else {
                    let mut acc = Vec::with_capacity(items.len());
                    for item in items {
                        acc.push(transform.call_transform(item).map_err(|e| tag_failure(node_id, e))?);
                    }
                    acc
                };
                Ok(Value::List(out))
            })
        }

        NodeKindTag::Reduce => {
            let fold = get_fn(functions, &node.params, "fold").expect("Reduce node missing fold");
            let initial = node.params.get("initial").and_then(ParamValue::as_literal).cloned();
            Arc::new(move |inputs: &[Value]| {
                let items = as_list(&inputs[0], node_id)?;
                let mut iter = items.iter();
                let mut acc = match (&initial, use_builtins) {
                    (Some(init), _) => init.clone(),
                    (None, _) => iter.next().cloned().ok_or(RuntimeError::EmptyReduce)?,
                };
                for item in iter {
                    acc = fold.call_binary(&acc, item).map_err(|e| tag_failure(node_id, e))?;
                }
                Ok(acc)
            })
        }

        NodeKindTag::Sort => {
            let key = get_fn(functions, &node.params, "key");
            let reverse = matches!(
                node.params.get("reverse").and_then(ParamValue::as_literal),
                Some(Value::Bool(true))
            );
            Arc::new(move |inputs: &[Value]| {
                let items = as_list(&inputs[0], node_id)?;
                let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
                for item in items {
                    let k = match &key {
                        Some(kf) => kf.call_key(item).map_err(|e| tag_failure(node_id, e))?,
                        None => item.clone(),
                    };
                    keyed.push((k, item.clone()));
                }
                // sort_by is a stable sort regardless of which idiom picks it.
                keyed.sort_by(|(ka, _), (kb, _)| {
                    let ord = compare_values(ka, kb);
                    if reverse {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
                Ok(Value::List(keyed.into_iter().map(|(_, v)| v).collect()))
            })
        }

        NodeKindTag::GroupBy => {
            let key = get_fn(functions, &node.params, "key").expect("GroupBy node missing key");
            Arc::new(move |inputs: &[Value]| {
                let items = as_list(&inputs[0], node_id)?;
                // Preserve first-appearance order of keys and of members within
                // each group (SPEC_FULL.md §4.3).
                let mut order: Vec<Value> = Vec::new();
                let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
                for item in items {
                    let k = key.call_key(item).map_err(|e| tag_failure(node_id, e))?;
                    if let Some(pos) = order.iter().position(|existing| existing == &k) {
                        groups[pos].1.push(item.clone());
                    } else {
                        order.push(k.clone());
                        groups.push((k, vec![item.clone()]));
                    }
                }
                let pairs = groups
                    .into_iter()
                    .map(|(k, members)| Value::List(vec![k, Value::List(members)]))
                    .collect();
                Ok(Value::List(pairs))
            })
        }

        NodeKindTag::Join => {
            let predicate =
                get_fn(functions, &node.params, "predicate").expect("Join node missing predicate");
            Arc::new(move |inputs: &[Value]| {
                let left = as_list(&inputs[0], node_id)?;
                let right = as_list(&inputs[1], node_id)?;
                let mut out = Vec::new();
                for l in left {
                    for r in right {
                        if predicate.call_join_predicate(l, r).map_err(|e| tag_failure(node_id, e))? {
                            out.push(Value::List(vec![l.clone(), r.clone()]));
                        }
                    }
                }
                Ok(Value::List(out))
            })
        }

        NodeKindTag::Flatten => Arc::new(move |inputs: &[Value]| {
            let items = as_list(&inputs[0], node_id)?;
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::List(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }),

        NodeKindTag::Distinct => Arc::new(move |inputs: &[Value]| {
            let items = as_list(&inputs[0], node_id)?;
            let mut seen: Vec<Value> = Vec::new();
            let mut out = Vec::new();
            for item in items {
                if !seen.contains(item) {
                    seen.push(item.clone());
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }),

        NodeKindTag::Assert => {
            let predicate =
                get_fn(functions, &node.params, "predicate").expect("Assert node missing predicate");
            let message = match node.params.get("message").and_then(ParamValue::as_literal) {
                Some(Value::Str(s)) => s.clone(),
                _ => String::new(),
            };
            Arc::new(move |inputs: &[Value]| {
                let value = &inputs[0];
                if predicate.call_predicate(value).map_err(|e| tag_failure(node_id, e))? {
                    Ok(value.clone())
                } else {
                    Err(RuntimeError::AssertionViolation {
                        message: message.clone(),
                    })
                }
            })
        }

        NodeKindTag::Input | NodeKindTag::Constant => {
            unreachable!("Input/Constant are lowered directly, never through a Strategy")
        }
    }
}
