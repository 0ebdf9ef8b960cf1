//! The solver kernel: size propagation, strategy selection, and lowering
//! to an executable [`Plan`] (`SPEC_FULL.md` §4.5).
//!
//! Size estimates feed the profiler lookup and nothing else — they are a
//! heuristic for picking a strategy, never a correctness requirement, so a
//! wildly wrong estimate only costs performance, never produces a wrong
//! answer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CompileError, RuntimeError};
use crate::ir::{Graph, MetadataValue, NodeId, NodeKindTag};
use crate::profiler::{bucket, Profiler};
use crate::strategies::{Action, NaiveStrategy, OptimizedStrategy, Strategy, VectorizedStrategy};
use crate::value::{ParamValue, Value};
use parking_lot::Mutex;

/// How the solver weighs strategy choices (`SPEC_FULL.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// Query the profiler for every capable strategy and take the minimum
    /// estimated cost.
    Speed,
    /// Always prefer [`NaiveStrategy`] when it can handle the kind.
    Memory,
    /// Fixed preference: `optimized`, falling back to `naive`.
    Balanced,
}

/// Assumed size of an `Input` node with no `size_hint` metadata
/// (`SPEC_FULL.md` §4.5).
const DEFAULT_INPUT_SIZE: usize = 1000;

/// Kind-specific output-size estimate from input size(s). A heuristic, not
/// a guarantee — `Reduce` always collapses to one value regardless of
/// input size; `GroupBy`'s estimate caps at 100 distinct keys.
fn propagate_size(kind: NodeKindTag, node_size_hint: Option<i64>, input_sizes: &[usize]) -> usize {
    match kind {
        NodeKindTag::Input => node_size_hint
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_INPUT_SIZE),
        NodeKindTag::Constant | NodeKindTag::Reduce => 1,
        NodeKindTag::Filter | NodeKindTag::Distinct => input_sizes[0].div_ceil(2),
        NodeKindTag::Map | NodeKindTag::Sort | NodeKindTag::Assert => input_sizes[0],
        NodeKindTag::Flatten => input_sizes[0] * 2,
        NodeKindTag::GroupBy => (input_sizes[0] / 10).clamp(1, 100),
        NodeKindTag::Join => input_sizes[0] * input_sizes[1],
    }
}

/// A single compiled step: how to produce one node's value given its
/// already-computed inputs.
enum StepBody {
    Input { name: String },
    Constant { value: Value },
    Computed { action: Action, strategy_name: String, kind: NodeKindTag },
}

struct Step {
    id: NodeId,
    inputs: Vec<NodeId>,
    body: StepBody,
}

/// The result of running a [`Plan`]: one value per declared output, in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutput {
    Single(Value),
    Multiple(Vec<Value>),
}

impl PlanOutput {
    /// The first (or only) output value, for callers that know the plan
    /// declares exactly one.
    #[must_use]
    pub fn first(&self) -> &Value {
        match self {
            PlanOutput::Single(v) => v,
            PlanOutput::Multiple(vs) => &vs[0],
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            PlanOutput::Single(v) => vec![v],
            PlanOutput::Multiple(vs) => vs,
        }
    }
}

/// A lowered, directly-executable graph (`SPEC_FULL.md` §4.5): one step
/// per topological-order node, plus the final gather of declared outputs.
pub struct Plan {
    steps: Vec<Step>,
    outputs: Vec<NodeId>,
    profiler: Arc<Profiler>,
    profiling_enabled: bool,
    source_graph: Graph,
}

impl Plan {
    /// The graph this plan was lowered from, for the debugger collaborator
    /// (`SPEC_FULL.md` §6).
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.source_graph
    }

    /// The lowered action sequence, one entry per step in execution order,
    /// for external debugger/explain tooling (`SPEC_FULL.md` §6).
    #[must_use]
    pub fn action_sequence(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| match &step.body {
                StepBody::Input { name } => format!("{} <- input({name})", step.id),
                StepBody::Constant { value } => format!("{} <- constant({value:?})", step.id),
                StepBody::Computed { strategy_name, kind, .. } => {
                    format!("{} <- {}[{strategy_name}]", step.id, kind.name())
                }
            })
            .collect()
    }

    /// The cost-model profiler this plan reads from and (when profiling is
    /// enabled) records into. The benchmark-driver collaborator calls
    /// `plan.profiler().save(path)` explicitly after running a plan many
    /// times (`SPEC_FULL.md` §6) — a plan never saves on its own.
    #[must_use]
    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    /// Convenience wrapper around `self.profiler().save(path)`.
    pub fn save_profile(&self, path: impl AsRef<Path>) {
        self.profiler.save(path);
    }

    /// Execute the plan against `inputs` (keyed by `Input` node name).
    /// When profiling is enabled, each computed step's wall-clock time
    /// feeds back into the profiler under its `(kind, strategy, bucket)`.
    pub fn run(&self, inputs: &HashMap<String, Value>) -> Result<PlanOutput, RuntimeError> {
        let mut values: HashMap<NodeId, Value> = HashMap::with_capacity(self.steps.len());

        for step in &self.steps {
            let args: Vec<Value> = step
                .inputs
                .iter()
                .map(|id| values.get(id).cloned().expect("topological order guarantees inputs are computed"))
                .collect();

            let result = match &step.body {
                StepBody::Input { name } => inputs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::MissingInput(name.clone()))?,
                StepBody::Constant { value } => value.clone(),
                StepBody::Computed { action, strategy_name, kind } => {
                    if self.profiling_enabled {
                        let n = args.first().and_then(Value::as_list).map_or(1, <[Value]>::len);
                        let start = Instant::now();
                        let out = action(&args)?;
                        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                        self.profiler.record(*kind, strategy_name, n, elapsed_ms);
                        out
                    } else {
                        action(&args)?
                    }
                }
            };
            values.insert(step.id, result);
        }

        let mut out: Vec<Value> = self
            .outputs
            .iter()
            .map(|id| values.get(id).cloned().expect("output node must have been computed"))
            .collect();

        if out.len() == 1 {
            Ok(PlanOutput::Single(out.pop().expect("len checked above")))
        } else {
            Ok(PlanOutput::Multiple(out))
        }
    }
}

/// Compiles graphs into [`Plan`]s: propagates sizes, picks a strategy per
/// node under a decision cache, and lowers to executable actions
/// (`SPEC_FULL.md` §4.5).
pub struct SolverKernel {
    strategies: Vec<Box<dyn Strategy>>,
    profiler: Arc<Profiler>,
    profiling_enabled: bool,
    decision_cache: Mutex<HashMap<(NodeId, usize, OptimizationMode), String>>,
}

impl SolverKernel {
    #[must_use]
    pub fn new(profiler: Arc<Profiler>, profiling_enabled: bool) -> Self {
        SolverKernel {
            strategies: vec![Box::new(OptimizedStrategy), Box::new(NaiveStrategy), Box::new(VectorizedStrategy)],
            profiler,
            profiling_enabled,
            decision_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a kernel with an explicit strategy set, for tests that need
    /// to exercise an incomplete registry (e.g. [`CompileError::UnsupportedKind`]).
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>, profiler: Arc<Profiler>, profiling_enabled: bool) -> Self {
        SolverKernel {
            strategies,
            profiler,
            profiling_enabled,
            decision_cache: Mutex::new(HashMap::new()),
        }
    }

    fn select_strategy_name(
        &self,
        id: NodeId,
        kind: NodeKindTag,
        n: usize,
        mode: OptimizationMode,
    ) -> Result<String, CompileError> {
        let key = (id, bucket(n), mode);
        if let Some(name) = self.decision_cache.lock().get(&key) {
            return Ok(name.clone());
        }

        let capable: Vec<&Box<dyn Strategy>> = self.strategies.iter().filter(|s| s.can_handle(kind)).collect();
        if capable.is_empty() {
            return Err(CompileError::UnsupportedKind { node: id, kind: kind.name() });
        }

        let chosen: &Box<dyn Strategy> = match mode {
            OptimizationMode::Memory => capable
                .iter()
                .find(|s| s.name() == "naive")
                .copied()
                .unwrap_or(capable[0]),
            OptimizationMode::Balanced => capable
                .iter()
                .find(|s| s.name() == "optimized")
                .or_else(|| capable.iter().find(|s| s.name() == "naive"))
                .copied()
                .unwrap_or(capable[0]),
            OptimizationMode::Speed => *capable
                .iter()
                .min_by(|a, b| {
                    let ca = self.profiler.estimate(kind, a.name(), n);
                    let cb = self.profiler.estimate(kind, b.name(), n);
                    ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("capable is nonempty, checked above"),
        };

        let name = chosen.name().to_string();
        self.decision_cache.lock().insert(key, name.clone());
        Ok(name)
    }

    /// Compile `graph` into a [`Plan`] under `mode`. `hints` overrides the
    /// propagated size estimate for any node id present in it — an
    /// externally-supplied cardinality (e.g. from a prior run's actual
    /// counts) takes precedence over both per-node `size_hint` metadata and
    /// the kind-specific heuristic (`SPEC_FULL.md` §4.5). Fails with
    /// [`CompileError::MissingOutput`] if the graph has no declared
    /// outputs, or [`CompileError::UnsupportedKind`] if some node's kind
    /// has no capable strategy.
    pub fn compile(&self, graph: &Graph, mode: OptimizationMode, hints: &HashMap<NodeId, usize>) -> Result<Plan, CompileError> {
        if graph.outputs().is_empty() {
            return Err(CompileError::MissingOutput);
        }

        let order = graph.topological_order();
        let mut sizes: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        let mut steps = Vec::with_capacity(order.len());

        for id in order {
            let node = graph.node(id).expect("topological_order only yields existing nodes");
            let input_sizes: Vec<usize> = node.inputs.iter().map(|i| sizes[i]).collect();
            let size = match hints.get(&id) {
                Some(&hinted) => hinted,
                None => {
                    let size_hint = node
                        .metadata
                        .get("size_hint")
                        .and_then(|m| if let MetadataValue::Int(n) = m { Some(*n) } else { None });
                    propagate_size(node.kind, size_hint, &input_sizes)
                }
            };
            sizes.insert(id, size);

            let body = match node.kind {
                NodeKindTag::Input => {
                    let name = match node.params.get("name").and_then(ParamValue::as_literal) {
                        Some(Value::Str(s)) => s.clone(),
                        _ => String::new(),
                    };
                    StepBody::Input { name }
                }
                NodeKindTag::Constant => {
                    let value = node
                        .params
                        .get("value")
                        .and_then(ParamValue::as_literal)
                        .cloned()
                        .unwrap_or(Value::Bool(false));
                    StepBody::Constant { value }
                }
                kind => {
                    let strategy_name = self.select_strategy_name(id, kind, size, mode)?;
                    let strategy = self
                        .strategies
                        .iter()
                        .find(|s| s.name() == strategy_name)
                        .expect("strategy name came from this kernel's own registry");
                    let action = strategy.emit(node, graph.functions(), id);
                    StepBody::Computed { action, strategy_name, kind }
                }
            };

            steps.push(Step { id, inputs: node.inputs.clone(), body });
        }

        Ok(Plan {
            steps,
            outputs: graph.outputs().to_vec(),
            profiler: Arc::clone(&self.profiler),
            profiling_enabled: self.profiling_enabled,
            source_graph: graph.clone(),
        })
    }
}
