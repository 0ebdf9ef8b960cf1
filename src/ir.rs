//! The intent graph: node kinds, the graph-building facade, and the DAG
//! invariants every other module relies on (`SPEC_FULL.md` §3, §4.1).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::CompileError;
use crate::provenance::ProvenanceSink;
use crate::types::{self, Type};
use crate::value::{
    BinaryFn, FunctionRegistry, JoinPredicateFn, KeyFn, ParamValue, PredicateFn, TransformFn,
    Value,
};

/// An opaque, stable node identifier. Never reused within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The closed set of node kinds (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKindTag {
    Input,
    Constant,
    Filter,
    Map,
    Reduce,
    Sort,
    GroupBy,
    Join,
    Flatten,
    Distinct,
    Assert,
}

impl NodeKindTag {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            NodeKindTag::Input => "Input",
            NodeKindTag::Constant => "Constant",
            NodeKindTag::Filter => "Filter",
            NodeKindTag::Map => "Map",
            NodeKindTag::Reduce => "Reduce",
            NodeKindTag::Sort => "Sort",
            NodeKindTag::GroupBy => "GroupBy",
            NodeKindTag::Join => "Join",
            NodeKindTag::Flatten => "Flatten",
            NodeKindTag::Distinct => "Distinct",
            NodeKindTag::Assert => "Assert",
        }
    }

    /// Fixed arity per kind (`SPEC_FULL.md` §3).
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            NodeKindTag::Input | NodeKindTag::Constant => 0,
            NodeKindTag::Join => 2,
            _ => 1,
        }
    }
}

/// One node in the intent graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKindTag,
    pub inputs: Vec<NodeId>,
    pub params: HashMap<String, ParamValue>,
    pub output_type: Type,
    pub metadata: HashMap<String, MetadataValue>,
}

/// A metadata hint value (`parallelizable`, `vectorizable`, ...). Advisory
/// only; the core scheduler never reads these to change behavior
/// (`SPEC_FULL.md` §5).
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Node {
    fn param_eq(&self, other: &Node) -> bool {
        if self.params.len() != other.params.len() {
            return false;
        }
        self.params
            .iter()
            .all(|(k, v)| other.params.get(k).is_some_and(|ov| ov == v))
    }

    /// Equivalence-candidate comparison for CSE (`SPEC_FULL.md` §4.6.2):
    /// same kind, same ordered inputs, same parameters (with the
    /// reference-identity rule for callables already encoded in
    /// `ParamValue`'s `PartialEq`). `Constant` nodes are additionally
    /// equivalent whenever their literal values are equal, regardless of
    /// id — that case is handled by the caller since it doesn't need the
    /// `inputs` comparison at all.
    #[must_use]
    pub fn is_cse_equivalent(&self, other: &Node) -> bool {
        self.kind == other.kind && self.inputs == other.inputs && self.param_eq(other)
    }
}

/// The intent graph: nodes plus an ordered list of output ids.
///
/// Exclusively owns its nodes; everything outside this module holds
/// [`NodeId`]s, never direct node references (`SPEC_FULL.md` §3).
#[derive(Clone)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) next_id: u64,
    pub(crate) functions: Arc<FunctionRegistry>,
}

impl Graph {
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    /// DFS-postorder topological order from `outputs`: every node's inputs
    /// precede it. Nodes unreachable from any output are excluded from the
    /// order but remain in the node map until DCE (`SPEC_FULL.md` §4.1).
    #[must_use]
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::with_capacity(self.nodes.len());

        fn visit(
            graph: &Graph,
            id: NodeId,
            visited: &mut HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if !visited.insert(id) {
                return;
            }
            if let Some(node) = graph.nodes.get(&id) {
                for &input in &node.inputs {
                    visit(graph, input, visited, order);
                }
            }
            order.push(id);
        }

        for &out in &self.outputs {
            visit(self, out, &mut visited, &mut order);
        }
        order
    }

    /// Reverse reachability from `outputs`: every node on some path from an
    /// output. Shared by DCE and by `subgraph`'s validity check.
    #[must_use]
    pub(crate) fn reachable_from_outputs(&self) -> HashSet<NodeId> {
        self.topological_order().into_iter().collect()
    }

    /// Project the node map onto a prefix of [`Self::topological_order`]
    /// that includes all transitive inputs of its last node — the
    /// operation the debugger collaborator needs to compile partial
    /// graphs (`SPEC_FULL.md` §6).
    #[must_use]
    pub fn subgraph(&self, prefix: &[NodeId]) -> Graph {
        let keep: HashSet<NodeId> = prefix.iter().copied().collect();
        let nodes = self
            .nodes
            .iter()
            .filter(|(id, _)| keep.contains(id))
            .map(|(id, node)| (*id, node.clone()))
            .collect();
        let outputs = prefix.last().copied().into_iter().collect();
        Graph {
            nodes,
            outputs,
            next_id: self.next_id,
            functions: Arc::clone(&self.functions),
        }
    }

    /// A human-readable tree dump of every output, for external debugger /
    /// CLI use (`SPEC_FULL.md` §4.1, §6).
    #[must_use]
    pub fn explain(&self, verbose: bool) -> String {
        let mut out = String::new();
        for &root in &self.outputs {
            self.explain_node(root, 0, verbose, &mut out);
        }
        out
    }

    fn explain_node(&self, id: NodeId, indent: usize, verbose: bool, out: &mut String) {
        let pad = "  ".repeat(indent);
        match self.nodes.get(&id) {
            Some(node) => {
                out.push_str(&format!("{pad}{} [{}]\n", node.kind.name(), id));
                if verbose {
                    out.push_str(&format!("{pad}  type: {:?}\n", node.output_type));
                    if !node.metadata.is_empty() {
                        out.push_str(&format!("{pad}  metadata: {:?}\n", node.metadata));
                    }
                }
                for &input in &node.inputs {
                    self.explain_node(input, indent + 1, verbose, out);
                }
            }
            None => out.push_str(&format!("{pad}<dangling {id}>\n")),
        }
    }

    /// Alias for [`Self::explain`] with `verbose = false`, used by external
    /// visualization front-ends (`SPEC_FULL.md` §6).
    #[must_use]
    pub fn visualize(&self) -> String {
        self.explain(false)
    }

    /// Run `passes` (or the default pipeline if `None`) and return the
    /// rewritten graph, leaving `self` untouched (`SPEC_FULL.md` §6).
    pub fn optimize(&self, passes: Option<&[crate::optimizer::PassName]>) -> Result<Graph, CompileError> {
        let names: Option<Vec<&str>> = passes.map(|ps| ps.iter().map(|p| p.as_str()).collect());
        crate::optimizer::Optimizer::new().run(self.clone(), names.as_deref(), None)
    }

    /// Optimize (unless `auto_optimize` is `false`) and lower to a [`Plan`]
    /// under `mode`, loading the on-disk cost-model profile from the
    /// default path. `save_profile` enables the resulting plan's own
    /// recording of fresh samples into that profiler — persisting them back
    /// to disk is always an explicit follow-up call, never implicit
    /// (`SPEC_FULL.md` §6, §7).
    ///
    /// [`Plan`]: crate::solver::Plan
    pub fn compile(
        &self,
        mode: crate::solver::OptimizationMode,
        auto_optimize: bool,
        save_profile: bool,
    ) -> Result<crate::solver::Plan, CompileError> {
        let working = if auto_optimize { self.optimize(None)? } else { self.clone() };
        let profiler = Arc::new(crate::profiler::Profiler::load(crate::profiler::default_profile_path(None)));
        let kernel = crate::solver::SolverKernel::new(profiler, save_profile);
        kernel.compile(&working, mode, &HashMap::new())
    }
}

/// Per-kind arity/param validation plus [`NodeId`] allocation — the
/// "graph building facade" of `SPEC_FULL.md` §4.1.
pub struct GraphBuilder {
    graph: Graph,
    provenance: Option<Rc<RefCell<dyn ProvenanceSink>>>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        GraphBuilder {
            graph: Graph {
                nodes: HashMap::new(),
                outputs: Vec::new(),
                next_id: 0,
                functions: Arc::new(FunctionRegistry::new()),
            },
            provenance: None,
        }
    }

    /// Attach a provenance sink: every node constructed from here on calls
    /// `track_created` on it (`SPEC_FULL.md` §6). Held as a shared handle
    /// rather than a per-call borrow so callers can keep reading it (e.g.
    /// a `RecordingProvenance`) after the builder is consumed by [`Self::build`].
    #[must_use]
    pub fn with_provenance(mut self, sink: Rc<RefCell<dyn ProvenanceSink>>) -> Self {
        self.provenance = Some(sink);
        self
    }

    fn check_inputs(&self, inputs: &[NodeId]) -> Result<(), CompileError> {
        for &input in inputs {
            if !self.graph.nodes.contains_key(&input) {
                // referrer is not yet known (node doesn't exist until after this
                // check), so we report the about-to-be-created edge's target.
                return Err(CompileError::InvalidReference {
                    referrer: NodeId(self.graph.next_id),
                    target: input,
                });
            }
        }
        Ok(())
    }

    fn check_arity(kind: NodeKindTag, inputs: &[NodeId]) -> Result<(), CompileError> {
        let expected = kind.arity();
        if inputs.len() != expected {
            return Err(CompileError::InvalidArity {
                kind: kind.name(),
                expected,
                actual: inputs.len(),
            });
        }
        Ok(())
    }

    fn push_node(
        &mut self,
        kind: NodeKindTag,
        inputs: Vec<NodeId>,
        params: HashMap<String, ParamValue>,
        output_type: Type,
    ) -> Result<NodeId, CompileError> {
        Self::check_arity(kind, &inputs)?;
        self.check_inputs(&inputs)?;
        let id = self.graph.fresh_id();
        self.graph.insert_node(Node {
            id,
            kind,
            inputs,
            params,
            output_type,
            metadata: HashMap::new(),
        });
        if let Some(sink) = &self.provenance {
            sink.borrow_mut().track_created(id, None);
        }
        Ok(id)
    }

    pub fn input(&mut self, name: impl Into<String>, output_type: Type) -> Result<NodeId, CompileError> {
        let mut params = HashMap::new();
        params.insert("name".to_string(), ParamValue::Literal(Value::Str(name.into())));
        self.push_node(NodeKindTag::Input, vec![], params, output_type)
    }

    pub fn constant(&mut self, value: Value) -> Result<NodeId, CompileError> {
        let output_type = types::infer(&value);
        let mut params = HashMap::new();
        params.insert("value".to_string(), ParamValue::Literal(value));
        self.push_node(NodeKindTag::Constant, vec![], params, output_type)
    }

    pub fn filter(&mut self, input: NodeId, predicate: PredicateFn) -> Result<NodeId, CompileError> {
        let output_type = self.graph.node(input).map_or(Type::Any, |n| n.output_type.clone());
        let handle = self.graph.functions.register(crate::value::UserFunction::Predicate(predicate));
        let mut params = HashMap::new();
        params.insert("predicate".to_string(), ParamValue::Function(handle));
        self.push_node(NodeKindTag::Filter, vec![input], params, output_type)
    }

    pub fn map(&mut self, input: NodeId, transform: TransformFn) -> Result<NodeId, CompileError> {
        let handle = self.graph.functions.register(crate::value::UserFunction::Transform(transform));
        let mut params = HashMap::new();
        params.insert("transform".to_string(), ParamValue::Function(handle));
        // Element types of Map are conservatively Any (SPEC_FULL.md §3).
        self.push_node(NodeKindTag::Map, vec![input], params, Type::Any)
    }

    pub fn reduce(
        &mut self,
        input: NodeId,
        fold: BinaryFn,
        initial: Option<Value>,
    ) -> Result<NodeId, CompileError> {
        let handle = self.graph.functions.register(crate::value::UserFunction::Binary(fold));
        let mut params = HashMap::new();
        params.insert("fold".to_string(), ParamValue::Function(handle));
        if let Some(init) = initial {
            params.insert("initial".to_string(), ParamValue::Literal(init));
        }
        self.push_node(NodeKindTag::Reduce, vec![input], params, Type::Any)
    }

    pub fn sort(
        &mut self,
        input: NodeId,
        key: Option<KeyFn>,
        reverse: bool,
    ) -> Result<NodeId, CompileError> {
        let output_type = self.graph.node(input).map_or(Type::Any, |n| n.output_type.clone());
        let mut params = HashMap::new();
        if let Some(key) = key {
            let handle = self.graph.functions.register(crate::value::UserFunction::Key(key));
            params.insert("key".to_string(), ParamValue::Function(handle));
        }
        params.insert("reverse".to_string(), ParamValue::Literal(Value::Bool(reverse)));
        self.push_node(NodeKindTag::Sort, vec![input], params, output_type)
    }

    pub fn group_by(&mut self, input: NodeId, key: KeyFn) -> Result<NodeId, CompileError> {
        let handle = self.graph.functions.register(crate::value::UserFunction::Key(key));
        let mut params = HashMap::new();
        params.insert("key".to_string(), ParamValue::Function(handle));
        self.push_node(NodeKindTag::GroupBy, vec![input], params, Type::Any)
    }

    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        predicate: JoinPredicateFn,
    ) -> Result<NodeId, CompileError> {
        let handle = self
            .graph
            .functions
            .register(crate::value::UserFunction::JoinPredicate(predicate));
        let mut params = HashMap::new();
        params.insert("predicate".to_string(), ParamValue::Function(handle));
        self.push_node(NodeKindTag::Join, vec![left, right], params, Type::Any)
    }

    pub fn flatten(&mut self, input: NodeId) -> Result<NodeId, CompileError> {
        self.push_node(NodeKindTag::Flatten, vec![input], HashMap::new(), Type::Any)
    }

    pub fn distinct(&mut self, input: NodeId) -> Result<NodeId, CompileError> {
        // Filter, Sort, Distinct, Assert preserve their input's type (SPEC_FULL.md §3).
        let output_type = self.graph.node(input).map_or(Type::Any, |n| n.output_type.clone());
        self.push_node(NodeKindTag::Distinct, vec![input], HashMap::new(), output_type)
    }

    pub fn assert(
        &mut self,
        input: NodeId,
        predicate: PredicateFn,
        message: impl Into<String>,
    ) -> Result<NodeId, CompileError> {
        let output_type = self.graph.node(input).map_or(Type::Any, |n| n.output_type.clone());
        let handle = self.graph.functions.register(crate::value::UserFunction::Predicate(predicate));
        let mut params = HashMap::new();
        params.insert("predicate".to_string(), ParamValue::Function(handle));
        params.insert("message".to_string(), ParamValue::Literal(Value::Str(message.into())));
        self.push_node(NodeKindTag::Assert, vec![input], params, output_type)
    }

    /// Declare `id` as (one of) the graph's outputs.
    pub fn output(&mut self, id: NodeId) -> Result<(), CompileError> {
        if !self.graph.nodes.contains_key(&id) {
            return Err(CompileError::InvalidReference {
                referrer: id,
                target: id,
            });
        }
        self.graph.outputs.push(id);
        Ok(())
    }

    /// Freeze the builder into a [`Graph`]. Does not itself enforce
    /// "outputs nonempty" — that invariant is checked at
    /// [`crate::solver::SolverKernel::compile`] time, matching the
    /// build-then-freeze-then-execute lifecycle (`SPEC_FULL.md` §3).
    #[must_use]
    pub fn build(self) -> Graph {
        self.graph
    }
}
