//! The rewriting optimizer: a fixed pipeline of idempotent structural
//! passes over a [`Graph`] (`SPEC_FULL.md` §4.6).
//!
//! Every pass only ever rewrites `inputs`/`outputs` edges and inserts or
//! removes nodes; none of them touch a node's own `params` in place
//! (fusion synthesizes a brand new node instead). This keeps each pass
//! easy to reason about in isolation and safe to call twice.

use std::collections::HashMap;

use crate::error::CompileError;
use crate::ir::{Graph, Node, NodeId, NodeKindTag};
use crate::provenance::ProvenanceSink;
use crate::testing::probe_sequences;
use crate::value::{ParamValue, UserFunction, Value};

/// The five passes, in their fixed default order (`SPEC_FULL.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassName {
    Dce,
    Cse,
    FilterFusion,
    MapFusion,
    FilterBeforeMap,
}

impl PassName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PassName::Dce => "dce",
            PassName::Cse => "cse",
            PassName::FilterFusion => "filter_fusion",
            PassName::MapFusion => "map_fusion",
            PassName::FilterBeforeMap => "filter_before_map",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "dce" => Some(PassName::Dce),
            "cse" => Some(PassName::Cse),
            "filter_fusion" => Some(PassName::FilterFusion),
            "map_fusion" => Some(PassName::MapFusion),
            "filter_before_map" => Some(PassName::FilterBeforeMap),
            _ => None,
        }
    }
}

/// The default pipeline: DCE, CSE, filter fusion, map fusion, then the
/// filter-before-map reorder (`SPEC_FULL.md` §4.6).
pub const DEFAULT_PASSES: &[PassName] = &[
    PassName::Dce,
    PassName::Cse,
    PassName::FilterFusion,
    PassName::MapFusion,
    PassName::FilterBeforeMap,
];

/// The rewriting optimizer. Stateless — each call to [`Self::run`] owns its
/// graph for the duration of the pipeline.
#[derive(Default)]
pub struct Optimizer;

impl Optimizer {
    #[must_use]
    pub fn new() -> Self {
        Optimizer
    }

    /// Run `passes` (or [`DEFAULT_PASSES`] if `None`) over `graph` in order.
    /// An unrecognized name in a caller-supplied list fails the whole call
    /// with [`CompileError::UnknownPass`] before any pass runs.
    pub fn run(
        &self,
        mut graph: Graph,
        passes: Option<&[&str]>,
        mut provenance: Option<&mut dyn ProvenanceSink>,
    ) -> Result<Graph, CompileError> {
        let resolved: Vec<PassName> = match passes {
            None => DEFAULT_PASSES.to_vec(),
            Some(names) => names
                .iter()
                .map(|n| PassName::parse(n).ok_or_else(|| CompileError::UnknownPass((*n).to_string())))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for pass in resolved {
            match pass {
                PassName::Dce => dce(&mut graph),
                PassName::Cse => cse(&mut graph, provenance.as_deref_mut()),
                PassName::FilterFusion => {
                    fuse_unary_chain(&mut graph, NodeKindTag::Filter, provenance.as_deref_mut());
                }
                PassName::MapFusion => {
                    fuse_unary_chain(&mut graph, NodeKindTag::Map, provenance.as_deref_mut());
                }
                PassName::FilterBeforeMap => filter_before_map(&mut graph, provenance.as_deref_mut()),
            }
            // DCE is safe and cheap to re-run after any pass that may have
            // orphaned a node; it's a no-op when nothing changed.
            dce(&mut graph);
        }

        Ok(graph)
    }
}

/// Count how many places reference `id`: other nodes' `inputs`, plus graph
/// outputs. Used by filter-before-map's single-consumer precondition.
fn consumer_count(graph: &Graph, id: NodeId) -> usize {
    let from_nodes: usize = graph
        .nodes
        .values()
        .map(|n| n.inputs.iter().filter(|&&i| i == id).count())
        .sum();
    let from_outputs = graph.outputs.iter().filter(|&&o| o == id).count();
    from_nodes + from_outputs
}

/// Replace every occurrence of `from` with `to` across all node inputs and
/// graph outputs (never touches `from`/`to` themselves as node entries).
fn redirect(graph: &mut Graph, from: NodeId, to: NodeId) {
    for node in graph.nodes.values_mut() {
        for input in &mut node.inputs {
            if *input == from {
                *input = to;
            }
        }
    }
    for out in &mut graph.outputs {
        if *out == from {
            *out = to;
        }
    }
}

/// Dead-code elimination: drop every node unreachable from `outputs`
/// (`SPEC_FULL.md` §4.6.1). Idempotent: the second call finds nothing to
/// drop.
fn dce(graph: &mut Graph) {
    let reachable = graph.reachable_from_outputs();
    let dead: Vec<NodeId> = graph
        .nodes
        .keys()
        .copied()
        .filter(|id| !reachable.contains(id))
        .collect();
    for id in dead {
        graph.remove_node(id);
    }
}

/// Common-subexpression elimination (`SPEC_FULL.md` §4.6.2). Processes
/// nodes bottom-up so a chain of duplicate subtrees collapses in one pass:
/// each node's `inputs` are compared only after its own inputs have
/// already been canonicalized.
fn cse(graph: &mut Graph, mut provenance: Option<&mut dyn ProvenanceSink>) {
    let order = graph.topological_order();
    // interim representative per id, not yet minimized to the smallest id
    // in its class -- that happens in the finalization pass below.
    let mut interim_redirect: HashMap<NodeId, NodeId> = HashMap::new();
    let mut groups: Vec<Vec<NodeId>> = Vec::new();

    for id in order {
        let node = match graph.node(id) {
            Some(n) => n.clone(),
            None => continue,
        };
        let resolved_inputs: Vec<NodeId> = node
            .inputs
            .iter()
            .map(|i| interim_redirect.get(i).copied().unwrap_or(*i))
            .collect();

        // `is_cse_equivalent` already handles the Constant case correctly:
        // both sides have empty `inputs`, so the comparison reduces to
        // deep-equality of the literal `value` param.
        let candidate = Node {
            inputs: resolved_inputs.clone(),
            ..node.clone()
        };
        let mut matched_group: Option<usize> = None;
        for (gi, members) in groups.iter().enumerate() {
            let rep_id = members[0];
            let rep = graph.node(rep_id).expect("group representative must still exist");
            if rep.is_cse_equivalent(&candidate) {
                matched_group = Some(gi);
                break;
            }
        }

        match matched_group {
            Some(gi) => {
                let rep_id = groups[gi][0];
                interim_redirect.insert(id, rep_id);
                groups[gi].push(id);
            }
            None => {
                // Register this node under its canonicalized inputs so
                // later comparisons see the same resolved edges it was
                // matched against.
                if let Some(n) = graph.nodes.get_mut(&id) {
                    n.inputs = resolved_inputs;
                }
                groups.push(vec![id]);
            }
        }
    }

    let mut final_redirect: HashMap<NodeId, NodeId> = HashMap::new();
    for members in &groups {
        if members.len() < 2 {
            continue;
        }
        let canonical = *members.iter().min().expect("nonempty group");
        for &member in members {
            if member != canonical {
                final_redirect.insert(member, canonical);
            }
        }
        if let Some(sink) = provenance.as_deref_mut() {
            sink.track_transformation(canonical, "cse", members, "merged duplicate nodes");
        }
    }

    for (&dup, &canonical) in &final_redirect {
        redirect(graph, dup, canonical);
        graph.remove_node(dup);
    }
}

/// Fuse consecutive nodes of the same unary `kind` (`SPEC_FULL.md` §4.6.3,
/// §4.6.4): `Filter(p2, Filter(p1, x))` becomes a single `Filter` applying
/// `p1` then `p2`; `Map(f2, Map(f1, x))` becomes a single `Map` applying
/// `f1` then `f2`. Works for `Filter` and `Map` alike since both are
/// single-input, single-parameter node kinds whose composition is
/// expressible as "run the inner function, then the outer one".
fn fuse_unary_chain(graph: &mut Graph, kind: NodeKindTag, mut provenance: Option<&mut dyn ProvenanceSink>) {
    let order = graph.topological_order();
    for outer_id in order {
        loop {
            let outer = match graph.node(outer_id) {
                Some(n) if n.kind == kind => n.clone(),
                _ => break,
            };
            let inner_id = outer.inputs[0];
            let inner = match graph.node(inner_id) {
                Some(n) if n.kind == kind => n.clone(),
                _ => break,
            };

            let fused_id = graph.fresh_id();
            let fused_node = match kind {
                NodeKindTag::Filter => {
                    let p1 = get_predicate(graph, &inner);
                    let p2 = get_predicate(graph, &outer);
                    let composed: crate::value::PredicateFn = std::sync::Arc::new(move |v| {
                        Ok(p1.call_predicate(v)? && p2.call_predicate(v)?)
                    });
                    let handle = graph.functions.register(UserFunction::Predicate(composed));
                    let mut params = HashMap::new();
                    params.insert("predicate".to_string(), ParamValue::Function(handle));
                    Node {
                        id: fused_id,
                        kind: NodeKindTag::Filter,
                        inputs: vec![inner.inputs[0]],
                        params,
                        output_type: outer.output_type.clone(),
                        metadata: HashMap::new(),
                    }
                }
                NodeKindTag::Map => {
                    let f1 = get_transform(graph, &inner);
                    let f2 = get_transform(graph, &outer);
                    let composed: crate::value::TransformFn =
                        std::sync::Arc::new(move |v| f2.call_transform(&f1.call_transform(v)?));
                    let handle = graph.functions.register(UserFunction::Transform(composed));
                    let mut params = HashMap::new();
                    params.insert("transform".to_string(), ParamValue::Function(handle));
                    Node {
                        id: fused_id,
                        kind: NodeKindTag::Map,
                        inputs: vec![inner.inputs[0]],
                        params,
                        output_type: outer.output_type.clone(),
                        metadata: HashMap::new(),
                    }
                }
                _ => unreachable!("fuse_unary_chain is only called with Filter or Map"),
            };

            graph.insert_node(fused_node);
            redirect(graph, outer_id, fused_id);
            graph.remove_node(outer_id);
            if let Some(sink) = provenance.as_deref_mut() {
                sink.track_transformation(
                    fused_id,
                    if kind == NodeKindTag::Filter { "filter_fusion" } else { "map_fusion" },
                    &[outer_id, inner_id],
                    "fused consecutive nodes of the same kind",
                );
            }
            // The fused node now occupies a fresh id appended after
            // `order`'s snapshot, so re-check from the top in case another
            // node upstream also chains into it within the same pass.
            break;
        }
    }
}

fn get_predicate(graph: &Graph, node: &Node) -> UserFunction {
    let handle = node
        .params
        .get("predicate")
        .and_then(ParamValue::as_function)
        .expect("Filter node missing predicate");
    graph.functions().get(handle).expect("dangling function handle")
}

fn get_transform(graph: &Graph, node: &Node) -> UserFunction {
    let handle = node
        .params
        .get("transform")
        .and_then(ParamValue::as_function)
        .expect("Map node missing transform");
    graph.functions().get(handle).expect("dangling function handle")
}

/// Reorder `Map` followed by `Filter` into `Filter` followed by `Map`
/// whenever doing so is observably safe (`SPEC_FULL.md` §4.6.5): the `Map`
/// must have exactly one consumer (this `Filter`), and runtime sampling
/// over [`probe_sequences`] must show the two orders agree.
fn filter_before_map(graph: &mut Graph, mut provenance: Option<&mut dyn ProvenanceSink>) {
    let order = graph.topological_order();
    for filter_id in order {
        let filter_node = match graph.node(filter_id) {
            Some(n) if n.kind == NodeKindTag::Filter => n.clone(),
            _ => continue,
        };
        let map_id = filter_node.inputs[0];
        let map_node = match graph.node(map_id) {
            Some(n) if n.kind == NodeKindTag::Map => n.clone(),
            _ => continue,
        };
        if consumer_count(graph, map_id) != 1 {
            continue;
        }

        let transform = get_transform(graph, &map_node);
        let predicate = get_predicate(graph, &filter_node);
        if !independence_holds(&transform, &predicate) {
            continue;
        }

        let grandparent = map_node.inputs[0];
        if let Some(f) = graph.nodes.get_mut(&filter_id) {
            f.inputs = vec![grandparent];
            f.output_type = graph
                .nodes
                .get(&grandparent)
                .map_or(crate::types::Type::Any, |n| n.output_type.clone());
        }
        if let Some(m) = graph.nodes.get_mut(&map_id) {
            m.inputs = vec![filter_id];
        }
        redirect_excluding(graph, filter_id, map_id, map_id);

        if let Some(sink) = provenance.as_deref_mut() {
            sink.track_transformation(
                map_id,
                "filter_before_map",
                &[filter_id, map_id],
                "swapped filter ahead of map after sampling independence",
            );
        }
    }
}

/// Like [`redirect`], but skips rewriting `from`'s own `inputs` field
/// (which the caller has already set to its new, correct value) and never
/// rewrites the edge out of `preserve_source`.
fn redirect_excluding(graph: &mut Graph, from: NodeId, to: NodeId, preserve_source: NodeId) {
    for (id, node) in graph.nodes.iter_mut() {
        if *id == preserve_source {
            continue;
        }
        for input in &mut node.inputs {
            if *input == from {
                *input = to;
            }
        }
    }
    for out in &mut graph.outputs {
        if *out == from {
            *out = to;
        }
    }
}

/// Runtime-sampled independence check (`SPEC_FULL.md` §4.6.5, §9): rather
/// than statically analyzing `f`/`p`, apply both orderings to a fixed
/// probe corpus and compare. Probes that both functions reject entirely
/// are skipped (no evidence either way); a probe where `p` raises on
/// `f(x)` but accepts `x` itself is treated as an unexpected failure-kind
/// mismatch and fails the check outright.
fn independence_holds(transform: &UserFunction, predicate: &UserFunction) -> bool {
    for seq in probe_sequences() {
        let mut order_map_then_filter = Vec::new();
        let mut saw_evidence = false;

        for x in &seq {
            let Ok(fx) = transform.call_transform(x) else {
                continue;
            };
            match predicate.call_predicate(&fx) {
                Ok(true) => {
                    order_map_then_filter.push(fx);
                    saw_evidence = true;
                }
                Ok(false) => saw_evidence = true,
                Err(_) => {
                    if predicate.call_predicate(x).is_ok() {
                        return false;
                    }
                }
            }
        }

        let mut order_filter_then_map = Vec::new();
        for x in &seq {
            match predicate.call_predicate(x) {
                Ok(true) => {
                    if let Ok(fx) = transform.call_transform(x) {
                        order_filter_then_map.push(fx);
                    }
                }
                Ok(false) | Err(_) => {}
            }
        }

        if saw_evidence && order_map_then_filter != order_filter_then_map {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::GraphBuilder;
    use crate::types::Type;
    use std::sync::Arc;

    fn list_of(values: Vec<i64>) -> Value {
        Value::List(values.into_iter().map(Value::Int).collect())
    }

    #[test]
    fn dce_drops_unreachable_nodes() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let kept = b.map(input, Arc::new(|v: &Value| Ok(v.clone()))).unwrap();
        let orphan = b.filter(input, Arc::new(|_: &Value| Ok(true))).unwrap();
        b.output(kept).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["dce"]), None).unwrap();
        assert!(optimized.node(orphan).is_none());
        assert!(optimized.node(kept).is_some());
    }

    #[test]
    fn cse_merges_identical_filters_over_the_same_input() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let fn_ref: crate::value::PredicateFn = Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0));
        let a = b.filter(input, Arc::clone(&fn_ref)).unwrap();
        // A *different* closure instance that is behaviorally identical is
        // NOT merged -- only the literally-shared `fn_ref` handle is.
        let b_id = b.filter(input, Arc::clone(&fn_ref)).unwrap();
        b.output(a).unwrap();
        b.output(b_id).unwrap();
        let graph = b.build();
        assert_ne!(graph.node(a).unwrap().params.get("predicate"), None);

        let optimized = Optimizer::new().run(graph, Some(&["cse"]), None).unwrap();
        assert_eq!(optimized.outputs()[0], optimized.outputs()[1]);
    }

    #[test]
    fn cse_merges_equal_constants_regardless_of_reference() {
        let mut b = GraphBuilder::new();
        let c1 = b.constant(Value::Int(42)).unwrap();
        let c2 = b.constant(Value::Int(42)).unwrap();
        b.output(c1).unwrap();
        b.output(c2).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["cse"]), None).unwrap();
        assert_eq!(optimized.outputs()[0], optimized.outputs()[1]);
    }

    #[test]
    fn filter_fusion_collapses_a_chain_of_three() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let f1 = b.filter(input, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0))).unwrap();
        let f2 = b.filter(f1, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) < 100))).unwrap();
        let f3 = b.filter(f2, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) % 2 == 0))).unwrap();
        b.output(f3).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["filter_fusion", "dce"]), None).unwrap();
        assert_eq!(optimized.node_count(), 2); // input + one fused filter
    }

    #[test]
    fn map_fusion_composes_in_order() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let m1 = b.map(input, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap() + 1)))).unwrap();
        let m2 = b.map(m1, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap() * 2)))).unwrap();
        b.output(m2).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["map_fusion", "dce"]), None).unwrap();
        assert_eq!(optimized.node_count(), 2);

        let fused_id = optimized.outputs()[0];
        let node = optimized.node(fused_id).unwrap();
        let f = crate::strategies::NaiveStrategy.emit(node, optimized.functions(), fused_id);
        let result = f(&[list_of(vec![1, 2, 3])]).unwrap();
        // (x + 1) * 2, not (x * 2) + 1.
        assert_eq!(result, list_of(vec![4, 6, 8]));
    }

    #[test]
    fn filter_before_map_reorders_independent_pair() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let mapped = b.map(input, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap() + 10)))).unwrap();
        let filtered = b.filter(mapped, Arc::new(|v: &Value| Ok(v.as_int().unwrap() % 2 == 0))).unwrap();
        b.output(filtered).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph.clone(), Some(&["filter_before_map"]), None).unwrap();
        // Output id now names the Map node (it became the new outer node).
        let out_id = optimized.outputs()[0];
        assert_eq!(optimized.node(out_id).unwrap().kind, NodeKindTag::Map);

        let data = [list_of(vec![1, 2, 3, 4, 5])];
        let original_plan = crate::strategies::NaiveStrategy.emit(
            graph.node(filtered).unwrap(),
            graph.functions(),
            filtered,
        );
        // Can't directly re-run the un-rewritten graph's chain here without
        // the solver; instead just check structural well-formedness: the
        // new outer Map's input is a Filter, and that Filter's input is the
        // original source.
        let new_map = optimized.node(out_id).unwrap();
        let new_filter_id = new_map.inputs[0];
        let new_filter = optimized.node(new_filter_id).unwrap();
        assert_eq!(new_filter.kind, NodeKindTag::Filter);
        assert_eq!(new_filter.inputs[0], input);
        let _ = original_plan; // silence unused-binding lint when not executed
        let _ = data;
    }

    #[test]
    fn filter_before_map_skips_when_map_has_multiple_consumers() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let mapped = b.map(input, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap() + 1)))).unwrap();
        let filtered = b.filter(mapped, Arc::new(|v: &Value| Ok(v.as_int().unwrap() > 0))).unwrap();
        b.output(filtered).unwrap();
        b.output(mapped).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["filter_before_map"]), None).unwrap();
        assert_eq!(optimized.node(filtered).unwrap().kind, NodeKindTag::Filter);
        assert_eq!(optimized.node(filtered).unwrap().inputs[0], mapped);
    }

    #[test]
    fn filter_before_map_rejects_non_independent_pair() {
        // f(x) = x * 2, p(y) = y > 10: filtering after map keeps elements
        // whose *doubled* value exceeds 10; filtering before map on the
        // original values would keep a different set, so it must not fuse.
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let mapped = b.map(input, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap() * 2)))).unwrap();
        let filtered = b.filter(mapped, Arc::new(|v: &Value| Ok(v.as_int().unwrap() > 10))).unwrap();
        b.output(filtered).unwrap();
        let graph = b.build();

        let optimized = Optimizer::new().run(graph, Some(&["filter_before_map"]), None).unwrap();
        let out = optimized.node(optimized.outputs()[0]).unwrap();
        assert_eq!(out.kind, NodeKindTag::Filter);
        assert_eq!(out.inputs[0], mapped);
    }

    #[test]
    fn unknown_pass_name_is_rejected_before_running_anything() {
        let mut b = GraphBuilder::new();
        let input = b.input("x", Type::int()).unwrap();
        b.output(input).unwrap();
        let graph = b.build();

        let err = Optimizer::new().run(graph, Some(&["not_a_real_pass"]), None).unwrap_err();
        assert!(matches!(err, CompileError::UnknownPass(name) if name == "not_a_real_pass"));
    }

    #[test]
    fn default_pipeline_is_idempotent() {
        let mut b = GraphBuilder::new();
        let input = b.input("xs", Type::list_of(Type::int())).unwrap();
        let f1 = b.filter(input, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0))).unwrap();
        let f2 = b.filter(f1, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) < 50))).unwrap();
        b.output(f2).unwrap();
        let graph = b.build();

        let once = Optimizer::new().run(graph, None, None).unwrap();
        let twice = Optimizer::new().run(once.clone(), None, None).unwrap();
        assert_eq!(once.node_count(), twice.node_count());
    }
}
