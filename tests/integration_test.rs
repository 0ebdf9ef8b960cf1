//! The seven concrete scenarios from `SPEC_FULL.md` §8, exercised through
//! the public `GraphBuilder` -> `optimize` -> `compile` -> `run` path.

use std::collections::HashMap;
use std::sync::Arc;

use ioc::ir::{GraphBuilder, NodeId};
use ioc::solver::OptimizationMode;
use ioc::types::Type;
use ioc::value::Value;

fn ints(values: Vec<i64>) -> Value {
    Value::List(values.into_iter().map(Value::Int).collect())
}

fn strs(values: &[&str]) -> Value {
    Value::List(values.iter().map(|s| Value::Str((*s).to_string())).collect())
}

fn run_one(graph: &ioc::ir::Graph, name: &str, input: Value) -> Value {
    let plan = graph.compile(OptimizationMode::Balanced, false, false).unwrap();
    let mut inputs = HashMap::new();
    inputs.insert(name.to_string(), input);
    plan.run(&inputs).unwrap().first().clone()
}

#[test]
fn scenario_1_filter_then_map() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::int())).unwrap();
    let filtered = b.filter(data, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 5))).unwrap();
    let doubled = b.map(filtered, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)))).unwrap();
    b.output(doubled).unwrap();
    let graph = b.build();

    let result = run_one(&graph, "data", ints(vec![1, 3, 5, 7, 9]));
    assert_eq!(result, ints(vec![14, 18]));
}

#[test]
fn scenario_2_reduce_with_initial() {
    let mut b = GraphBuilder::new();
    let nums = b.input("nums", Type::list_of(Type::int())).unwrap();
    let summed = b
        .reduce(
            nums,
            Arc::new(|a: &Value, c: &Value| Ok(Value::Int(a.as_int().unwrap() + c.as_int().unwrap()))),
            Some(Value::Int(0)),
        )
        .unwrap();
    b.output(summed).unwrap();
    let graph = b.build();

    let result = run_one(&graph, "nums", ints(vec![1, 2, 3, 4, 5]));
    assert_eq!(result, Value::Int(15));
}

#[test]
fn scenario_3_filter_map_reduce_pipeline() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::int())).unwrap();
    let evens = b.filter(data, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) % 2 == 0))).unwrap();
    let squared = b.map(evens, Arc::new(|v: &Value| {
        let n = v.as_int().unwrap_or(0);
        Ok(Value::Int(n * n))
    })).unwrap();
    let summed = b
        .reduce(
            squared,
            Arc::new(|a: &Value, c: &Value| Ok(Value::Int(a.as_int().unwrap() + c.as_int().unwrap()))),
            Some(Value::Int(0)),
        )
        .unwrap();
    b.output(summed).unwrap();
    let graph = b.build();

    let result = run_one(&graph, "data", ints(vec![1, 2, 3, 4, 5, 6]));
    assert_eq!(result, Value::Int(56));
}

#[test]
fn scenario_4_dce_shrinks_to_reachable_node_count() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::int())).unwrap();
    let kept = b.filter(data, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0))).unwrap();
    let _orphan = b.filter(data, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) < 0))).unwrap();
    b.output(kept).unwrap();
    let graph = b.build();

    let reachable = graph.topological_order().len();
    let optimized = graph.optimize(None).unwrap();
    assert_eq!(optimized.node_count(), reachable);
}

#[test]
fn scenario_5_filter_fusion_collapses_a_pair() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::int())).unwrap();
    let gt5 = b.filter(data, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 5))).unwrap();
    let lt20 = b.filter(gt5, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) < 20))).unwrap();
    b.output(lt20).unwrap();
    let graph = b.build();

    let before = run_one(&graph, "data", ints(vec![3, 7, 10, 15, 25, 30]));
    assert_eq!(before, ints(vec![7, 10, 15]));

    let optimized = graph.optimize(None).unwrap();
    let after = run_one(&optimized, "data", ints(vec![3, 7, 10, 15, 25, 30]));
    assert_eq!(after, ints(vec![7, 10, 15]));
    assert_eq!(optimized.node_count(), graph.node_count() - 1);
}

#[test]
fn scenario_6_filter_before_map_reorders_independent_pair() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::Any)).unwrap();
    let uppered = b
        .map(data, Arc::new(|v: &Value| match v {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            other => Ok(other.clone()),
        }))
        .unwrap();
    let longer_than_3 = b
        .filter(uppered, Arc::new(|v: &Value| match v {
            Value::Str(s) => Ok(s.len() > 3),
            _ => Ok(false),
        }))
        .unwrap();
    b.output(longer_than_3).unwrap();
    let graph = b.build();

    let input = strs(&["hi", "test", "hello", "x"]);
    let before = run_one(&graph, "data", input.clone());
    assert_eq!(before, strs(&["TEST", "HELLO"]));

    let optimized = graph.optimize(None).unwrap();
    let after = run_one(&optimized, "data", input);
    assert_eq!(after, strs(&["TEST", "HELLO"]));

    // After the reorder the output is now the Map node (filter runs first):
    // output -> Map -> Filter -> original Input.
    let new_output = *optimized.outputs().first().unwrap();
    let map_node = optimized.node(new_output).unwrap();
    assert_eq!(map_node.kind, ioc::ir::NodeKindTag::Map);

    let filter_id: NodeId = map_node.inputs[0];
    let filter_node = optimized.node(filter_id).unwrap();
    assert_eq!(filter_node.kind, ioc::ir::NodeKindTag::Filter);
    assert_eq!(optimized.node(filter_node.inputs[0]).unwrap().kind, ioc::ir::NodeKindTag::Input);
}

#[test]
fn scenario_7_filter_before_map_rejects_dependent_pair() {
    let mut b = GraphBuilder::new();
    let data = b.input("data", Type::list_of(Type::int())).unwrap();
    let doubled = b.map(data, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)))).unwrap();
    let above_10 = b.filter(doubled, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 10))).unwrap();
    b.output(above_10).unwrap();
    let graph = b.build();

    let result = run_one(&graph, "data", ints(vec![3, 7, 10]));
    assert_eq!(result, ints(vec![14, 20]));

    let optimized = graph.optimize(None).unwrap();
    let filter_node = optimized.node(*optimized.outputs().first().unwrap()).unwrap();
    assert_eq!(filter_node.kind, ioc::ir::NodeKindTag::Filter);
    let parent = optimized.node(filter_node.inputs[0]).unwrap();
    assert_eq!(parent.kind, ioc::ir::NodeKindTag::Map);
}

#[test]
fn missing_output_before_compile_is_rejected() {
    let mut b = GraphBuilder::new();
    let _unused = b.input("x", Type::int()).unwrap();
    let graph = b.build();
    let err = graph.compile(OptimizationMode::Balanced, false, false).unwrap_err();
    assert!(matches!(err, ioc::error::CompileError::MissingOutput));
}

#[test]
fn unknown_optimizer_pass_name_is_reported() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::int()).unwrap();
    b.output(x).unwrap();
    let graph = b.build();

    let optimizer = ioc::optimizer::Optimizer::new();
    let err = optimizer.run(graph, Some(&["not_a_real_pass"]), None).unwrap_err();
    assert!(matches!(err, ioc::error::CompileError::UnknownPass(name) if name == "not_a_real_pass"));
}
