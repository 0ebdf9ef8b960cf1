//! Error types for the graph builder, optimizer, and solver/runtime.
//!
//! Two tiers, matching the structural/runtime split of the rest of the
//! crate: [`CompileError`] covers everything that can go wrong before or
//! during lowering to a [`crate::solver::Plan`]; [`RuntimeError`] covers
//! everything that can go wrong while a `Plan` is invoked.

use crate::ir::NodeId;
use std::sync::Arc;

/// Errors raised while building, optimizing, or compiling a graph.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    /// A node referenced an input id that does not exist in the graph.
    #[error("invalid reference: node {referrer:?} points at unknown node {target:?}")]
    InvalidReference { referrer: NodeId, target: NodeId },

    /// A node kind was constructed with the wrong number of inputs.
    #[error("invalid arity: {kind} expects {expected} input(s), got {actual}")]
    InvalidArity {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// No registered strategy can handle this node's kind.
    #[error("no strategy can handle node {node:?} of kind {kind}")]
    UnsupportedKind { node: NodeId, kind: &'static str },

    /// The optimizer was asked to run a pass it does not know about.
    #[error("unknown optimizer pass: {0}")]
    UnknownPass(String),

    /// `compile` was called on a graph with no declared outputs.
    #[error("graph has no outputs; call output(id) at least once before compiling")]
    MissingOutput,
}

/// Errors raised while invoking a compiled [`crate::solver::Plan`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// An `Input` node's name was not present in the invocation's bindings.
    #[error("missing input: '{0}'")]
    MissingInput(String),

    /// `Reduce` was invoked on an empty sequence with no initial value.
    #[error("reduce on empty input with no initial value")]
    EmptyReduce,

    /// An `Assert` node's predicate evaluated to false.
    #[error("assertion failed: {message}")]
    AssertionViolation { message: String },

    /// A user-supplied predicate or transform raised while evaluating a node.
    #[error("user function at node {node:?} failed: {source}")]
    UserFunctionFailure {
        node: NodeId,
        #[source]
        source: Arc<anyhow::Error>,
    },
}
