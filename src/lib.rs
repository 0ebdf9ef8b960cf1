//! `ioc` is an embedded dataflow compiler and optimizing runtime for a
//! small collection algebra: intent graphs of `Input`/`Filter`/`Map`/
//! `Reduce`/`GroupBy`/`Join`/... nodes get rewritten by a fixed pipeline
//! of structural optimizations, then lowered by a cost-model-driven
//! solver kernel into a directly executable [`solver::Plan`].
//!
//! # Layout
//!
//! - [`ir`]: the intent graph — node kinds, [`ir::GraphBuilder`], the DAG
//!   invariants every other module relies on.
//! - [`value`]: runtime values, reference-identity-compared user
//!   functions, and the parameter representation nodes carry.
//! - [`types`]: the closed structural type lattice.
//! - [`optimizer`]: the rewriting optimizer's fixed pass pipeline (DCE,
//!   CSE, filter/map fusion, filter-before-map).
//! - [`solver`]: size propagation, strategy selection, and lowering to a
//!   [`solver::Plan`].
//! - [`strategies`]: the naive/optimized/vectorized execution strategies
//!   a [`solver::SolverKernel`] chooses between.
//! - [`profiler`]: the persistent, EMA-smoothed cost model.
//! - [`provenance`] / [`testing`]: optional collaborator seams —
//!   structural-change tracking and the fixed probe corpus shared by the
//!   in-crate independence check and external differential testers.
//! - [`error`]: the two-tier `CompileError`/`RuntimeError` model.
//! - [`config`]: ambient configuration (solver defaults, profiler
//!   persistence, logging), loaded via `figment`.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use ioc::ir::GraphBuilder;
//! use ioc::solver::OptimizationMode;
//! use ioc::types::Type;
//! use ioc::value::Value;
//!
//! let mut builder = GraphBuilder::new();
//! let xs = builder.input("xs", Type::list_of(Type::int())).unwrap();
//! let positive = builder
//!     .filter(xs, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0)))
//!     .unwrap();
//! builder.output(positive).unwrap();
//! let graph = builder.build();
//!
//! let optimized = graph.optimize(None).unwrap();
//! let plan = optimized.compile(OptimizationMode::Balanced, false, false).unwrap();
//!
//! let mut inputs = HashMap::new();
//! inputs.insert("xs".to_string(), Value::List(vec![Value::Int(-1), Value::Int(2), Value::Int(3)]));
//! let result = plan.run(&inputs).unwrap();
//! assert_eq!(*result.first(), Value::List(vec![Value::Int(2), Value::Int(3)]));
//! ```

pub mod config;
pub mod error;
pub mod ir;
pub mod optimizer;
pub mod profiler;
pub mod provenance;
pub mod solver;
pub mod strategies;
pub mod testing;
pub mod types;
pub mod value;
