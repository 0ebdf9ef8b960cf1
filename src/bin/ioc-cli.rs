//! A thin ambient-stack CLI: build a tiny embedded example graph, optimize
//! it, compile it, run it, and optionally explain it.
//!
//! This is not the external front-end surface (`analyze`/`benchmark`/
//! `explain`/`interactive`) — that belongs to a separate crate built on
//! top of `ioc`'s library API. This binary exists so the crate has an
//! ambient entry point to exercise during development.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ioc::ir::GraphBuilder;
use ioc::solver::OptimizationMode;
use ioc::types::Type;
use ioc::value::Value;

#[derive(Parser)]
#[command(name = "ioc-cli", about = "Run the built-in example intent graph")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Optimization mode used when compiling.
    #[arg(long, value_enum, default_value = "balanced")]
    mode: Mode,
}

#[derive(Subcommand)]
enum Command {
    /// Run the example graph and print its output.
    Run,
    /// Print the example graph's tree, before and after optimization.
    Explain {
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum Mode {
    Speed,
    Memory,
    Balanced,
}

impl From<Mode> for OptimizationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Speed => OptimizationMode::Speed,
            Mode::Memory => OptimizationMode::Memory,
            Mode::Balanced => OptimizationMode::Balanced,
        }
    }
}

/// `xs -> filter(> 0) -> map(* 2)`, the crate's canonical smoke-test graph.
fn example_graph() -> ioc::ir::Graph {
    let mut builder = GraphBuilder::new();
    let xs = builder.input("xs", Type::list_of(Type::int())).expect("valid input node");
    let positive = builder
        .filter(xs, Arc::new(|v: &Value| Ok(v.as_int().unwrap_or(0) > 0)))
        .expect("valid filter node");
    let doubled = builder
        .map(positive, Arc::new(|v: &Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2))))
        .expect("valid map node");
    builder.output(doubled).expect("doubled is a real node");
    builder.build()
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let graph = example_graph();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let plan = graph
                .compile(cli.mode.into(), true, false)
                .expect("example graph always compiles");
            let mut inputs = HashMap::new();
            inputs.insert(
                "xs".to_string(),
                Value::List(vec![Value::Int(-3), Value::Int(1), Value::Int(4), Value::Int(-1), Value::Int(5)]),
            );
            match plan.run(&inputs) {
                Ok(output) => println!("{:?}", output.into_vec()),
                Err(err) => eprintln!("runtime error: {err}"),
            }
        }
        Command::Explain { verbose } => {
            println!("before optimization:\n{}", graph.explain(verbose));
            let optimized = graph.optimize(None).expect("example graph's passes are all known");
            println!("after optimization:\n{}", optimized.explain(verbose));
        }
    }
}
