//! # deltaplan
//!
//! Compiles typed relational query plans into incremental dataflow circuits:
//! operator DAGs over Z-sets that, given the changes to the base tables,
//! emit the changes to every view without recomputing it.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Plan (tables + views, from a SQL front end)
//!     ↓
//! [Lowering]                    → whole-relation Circuit
//!     ↓
//! [Distinct elision]            → fewer distinct operators
//!     ↓
//! [Incrementalize]              → integrate/differentiate at the borders (optional)
//!     ↓
//! [Incremental cleanup]         → delta operators, incremental distinct/join/aggregate
//!     ↓
//! [Dead code]                   → unreachable operators removed
//!     ↓
//! [Redundant integrals]         → D(I(x)) = x
//!     ↓
//! [Function rewrite]            → beta-reduced, simplified closures
//!     ↓
//! Circuit (for a code generator)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use deltaplan::plan::{builders::PlanBuilder, RelNode};
//! use deltaplan::types::Type;
//! use deltaplan::{Compiler, CompilerConfig};
//!
//! let plan = PlanBuilder::new("example")
//!     .table("T", &[("a", Type::int32())])
//!     .view("V", RelNode::scan("T").distinct())
//!     .build();
//!
//! let mut config = CompilerConfig::default();
//! config.optimizer.incrementalize = true;
//! let circuit = Compiler::new(config).compile(&plan)?;
//! assert!(circuit.sink("V").is_some());
//! # Ok::<(), deltaplan::CompileError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `types` | Types with orthogonal nullability |
//! | `expr` | Expression IR, rewriter, beta reduction, simplifier |
//! | `primitives` | Specialized runtime functions per operand type |
//! | `circuit` | Operator DAG, visitors, DOT/JSON export |
//! | `plan` | Typed relational plan (serde) |
//! | `lowering` | Plan → whole-relation circuit |
//! | `optimizer` | Circuit passes and the pipeline |
//! | `config` | figment-based configuration |

pub mod circuit;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod logging;
pub mod lowering;
pub mod optimizer;
pub mod plan;
pub mod primitives;
pub mod types;

pub use circuit::{Circuit, CircuitVisitor, Operator, OperatorKind, OperatorRef};
pub use config::{CompilerConfig, LoggingConfig, OptimizerConfig};
pub use context::CompilationContext;
pub use error::{CompileError, CompileResult};
pub use expr::{Expr, ExprKind};
pub use lowering::Lowering;
pub use optimizer::{CircuitOptimizer, CircuitPass, OptimizationStats};
pub use plan::Plan;
pub use types::{Type, TypeKind};

use rayon::prelude::*;

/// Plan-to-circuit compiler.
///
/// Holds no per-compilation state: every call creates its own
/// `CompilationContext`, so one compiler can be shared across threads.
pub struct Compiler {
    config: CompilerConfig,
    optimizer: CircuitOptimizer,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        let optimizer = CircuitOptimizer::new(&config.optimizer);
        Compiler { config, optimizer }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &CircuitOptimizer {
        &self.optimizer
    }

    /// Compile `plan` and run the optimizer pipeline
    pub fn compile(&self, plan: &Plan) -> CompileResult<Circuit> {
        self.compile_with_stats(plan).map(|(circuit, _)| circuit)
    }

    /// Compile `plan`, reporting what each pass did
    pub fn compile_with_stats(&self, plan: &Plan) -> CompileResult<(Circuit, OptimizationStats)> {
        let mut ctx = CompilationContext::new();
        let lowered = Lowering::lower(plan, &mut ctx)?;
        let (circuit, stats) = self.optimizer.optimize_with_stats(&lowered, &mut ctx)?;
        for sink in circuit.sinks() {
            if let OperatorKind::Sink { view } = sink.kind() {
                tracing::info!(
                    circuit = circuit.name(),
                    view = %view,
                    output_type = %sink.output_type(),
                    operators = circuit.len(),
                    "view_compiled"
                );
            }
        }
        Ok((circuit, stats))
    }

    /// Compile independent plans in parallel; results keep the input order
    pub fn compile_many(&self, plans: &[Plan]) -> Vec<CompileResult<Circuit>> {
        plans.par_iter().map(|plan| self.compile(plan)).collect()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(CompilerConfig::default())
    }
}
