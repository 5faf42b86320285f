//! # Circuit Optimizer
//!
//! A fixed pipeline of circuit-to-circuit passes, each run once:
//!
//! 1. Distinct elision: `distinct(distinct x)` -> `distinct x`, and distincts
//!    pulled past filters, maps, joins and sums
//! 2. Incrementalize: `integrate` after every source, `differentiate`
//!    before every sink
//! 3. Incremental cleanup: push integrals forward through linear operators,
//!    replace distinct/join/aggregate over integrals with their incremental forms
//! 4. Dead-code elimination: keep sources and whatever the sinks depend on
//! 5. Redundant-integral elision: `differentiate(integrate(x))` -> `x`
//! 6. Function rewrite: beta-reduce and simplify every embedded expression
//!
//! ```text
//! Circuit (from lowering) -> [distinct] -> [incrementalize] -> [cleanup]
//!     -> [dead code] -> [no integral] -> [functions] -> Circuit
//! ```
//!
//! Steps 2, 3 and 5 only run when incrementalization is requested; with
//! `optimize = false` only step 2 runs.
//!
//! A pass that changes nothing returns a circuit holding the same operators,
//! so `Circuit::same_operators` detects a fixpoint.

pub mod compaction;
pub mod dead_code;
pub mod distinct;
pub mod function_rewrite;
pub mod incremental_cleanup;
pub mod incrementalize;
pub mod no_integral;

pub use compaction::Compaction;
pub use dead_code::{DeadCodeAnalysis, Reachable};
pub use distinct::DistinctElision;
pub use function_rewrite::FunctionRewrite;
pub use incremental_cleanup::IncrementalCleanup;
pub use incrementalize::Incrementalize;
pub use no_integral::RedundantIntegralElision;

use crate::circuit::Circuit;
use crate::config::OptimizerConfig;
use crate::context::CompilationContext;
use crate::error::CompileResult;

/// A circuit-to-circuit transformation
pub trait CircuitPass: Send + Sync {
    /// Name used in logs and statistics
    fn name(&self) -> &'static str;

    fn apply(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit>;
}

/// Effect of one pass on the circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub pass: &'static str,
    pub operators_before: usize,
    pub operators_after: usize,
    pub changed: bool,
}

/// Per-pass statistics of one optimizer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    pub passes: Vec<PassStats>,
}

impl OptimizationStats {
    /// Names of the passes that changed the circuit
    pub fn changed_passes(&self) -> Vec<&'static str> {
        self.passes
            .iter()
            .filter(|p| p.changed)
            .map(|p| p.pass)
            .collect()
    }

    pub fn any_changed(&self) -> bool {
        self.passes.iter().any(|p| p.changed)
    }
}

/// The optimizer pipeline
pub struct CircuitOptimizer {
    passes: Vec<Box<dyn CircuitPass>>,
}

impl CircuitOptimizer {
    /// Build the pipeline for `config`
    pub fn new(config: &OptimizerConfig) -> Self {
        let mut passes: Vec<Box<dyn CircuitPass>> = Vec::new();
        if config.optimize {
            passes.push(Box::new(DistinctElision));
        }
        if config.incrementalize {
            passes.push(Box::new(Incrementalize));
            if config.optimize {
                passes.push(Box::new(IncrementalCleanup));
            }
        }
        if config.optimize {
            passes.push(Box::new(Compaction));
            if config.incrementalize {
                passes.push(Box::new(RedundantIntegralElision));
            }
            if config.simplify_functions {
                passes.push(Box::new(FunctionRewrite));
            }
        }
        CircuitOptimizer { passes }
    }

    /// A pipeline running exactly `passes`, in order
    pub fn with_passes(passes: Vec<Box<dyn CircuitPass>>) -> Self {
        CircuitOptimizer { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn optimize(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        self.optimize_with_stats(circuit, ctx).map(|(circuit, _)| circuit)
    }

    pub fn optimize_with_stats(
        &self,
        circuit: &Circuit,
        ctx: &mut CompilationContext,
    ) -> CompileResult<(Circuit, OptimizationStats)> {
        let mut current = circuit.clone();
        let mut stats = OptimizationStats::default();
        for pass in &self.passes {
            let before = current.len();
            let next = pass.apply(&current, ctx)?;
            let changed = !next.same_operators(&current);
            tracing::debug!(
                pass = pass.name(),
                before,
                after = next.len(),
                changed,
                "pass_executed"
            );
            stats.passes.push(PassStats {
                pass: pass.name(),
                operators_before: before,
                operators_after: next.len(),
                changed,
            });
            current = next;
        }
        Ok((current, stats))
    }
}
