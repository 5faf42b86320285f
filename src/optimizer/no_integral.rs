//! Redundant-integral elision: `differentiate(integrate(x))` -> `x`.
//!
//! Consumers of the differentiate read `x` directly. Integrals left without
//! consumers are pruned afterwards.

use super::compaction::Compaction;
use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder, OperatorKind};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use std::sync::Arc;

pub struct RedundantIntegralElision;

impl CircuitPass for RedundantIntegralElision {
    fn name(&self) -> &'static str {
        "no_integral"
    }

    fn apply(&self, circuit: &Circuit, _ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        let cancelled = CircuitRebuilder::rebuild(circuit, |rebuilder, op| {
            if !matches!(op.kind(), OperatorKind::Differentiate) {
                return rebuilder.copy(op);
            }
            let input = match op.input() {
                Some(input) => rebuilder.mapped(input),
                None => return rebuilder.copy(op),
            };
            match (input.kind(), input.input()) {
                (OperatorKind::Integrate, Some(inner)) => {
                    tracing::trace!(operator = op.output_name(), "integral_cancelled");
                    rebuilder.replace(op, Arc::clone(inner));
                    Ok(())
                }
                _ => rebuilder.copy(op),
            }
        })?;
        Compaction::prune(&cancelled)
    }
}
