//! Post-incrementalization cleanup.
//!
//! Walks the circuit in topological order, moving integrals downstream:
//!
//! ```text
//! op(I a, I b, ..)    -> I(op(a, b, ..))                      op linear
//! distinct(I x)       -> I(incremental_distinct(I x))
//! join(I a, I b)      -> I(incremental_join(a, b))
//! aggregate(I x)      -> I(incremental_aggregate(I x))
//! window(I x)         -> I(differentiate(window(I x)))
//! ```
//!
//! Linear operators commute with integration, so they can work on deltas
//! directly. Distinct, join and aggregate depend on history; their
//! incremental forms keep what they need and emit deltas. Window aggregates
//! and constants stay on whole relations; the changes of a window are
//! taken so the operators after it can still run on deltas. Once an integral reaches a sink
//! it meets the sink's `differentiate` and both are removed by
//! `RedundantIntegralElision`.

use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder, Operator, OperatorKind, OperatorRef};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use std::sync::Arc;

pub struct IncrementalCleanup;

fn is_integral(op: &Operator) -> bool {
    matches!(op.kind(), OperatorKind::Integrate)
}

/// Inputs of the integrals in `inputs`, if every one of them is an integral
fn under_integrals(inputs: &[OperatorRef]) -> Option<Vec<OperatorRef>> {
    if inputs.is_empty() || !inputs.iter().all(|i| is_integral(i)) {
        return None;
    }
    inputs.iter().map(|i| i.input().cloned()).collect()
}

/// Emit `op` followed by its integral, and make the integral stand for `original`
fn emit_integrated(
    rebuilder: &mut CircuitRebuilder<'_>,
    ctx: &mut CompilationContext,
    original: &Operator,
    op: OperatorRef,
) -> CompileResult<()> {
    rebuilder.emit(Arc::clone(&op))?;
    let integral = Operator::integrate(ctx, op)?;
    rebuilder.emit(Arc::clone(&integral))?;
    tracing::trace!(
        operator = original.output_name(),
        integral = integral.output_name(),
        "integral_pushed"
    );
    rebuilder.replace(original, integral);
    Ok(())
}

fn visit(rebuilder: &mut CircuitRebuilder<'_>, ctx: &mut CompilationContext, op: &OperatorRef) -> CompileResult<()> {
    let inputs = rebuilder.mapped_inputs(op);
    match op.kind() {
        kind if kind.is_linear() => match under_integrals(&inputs) {
            Some(deltas) => {
                let linear = op.with_inputs(deltas, false)?;
                emit_integrated(rebuilder, ctx, op, linear)
            }
            None => rebuilder.copy(op),
        },
        OperatorKind::Distinct | OperatorKind::Aggregate if under_integrals(&inputs).is_some() => {
            let kind = if matches!(op.kind(), OperatorKind::Distinct) {
                OperatorKind::IncrementalDistinct
            } else {
                OperatorKind::IncrementalAggregate
            };
            // these read the integral itself
            let incremental = op.with_kind(ctx, kind, inputs)?;
            emit_integrated(rebuilder, ctx, op, incremental)
        }
        OperatorKind::WindowAggregate { .. } if under_integrals(&inputs).is_some() => {
            let whole = rebuilder.rewire(op)?;
            rebuilder.emit(Arc::clone(&whole))?;
            let changes = Operator::differentiate(ctx, whole)?;
            emit_integrated(rebuilder, ctx, op, changes)
        }
        OperatorKind::Join => match under_integrals(&inputs) {
            Some(deltas) => {
                let incremental = op.with_kind(ctx, OperatorKind::IncrementalJoin, deltas)?;
                emit_integrated(rebuilder, ctx, op, incremental)
            }
            None => rebuilder.copy(op),
        },
        _ => rebuilder.copy(op),
    }
}

impl CircuitPass for IncrementalCleanup {
    fn name(&self) -> &'static str {
        "incremental_cleanup"
    }

    fn apply(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        CircuitRebuilder::rebuild(circuit, |rebuilder, op| visit(rebuilder, ctx, op))
    }
}
