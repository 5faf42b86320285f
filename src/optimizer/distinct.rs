//! Distinct elision.
//!
//! ```text
//! distinct(distinct(x))                  -> distinct(x)
//! distinct(op(distinct(a), ..))          -> distinct(op(a, ..))     op in map, filter, join, sum
//! filter(distinct(x))                    -> distinct(filter(x))
//! join(distinct(a), distinct(b))         -> distinct(join(a, b))
//! ```
//!
//! Moving a distinct downstream lets consecutive distincts meet and collapse.

use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder, Operator, OperatorKind, OperatorRef};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use std::sync::Arc;

pub struct DistinctElision;

fn is_distinct(op: &Operator) -> bool {
    matches!(op.kind(), OperatorKind::Distinct)
}

/// Inputs of the distincts in `inputs`, if every one of them is a distinct
fn under_distincts(inputs: &[OperatorRef]) -> Option<Vec<OperatorRef>> {
    if inputs.is_empty() || !inputs.iter().all(|i| is_distinct(i)) {
        return None;
    }
    inputs.iter().map(|i| i.input().cloned()).collect()
}

fn visit(rebuilder: &mut CircuitRebuilder<'_>, ctx: &mut CompilationContext, op: &OperatorRef) -> CompileResult<()> {
    match op.kind() {
        OperatorKind::Distinct => {
            let Some(input) = op.input().map(|i| rebuilder.mapped(i)) else {
                return rebuilder.copy(op);
            };
            if is_distinct(&input) {
                tracing::trace!(operator = op.output_name(), "distinct_of_distinct");
                rebuilder.replace(op, input);
                return Ok(());
            }
            let pullable = matches!(
                input.kind(),
                OperatorKind::Map | OperatorKind::Filter | OperatorKind::Join | OperatorKind::Sum
            );
            if pullable {
                if let Some(inner) = under_distincts(input.inputs()) {
                    let stripped = input.duplicate(ctx, inner)?;
                    rebuilder.emit(Arc::clone(&stripped))?;
                    let result = op.with_inputs(vec![stripped], false)?;
                    rebuilder.emit(Arc::clone(&result))?;
                    rebuilder.replace(op, result);
                    return Ok(());
                }
            }
            rebuilder.copy(op)
        }
        OperatorKind::Filter => {
            let Some(input) = op.input().map(|i| rebuilder.mapped(i)) else {
                return rebuilder.copy(op);
            };
            match (is_distinct(&input), input.input()) {
                (true, Some(inner)) => {
                    let filter = op.with_inputs(vec![Arc::clone(inner)], false)?;
                    rebuilder.emit(Arc::clone(&filter))?;
                    let distinct = Operator::distinct(ctx, filter)?;
                    rebuilder.emit(Arc::clone(&distinct))?;
                    rebuilder.replace(op, distinct);
                    Ok(())
                }
                _ => rebuilder.copy(op),
            }
        }
        OperatorKind::Join => {
            let inputs = rebuilder.mapped_inputs(op);
            match under_distincts(&inputs) {
                Some(inner) => {
                    let join = op.with_inputs(inner, false)?;
                    rebuilder.emit(Arc::clone(&join))?;
                    let distinct = Operator::distinct(ctx, join)?;
                    rebuilder.emit(Arc::clone(&distinct))?;
                    rebuilder.replace(op, distinct);
                    Ok(())
                }
                None => rebuilder.copy(op),
            }
        }
        _ => rebuilder.copy(op),
    }
}

impl CircuitPass for DistinctElision {
    fn name(&self) -> &'static str {
        "distinct_elision"
    }

    fn apply(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        CircuitRebuilder::rebuild(circuit, |rebuilder, op| visit(rebuilder, ctx, op))
    }
}
