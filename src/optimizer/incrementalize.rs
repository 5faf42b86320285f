//! Incrementalization.
//!
//! The circuit is wrapped between integration and differentiation, so that
//! it consumes and produces deltas while every interior operator still sees
//! whole relations:
//!
//! ```text
//! source(T) -> op.. -> sink(V)
//!   becomes
//! source(T) -> integrate -> op.. -> differentiate -> sink(V)
//! ```
//!
//! The cleanup pass then pushes the integrals forward.

use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder, Operator, OperatorKind};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use std::sync::Arc;

pub struct Incrementalize;

impl CircuitPass for Incrementalize {
    fn name(&self) -> &'static str {
        "incrementalize"
    }

    fn apply(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        CircuitRebuilder::rebuild(circuit, |rebuilder, op| match op.kind() {
            OperatorKind::Source { .. } => {
                rebuilder.emit(Arc::clone(op))?;
                let integral = Operator::integrate(ctx, Arc::clone(op))?;
                rebuilder.emit(Arc::clone(&integral))?;
                rebuilder.replace(op, integral);
                Ok(())
            }
            OperatorKind::Sink { .. } => {
                let inputs = rebuilder.mapped_inputs(op);
                let mut deltas = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let delta = Operator::differentiate(ctx, input)?;
                    rebuilder.emit(Arc::clone(&delta))?;
                    deltas.push(delta);
                }
                let sink = op.with_inputs(deltas, false)?;
                rebuilder.emit(Arc::clone(&sink))?;
                rebuilder.replace(op, sink);
                Ok(())
            }
            _ => rebuilder.copy(op),
        })
    }
}
