//! Dead-code elimination: rebuild the circuit without unreachable operators.

use super::dead_code::{DeadCodeAnalysis, Reachable};
use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder};
use crate::context::CompilationContext;
use crate::error::CompileResult;

pub struct Compaction;

impl Compaction {
    /// Keep exactly the operators in `reachable`
    pub fn compact(circuit: &Circuit, reachable: &Reachable) -> CompileResult<Circuit> {
        CircuitRebuilder::rebuild(circuit, |rebuilder, op| {
            if reachable.contains(op) {
                rebuilder.copy(op)
            } else {
                tracing::trace!(operator = op.output_name(), "operator_removed");
                Ok(())
            }
        })
    }

    /// Analyze then compact
    pub fn prune(circuit: &Circuit) -> CompileResult<Circuit> {
        let reachable = DeadCodeAnalysis::analyze(circuit)?;
        if reachable.len() == circuit.len() {
            return Ok(circuit.clone());
        }
        Compaction::compact(circuit, &reachable)
    }
}

impl CircuitPass for Compaction {
    fn name(&self) -> &'static str {
        "dead_code"
    }

    fn apply(&self, circuit: &Circuit, _ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        Compaction::prune(circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Operator;
    use crate::types::Type;

    #[test]
    fn test_unreachable_operators_removed() {
        let mut ctx = CompilationContext::new();
        let mut circuit = Circuit::new("c");
        let t = Operator::source(&mut ctx, "T", Type::int32(), true);
        let dead = Operator::negate(&mut ctx, t.clone()).unwrap();
        let live = Operator::distinct(&mut ctx, t.clone()).unwrap();
        let sink = Operator::sink(&mut ctx, "V", live.clone());
        for op in [t, dead, live, sink] {
            circuit.add(op).unwrap();
        }
        let out = Compaction.apply(&circuit, &mut ctx).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.operators()[0].operation(), "distinct");
        // untouched operators are shared
        assert!(std::sync::Arc::ptr_eq(&out.operators()[0], &circuit.operators()[1]));
    }

    #[test]
    fn test_live_circuit_returned_as_is() {
        let mut ctx = CompilationContext::new();
        let mut circuit = Circuit::new("c");
        let t = Operator::source(&mut ctx, "T", Type::int32(), true);
        let sink = Operator::sink(&mut ctx, "V", t.clone());
        circuit.add(t).unwrap();
        circuit.add(sink).unwrap();
        let out = Compaction.apply(&circuit, &mut ctx).unwrap();
        assert!(out.same_operators(&circuit));
    }
}
