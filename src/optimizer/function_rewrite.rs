//! Beta-reduce then simplify the function embedded in every operator.
//!
//! Lowering wraps row accessors and predicates in closures that are applied
//! immediately; reducing them exposes the constant sub-expressions the
//! simplifier folds. Operators whose function is unchanged are kept as is.

use super::CircuitPass;
use crate::circuit::{Circuit, CircuitRebuilder};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use crate::expr::{BetaReducer, Expr, Simplifier};
use std::sync::Arc;

pub struct FunctionRewrite;

impl FunctionRewrite {
    /// Beta reduction followed by simplification
    pub fn rewrite(expr: &Expr, ctx: &mut CompilationContext) -> CompileResult<Expr> {
        let reduced = BetaReducer::new(ctx).reduce(expr)?;
        Simplifier::new().simplify(&reduced)
    }
}

impl CircuitPass for FunctionRewrite {
    fn name(&self) -> &'static str {
        "function_rewrite"
    }

    fn apply(&self, circuit: &Circuit, ctx: &mut CompilationContext) -> CompileResult<Circuit> {
        CircuitRebuilder::rebuild(circuit, |rebuilder, op| {
            let Some(function) = op.function() else {
                return rebuilder.copy(op);
            };
            let rewritten = FunctionRewrite::rewrite(function, ctx)?;
            if Expr::ptr_eq(function, &rewritten) {
                return rebuilder.copy(op);
            }
            tracing::trace!(operator = op.output_name(), "function_rewritten");
            let result = rebuilder.rewire(op)?.with_function(rewritten)?;
            rebuilder.emit(Arc::clone(&result))?;
            rebuilder.replace(op, result);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Operator;
    use crate::expr::{BinaryOp, Param};
    use crate::types::Type;

    #[test]
    fn test_applied_closure_inlined() {
        let mut ctx = CompilationContext::new();
        let mut circuit = Circuit::new("c");
        let t = Operator::source(&mut ctx, "T", Type::int32(), true);
        // |r: &i32| (|v: i32| v > 0 || false)(*r)
        let v = Param::new("v", Type::int32());
        let inner_body = Expr::binary(
            BinaryOp::Or,
            Expr::binary(BinaryOp::Gt, v.var(), Expr::i32(0)).unwrap(),
            Expr::bool(false),
        )
        .unwrap();
        let inner = Expr::closure(vec![v], inner_body);
        let r = Param::new("r", Type::reference(Type::int32()));
        let predicate = Expr::closure(
            vec![r.clone()],
            Expr::apply(inner, vec![Expr::deref(r.var()).unwrap()]).unwrap(),
        );
        let f = Operator::filter(&mut ctx, t.clone(), predicate).unwrap();
        let sink = Operator::sink(&mut ctx, "V", f.clone());
        for op in [t, f, sink] {
            circuit.add(op).unwrap();
        }

        let out = FunctionRewrite.apply(&circuit, &mut ctx).unwrap();
        let filter = &out.operators()[0];
        assert_eq!(filter.output_name(), circuit.operators()[0].output_name());
        assert_eq!(
            filter.function().unwrap().to_string(),
            "move |r: &i32| ((*r) > 0)"
        );
        // the sink follows the rewritten filter
        assert!(Arc::ptr_eq(&out.sinks()[0].inputs()[0], filter));

        let again = FunctionRewrite.apply(&out, &mut ctx).unwrap();
        assert!(again.same_operators(&out));
    }
}
