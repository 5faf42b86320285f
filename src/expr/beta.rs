//! # Beta Reduction
//!
//! Inlines applications of literal closures:
//!
//! ```text
//! (|x: i32| x + x)(a.0)   ->   a.0 + a.0
//! ```
//!
//! Arguments are transformed first, then bound to the parameters in a fresh
//! scope while the body is transformed. Expressions are side-effect free, so
//! an argument used several times can simply be copied.
//!
//! Binders inside the body (`let`, nested closure parameters, match patterns)
//! shadow outer substitutions. When such a binder has the same name as a free
//! variable of an argument being substituted, it is renamed to a fresh name
//! so the argument's variable is not captured:
//!
//! ```text
//! (|x| |y| x + y)(y)   ->   |y_0| y + y_0
//! ```

use super::rewrite::{rebuild_block, rebuild_closure, rebuild_match, ExprRewriter};
use super::substitution::{Binding, ScopeStack};
use super::{Expr, ExprKind, MatchArm, Param, Statement};
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use std::collections::{HashMap, HashSet};

/// Beta reducer; fresh names come from the compilation context
pub struct BetaReducer<'a> {
    ctx: &'a mut CompilationContext,
    scopes: ScopeStack,
}

impl<'a> BetaReducer<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        BetaReducer {
            ctx,
            scopes: ScopeStack::new(),
        }
    }

    /// Reduce every closure application in `expr`
    pub fn reduce(&mut self, expr: &Expr) -> CompileResult<Expr> {
        let result = self.transform(expr)?;
        self.scopes.must_be_empty()?;
        Ok(result)
    }

    /// Bind `name` in the innermost scope; returns the name the binder gets.
    /// A fresh name never collides with `avoid` (the free variables of the
    /// binder's body) or with anything a live replacement mentions.
    fn bind(&mut self, name: &str, avoid: &HashSet<String>) -> CompileResult<String> {
        if self.scopes.would_capture(name) {
            let prefix = format!("{name}_");
            let mut fresh = self.ctx.temp_name(&prefix);
            while avoid.contains(&fresh) || self.scopes.would_capture(&fresh) {
                fresh = self.ctx.temp_name(&prefix);
            }
            self.scopes.rename(name, &fresh)?;
            tracing::trace!(name, fresh = %fresh, "binder_renamed");
            Ok(fresh)
        } else {
            self.scopes.tombstone(name)?;
            Ok(name.to_string())
        }
    }

    fn inline(&mut self, params: &[Param], body: &Expr, args: Vec<Expr>) -> CompileResult<Expr> {
        if params.len() != args.len() {
            return Err(CompileError::construction(format!(
                "closure with {} parameters called with {} arguments",
                params.len(),
                args.len()
            )));
        }
        self.scopes.push();
        for (param, arg) in params.iter().zip(args) {
            self.scopes.substitute(&param.name, arg)?;
        }
        let result = self.transform(body);
        self.scopes.pop()?;
        result
    }
}

impl ExprRewriter for BetaReducer<'_> {
    fn rewrite_var(&mut self, expr: &Expr, name: &str) -> CompileResult<Expr> {
        match self.scopes.lookup(name) {
            Binding::Replace(replacement) => Ok(replacement.clone()),
            Binding::Renamed(fresh) => Ok(Expr::var(fresh, expr.ty().clone())),
            Binding::Shadowed | Binding::Free => Ok(expr.clone()),
        }
    }

    fn rewrite_apply(&mut self, expr: &Expr, function: &Expr, args: &[Expr]) -> CompileResult<Expr> {
        let new_args = self.transform_all(args)?;
        if let Some((params, body)) = function.as_closure() {
            return self.inline(params, body, new_args);
        }

        let new_function = self.transform(function)?;
        if let Some((params, body)) = new_function.as_closure() {
            // A closure produced by substitution is already closed over the
            // current scopes; reduce it against its own arguments only.
            let outer = std::mem::take(&mut self.scopes);
            let result = self.inline(params, body, new_args);
            self.scopes = outer;
            return result;
        }

        let unchanged = Expr::ptr_eq(function, &new_function)
            && args.iter().zip(&new_args).all(|(a, b)| Expr::ptr_eq(a, b));
        if unchanged {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Apply {
            function: new_function,
            args: new_args,
        }))
    }

    fn rewrite_closure(&mut self, expr: &Expr, params: &[Param], body: &Expr) -> CompileResult<Expr> {
        self.scopes.push();
        let avoid = body.free_variables();
        let mut new_params = Vec::with_capacity(params.len());
        for param in params {
            let name = self.bind(&param.name, &avoid)?;
            new_params.push(Param::new(name, param.ty.clone()));
        }
        let new_body = self.transform(body);
        self.scopes.pop()?;
        Ok(rebuild_closure(expr, params, body, new_params, new_body?))
    }

    fn rewrite_block(&mut self, expr: &Expr, statements: &[Statement], result: Option<&Expr>) -> CompileResult<Expr> {
        self.scopes.push();
        let avoid = expr.free_variables();
        let outcome = (|| -> CompileResult<(Vec<Statement>, Option<Expr>)> {
            let mut new_statements = Vec::with_capacity(statements.len());
            for statement in statements {
                new_statements.push(match statement {
                    Statement::Let {
                        name,
                        ty,
                        init,
                        mutable,
                    } => {
                        // the initializer is evaluated before the name is bound
                        let init = self.transform_option(init.as_ref())?;
                        Statement::Let {
                            name: self.bind(name, &avoid)?,
                            ty: ty.clone(),
                            init,
                            mutable: *mutable,
                        }
                    }
                    Statement::Expr(e) => Statement::Expr(self.transform(e)?),
                });
            }
            let new_result = self.transform_option(result)?;
            Ok((new_statements, new_result))
        })();
        self.scopes.pop()?;
        let (new_statements, new_result) = outcome?;
        Ok(rebuild_block(expr, statements, result, new_statements, new_result))
    }

    fn rewrite_match(&mut self, expr: &Expr, scrutinee: &Expr, arms: &[MatchArm]) -> CompileResult<Expr> {
        let new_scrutinee = self.transform(scrutinee)?;
        let mut new_arms = Vec::with_capacity(arms.len());
        for arm in arms {
            self.scopes.push();
            let avoid = arm.body.free_variables();
            let outcome = (|| -> CompileResult<MatchArm> {
                let mut renames = HashMap::new();
                for name in arm.pattern.bindings() {
                    let bound = self.bind(name, &avoid)?;
                    if bound != name {
                        renames.insert(name.to_string(), bound);
                    }
                }
                let pattern = arm.pattern.rename(&|n: &str| renames.get(n).cloned());
                Ok(MatchArm {
                    pattern,
                    body: self.transform(&arm.body)?,
                })
            })();
            self.scopes.pop()?;
            new_arms.push(outcome?);
        }
        Ok(rebuild_match(expr, scrutinee, arms, new_scrutinee, new_arms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Pattern};
    use crate::types::Type;

    fn beta(expr: &Expr) -> CompileResult<Expr> {
        let mut ctx = CompilationContext::new();
        BetaReducer::new(&mut ctx).reduce(expr)
    }

    #[test]
    fn test_simple_application() {
        let x = Param::new("x", Type::int32());
        let body = Expr::binary(BinaryOp::Add, x.var(), x.var()).unwrap();
        let arg = Expr::var("a", Type::int32());
        let app = Expr::apply(Expr::closure(vec![x], body), vec![arg.clone()]).unwrap();
        let reduced = beta(&app).unwrap();
        let expected = Expr::binary(BinaryOp::Add, arg.clone(), arg).unwrap();
        assert_eq!(reduced, expected);
    }

    #[test]
    fn test_let_shadowing_stops_substitution() {
        // (|x| { let x = 3; x })(7)  ->  { let x = 3; x }
        let x = Param::new("x", Type::int32());
        let body = Expr::block(
            vec![Statement::Let {
                name: "x".into(),
                ty: Type::int32(),
                init: Some(Expr::i32(3)),
                mutable: false,
            }],
            Some(x.var()),
        );
        let app = Expr::apply(Expr::closure(vec![x], body.clone()), vec![Expr::i32(7)]).unwrap();
        assert_eq!(beta(&app).unwrap(), body);
    }

    #[test]
    fn test_let_initializer_sees_outer_binding() {
        // (|x| { let x = x; x })(7)  ->  { let x = 7; x }
        let x = Param::new("x", Type::int32());
        let body = Expr::block(
            vec![Statement::Let {
                name: "x".into(),
                ty: Type::int32(),
                init: Some(x.var()),
                mutable: false,
            }],
            Some(x.var()),
        );
        let app = Expr::apply(Expr::closure(vec![x.clone()], body), vec![Expr::i32(7)]).unwrap();
        let expected = Expr::block(
            vec![Statement::Let {
                name: "x".into(),
                ty: Type::int32(),
                init: Some(Expr::i32(7)),
                mutable: false,
            }],
            Some(x.var()),
        );
        assert_eq!(beta(&app).unwrap(), expected);
    }

    #[test]
    fn test_capture_avoiding_rename() {
        // (|x| |y| x + y)(y)  ->  |y_0| y + y_0
        let x = Param::new("x", Type::int32());
        let y = Param::new("y", Type::int32());
        let inner = Expr::closure(
            vec![y.clone()],
            Expr::binary(BinaryOp::Add, x.var(), y.var()).unwrap(),
        );
        let outer_y = Expr::var("y", Type::int32());
        let app = Expr::apply(Expr::closure(vec![x], inner), vec![outer_y.clone()]).unwrap();
        let reduced = beta(&app).unwrap();

        let (params, body) = reduced.as_closure().unwrap();
        assert_eq!(params[0].name, "y_0");
        let expected_body =
            Expr::binary(BinaryOp::Add, outer_y, Expr::var("y_0", Type::int32())).unwrap();
        assert_eq!(body, &expected_body);
        assert!(reduced.free_variables().contains("y"));
    }

    #[test]
    fn test_fresh_name_avoids_free_variables() {
        // (|x| |y| x + y + y_0)(y) with y_0 free: the binder must not become y_0
        let x = Param::new("x", Type::int32());
        let y = Param::new("y", Type::int32());
        let y_0 = Expr::var("y_0", Type::int32());
        let sum = Expr::binary(BinaryOp::Add, x.var(), y.var()).unwrap();
        let inner = Expr::closure(
            vec![y.clone()],
            Expr::binary(BinaryOp::Add, sum, y_0.clone()).unwrap(),
        );
        let outer_y = Expr::var("y", Type::int32());
        let app = Expr::apply(Expr::closure(vec![x], inner), vec![outer_y.clone()]).unwrap();
        let reduced = beta(&app).unwrap();

        let (params, body) = reduced.as_closure().unwrap();
        assert_eq!(params[0].name, "y_1");
        let renamed = Expr::var("y_1", Type::int32());
        let expected_body = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, outer_y, renamed).unwrap(),
            y_0,
        )
        .unwrap();
        assert_eq!(body, &expected_body);
        let free = reduced.free_variables();
        assert!(free.contains("y") && free.contains("y_0"), "{free:?}");
    }

    #[test]
    fn test_inner_binder_does_not_capture_renamed_name() {
        // (|x| |y| |y_0| x + y)(y): the inner y_0 binder is renamed too
        let x = Param::new("x", Type::int32());
        let y = Param::new("y", Type::int32());
        let y_0 = Param::new("y_0", Type::int32());
        let innermost = Expr::closure(
            vec![y_0],
            Expr::binary(BinaryOp::Add, x.var(), y.var()).unwrap(),
        );
        let inner = Expr::closure(vec![y], innermost);
        let app = Expr::apply(
            Expr::closure(vec![x], inner),
            vec![Expr::var("y", Type::int32())],
        )
        .unwrap();
        let reduced = beta(&app).unwrap();
        let (outer_params, body) = reduced.as_closure().unwrap();
        let (inner_params, _) = body.as_closure().unwrap();
        assert_eq!(outer_params[0].name, "y_0");
        assert_ne!(inner_params[0].name, "y_0");
        assert_eq!(reduced.free_variables().into_iter().collect::<Vec<_>>(), vec!["y".to_string()]);
    }

    #[test]
    fn test_nested_closure_param_shadows() {
        // (|x| |x| x)(1)  ->  |x| x
        let x = Param::new("x", Type::int32());
        let inner = Expr::closure(vec![x.clone()], x.var());
        let app = Expr::apply(Expr::closure(vec![x], inner.clone()), vec![Expr::i32(1)]).unwrap();
        assert_eq!(beta(&app).unwrap(), inner);
    }

    #[test]
    fn test_match_binding_shadows() {
        // (|x| match v { Some(x) => x, _ => x })(5)
        let x = Param::new("x", Type::int32());
        let m = Expr::match_expr(
            Expr::var("v", Type::int32().nullable()),
            vec![
                MatchArm {
                    pattern: Pattern::Some(Box::new(Pattern::ident("x"))),
                    body: x.var(),
                },
                MatchArm {
                    pattern: Pattern::Wildcard,
                    body: x.var(),
                },
            ],
        )
        .unwrap();
        let app = Expr::apply(Expr::closure(vec![x.clone()], m), vec![Expr::i32(5)]).unwrap();
        let reduced = beta(&app).unwrap();
        let ExprKind::Match { arms, .. } = reduced.kind() else {
            panic!("expected match");
        };
        assert_eq!(arms[0].body, x.var());
        assert_eq!(arms[1].body, Expr::i32(5));
    }

    #[test]
    fn test_closure_produced_by_substitution_is_reduced() {
        // (|f| f(1))(|z| z)  ->  1
        let fn_ty = Type::function(vec![Type::int32()], Type::int32());
        let f = Param::new("f", fn_ty);
        let call = Expr::apply(f.var(), vec![Expr::i32(1)]).unwrap();
        let z = Param::new("z", Type::int32());
        let id = Expr::closure(vec![z.clone()], z.var());
        let app = Expr::apply(Expr::closure(vec![f], call), vec![id]).unwrap();
        assert_eq!(beta(&app).unwrap(), Expr::i32(1));
    }

    #[test]
    fn test_substituted_closure_does_not_see_caller_params() {
        // (|f, y| f(y))(|z| y, 5) where the inner `y` is an outer free variable:
        // result is the outer y, not 5
        let fn_ty = Type::function(vec![Type::int32()], Type::int32());
        let f = Param::new("f", fn_ty);
        let y = Param::new("y", Type::int32());
        let body = Expr::apply(f.var(), vec![y.var()]).unwrap();
        let z = Param::new("z", Type::int32());
        let outer_y = Expr::var("y", Type::int32());
        let arg = Expr::closure(vec![z], outer_y.clone());
        let app = Expr::apply(Expr::closure(vec![f, y], body), vec![arg, Expr::i32(5)]).unwrap();
        assert_eq!(beta(&app).unwrap(), outer_y);
    }

    #[test]
    fn test_untouched_expression_is_shared() {
        let e = Expr::tuple(vec![Expr::var("a", Type::int32()), Expr::i32(1)]);
        assert!(Expr::ptr_eq(&beta(&e).unwrap(), &e));
    }
}
