//! # Peephole Simplifier
//!
//! Local rewrites that clean up what mechanical lowering leaves behind:
//!
//! - `is_null(e)` -> `false` when `e` cannot be null
//! - `cast(NULL, Option<T>)` -> `None::<T>`
//! - `if true { a } else { b }` -> `a`, `if false { a } else { b }` -> `b`
//! - `true && x` -> `x`, `false && x` -> `false` (either side)
//! - `false || x` -> `x`, `true || x` -> `true` (either side)
//!
//! Rules run bottom-up in a single pass. Parents are visited after their
//! children have been simplified, so one pass reaches a normal form and a
//! second pass is the identity.

use super::rewrite::ExprRewriter;
use super::{BinaryOp, Expr, ExprKind, Literal};
use crate::error::CompileResult;
use crate::types::Type;

#[derive(Debug, Default)]
pub struct Simplifier {
    rewrites: usize,
}

impl Simplifier {
    pub fn new() -> Self {
        Simplifier::default()
    }

    pub fn simplify(&mut self, expr: &Expr) -> CompileResult<Expr> {
        self.transform(expr)
    }

    /// Number of rules that fired so far
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    fn fired(&mut self, result: Expr) -> CompileResult<Expr> {
        self.rewrites += 1;
        Ok(result)
    }
}

impl ExprRewriter for Simplifier {
    fn rewrite_is_null(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let rebuilt = self.super_is_null(expr, operand)?;
        let ExprKind::IsNull(operand) = rebuilt.kind() else {
            return Ok(rebuilt);
        };
        if !operand.ty().may_be_null {
            return self.fired(Expr::bool(false));
        }
        Ok(rebuilt)
    }

    fn rewrite_cast(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let rebuilt = self.super_cast(expr, operand)?;
        let ExprKind::Cast(operand) = rebuilt.kind() else {
            return Ok(rebuilt);
        };
        // A non-nullable target cannot hold NULL; leave that cast to fail at runtime.
        if operand.ty().is_null_type()
            && matches!(operand.kind(), ExprKind::Literal(Literal::Null))
            && rebuilt.ty().may_be_null
        {
            return self.fired(Expr::none(rebuilt.ty()));
        }
        Ok(rebuilt)
    }

    fn rewrite_if(&mut self, expr: &Expr, condition: &Expr, then_branch: &Expr, else_branch: &Expr) -> CompileResult<Expr> {
        let rebuilt = self.super_if(expr, condition, then_branch, else_branch)?;
        let ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } = rebuilt.kind()
        else {
            return Ok(rebuilt);
        };
        let Some(value) = condition.as_bool_literal() else {
            return Ok(rebuilt);
        };
        let chosen = if value { then_branch } else { else_branch };
        if chosen.ty().same(rebuilt.ty()) {
            return self.fired(chosen.clone());
        }
        // the other branch made the `if` nullable
        if rebuilt.ty().same(&chosen.ty().nullable()) {
            return self.fired(Expr::some(chosen.clone())?);
        }
        Ok(rebuilt)
    }

    fn rewrite_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> CompileResult<Expr> {
        let rebuilt = self.super_binary(expr, op, left, right)?;
        if !matches!(op, BinaryOp::And | BinaryOp::Or) || !rebuilt.ty().same(&Type::bool()) {
            return Ok(rebuilt);
        }
        let ExprKind::Binary { left, right, .. } = rebuilt.kind() else {
            return Ok(rebuilt);
        };
        // `absorbing` decides the result on its own; the other literal is neutral
        let absorbing = matches!(op, BinaryOp::Or);
        for (literal, other) in [(left, right), (right, left)] {
            if let Some(value) = literal.as_bool_literal() {
                if value == absorbing {
                    return self.fired(Expr::bool(absorbing));
                }
                if other.ty().same(&Type::bool()) {
                    return self.fired(other.clone());
                }
            }
        }
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Param, Statement};

    fn simplify(expr: &Expr) -> Expr {
        Simplifier::new().simplify(expr).unwrap()
    }

    fn b(name: &str) -> Expr {
        Expr::var(name, Type::bool())
    }

    #[test]
    fn test_is_null_of_non_nullable() {
        let e = Expr::is_null(Expr::i32(5));
        assert_eq!(simplify(&e), Expr::bool(false));
        let n = Expr::is_null(Expr::var("a", Type::int32().nullable()));
        assert!(Expr::ptr_eq(&simplify(&n), &n));
    }

    #[test]
    fn test_cast_of_null_literal() {
        let target = Type::string().nullable();
        let e = Expr::cast(Expr::null(), target.clone());
        let out = simplify(&e);
        assert_eq!(out, Expr::none(&target));
        assert!(out.ty().same(&target));
    }

    #[test]
    fn test_if_with_literal_condition() {
        let e = Expr::if_else(Expr::bool(true), Expr::i32(1), Expr::i32(2)).unwrap();
        assert_eq!(simplify(&e), Expr::i32(1));
        let e = Expr::if_else(Expr::bool(false), Expr::i32(1), Expr::i32(2)).unwrap();
        assert_eq!(simplify(&e), Expr::i32(2));
    }

    #[test]
    fn test_if_keeps_declared_type() {
        let e = Expr::if_else(Expr::bool(true), Expr::i32(1), Expr::none(&Type::int32())).unwrap();
        let out = simplify(&e);
        assert!(out.ty().same(e.ty()));
        assert_eq!(out, Expr::some(Expr::i32(1)).unwrap());
    }

    #[test]
    fn test_and_rules() {
        let t = Expr::bool(true);
        let f = Expr::bool(false);
        let x = b("x");
        let and = |l: &Expr, r: &Expr| Expr::binary(BinaryOp::And, l.clone(), r.clone()).unwrap();
        assert_eq!(simplify(&and(&t, &x)), x);
        assert_eq!(simplify(&and(&x, &t)), x);
        assert_eq!(simplify(&and(&f, &x)), f);
        assert_eq!(simplify(&and(&x, &f)), f);
    }

    #[test]
    fn test_or_rules() {
        let t = Expr::bool(true);
        let f = Expr::bool(false);
        let x = b("x");
        let or = |l: &Expr, r: &Expr| Expr::binary(BinaryOp::Or, l.clone(), r.clone()).unwrap();
        assert_eq!(simplify(&or(&f, &x)), x);
        assert_eq!(simplify(&or(&x, &f)), x);
        assert_eq!(simplify(&or(&t, &x)), t);
        assert_eq!(simplify(&or(&x, &t)), t);
    }

    #[test]
    fn test_rules_compose_bottom_up() {
        // if is_null(5) { x } else { true && y }  ->  y
        let inner = Expr::binary(BinaryOp::And, Expr::bool(true), b("y")).unwrap();
        let e = Expr::if_else(Expr::is_null(Expr::i32(5)), b("x"), inner).unwrap();
        assert_eq!(simplify(&e), b("y"));
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let body = Expr::binary(
            BinaryOp::Or,
            Expr::is_null(Expr::var("a", Type::int64())),
            Expr::binary(BinaryOp::And, b("x"), Expr::bool(true)).unwrap(),
        )
        .unwrap();
        let e = Expr::block(
            vec![Statement::Expr(Expr::cast(Expr::null(), Type::int32().nullable()))],
            Some(Expr::closure(vec![Param::new("x", Type::bool())], body)),
        );
        let once = simplify(&e);
        let twice = simplify(&once);
        assert_eq!(once, twice);
        assert!(Expr::ptr_eq(&once, &twice));
    }

    #[test]
    fn test_counts_rewrites() {
        let mut s = Simplifier::new();
        s.simplify(&Expr::is_null(Expr::i32(1))).unwrap();
        assert_eq!(s.rewrites(), 1);
    }
}
