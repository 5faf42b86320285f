//! # Expression Rewrite Framework
//!
//! `ExprRewriter` walks every expression kind. Each kind has a `rewrite_*`
//! hook that defaults to the matching `super_*` method, which transforms the
//! children and rebuilds the node only if one of them changed. A pass
//! overrides just the hooks it cares about:
//!
//! ```rust,ignore
//! impl ExprRewriter for Simplifier {
//!     fn rewrite_is_null(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
//!         let rebuilt = self.super_is_null(expr, operand)?;
//!         ...
//!     }
//! }
//! ```
//!
//! The rebuilt node keeps the original's declared type, so `transform`
//! never changes the type of the expression it is given.

use super::{BinaryOp, Expr, ExprKind, Literal, MatchArm, Param, Statement, UnaryOp};
use crate::error::CompileResult;

fn changed(old: &Expr, new: &Expr) -> bool {
    !Expr::ptr_eq(old, new)
}

fn any_changed(old: &[Expr], new: &[Expr]) -> bool {
    old.iter().zip(new).any(|(o, n)| changed(o, n))
}

fn option_changed(old: Option<&Expr>, new: Option<&Expr>) -> bool {
    match (old, new) {
        (Some(o), Some(n)) => changed(o, n),
        (None, None) => false,
        _ => true,
    }
}

/// True if a rewritten statement differs from the original
pub fn statement_changed(old: &Statement, new: &Statement) -> bool {
    match (old, new) {
        (Statement::Let { name: n1, init: i1, .. }, Statement::Let { name: n2, init: i2, .. }) => {
            n1 != n2 || option_changed(i1.as_ref(), i2.as_ref())
        }
        (Statement::Expr(a), Statement::Expr(b)) => changed(a, b),
        _ => true,
    }
}

/// Rebuild a block only if a statement or the result changed
pub fn rebuild_block(
    expr: &Expr,
    old_statements: &[Statement],
    old_result: Option<&Expr>,
    statements: Vec<Statement>,
    result: Option<Expr>,
) -> Expr {
    let statements_changed = old_statements
        .iter()
        .zip(&statements)
        .any(|(o, n)| statement_changed(o, n));
    if !statements_changed && !option_changed(old_result, result.as_ref()) {
        return expr.clone();
    }
    expr.with_kind(ExprKind::Block { statements, result })
}

/// Rebuild a closure only if the parameters or the body changed
pub fn rebuild_closure(expr: &Expr, old_params: &[Param], old_body: &Expr, params: Vec<Param>, body: Expr) -> Expr {
    if old_params == params.as_slice() && !changed(old_body, &body) {
        return expr.clone();
    }
    expr.with_kind(ExprKind::Closure { params, body })
}

/// Rebuild a match only if the scrutinee or any arm changed
pub fn rebuild_match(expr: &Expr, old_scrutinee: &Expr, old_arms: &[MatchArm], scrutinee: Expr, arms: Vec<MatchArm>) -> Expr {
    let arms_changed = old_arms
        .iter()
        .zip(&arms)
        .any(|(o, n)| o.pattern != n.pattern || changed(&o.body, &n.body));
    if !arms_changed && !changed(old_scrutinee, &scrutinee) {
        return expr.clone();
    }
    expr.with_kind(ExprKind::Match { scrutinee, arms })
}

/// Generic expression rewriter. See the module docs.
pub trait ExprRewriter {
    fn transform(&mut self, expr: &Expr) -> CompileResult<Expr> {
        self.super_transform(expr)
    }

    fn transform_all(&mut self, exprs: &[Expr]) -> CompileResult<Vec<Expr>> {
        exprs.iter().map(|e| self.transform(e)).collect()
    }

    fn transform_option(&mut self, expr: Option<&Expr>) -> CompileResult<Option<Expr>> {
        expr.map(|e| self.transform(e)).transpose()
    }

    fn super_transform(&mut self, expr: &Expr) -> CompileResult<Expr> {
        match expr.kind() {
            ExprKind::Literal(literal) => self.rewrite_literal(expr, literal),
            ExprKind::Var(name) => self.rewrite_var(expr, name),
            ExprKind::Field { base, index } => self.rewrite_field(expr, base, *index),
            ExprKind::Unary { op, operand } => self.rewrite_unary(expr, *op, operand),
            ExprKind::Binary { op, left, right } => self.rewrite_binary(expr, *op, left, right),
            ExprKind::Apply { function, args } => self.rewrite_apply(expr, function, args),
            ExprKind::Call { function, args } => self.rewrite_call(expr, function, args),
            ExprKind::Closure { params, body } => self.rewrite_closure(expr, params, body),
            ExprKind::Tuple(fields) => self.rewrite_tuple(expr, fields),
            ExprKind::RawTuple(fields) => self.rewrite_raw_tuple(expr, fields),
            ExprKind::Struct { name, fields } => self.rewrite_struct(expr, name, fields),
            ExprKind::Block { statements, result } => {
                self.rewrite_block(expr, statements, result.as_ref())
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.rewrite_if(expr, condition, then_branch, else_branch),
            ExprKind::Match { scrutinee, arms } => self.rewrite_match(expr, scrutinee, arms),
            ExprKind::Cast(operand) => self.rewrite_cast(expr, operand),
            ExprKind::IsNull(operand) => self.rewrite_is_null(expr, operand),
            ExprKind::Borrow(operand) => self.rewrite_borrow(expr, operand),
            ExprKind::Deref(operand) => self.rewrite_deref(expr, operand),
            ExprKind::Range {
                start,
                end,
                inclusive,
            } => self.rewrite_range(expr, start.as_ref(), end.as_ref(), *inclusive),
            ExprKind::Some(operand) => self.rewrite_some(expr, operand),
            ExprKind::Fold {
                zero,
                increment,
                post,
            } => self.rewrite_fold(expr, zero, increment, post),
        }
    }

    // Hooks

    fn rewrite_literal(&mut self, expr: &Expr, literal: &Literal) -> CompileResult<Expr> {
        self.super_literal(expr, literal)
    }

    fn rewrite_var(&mut self, expr: &Expr, _name: &str) -> CompileResult<Expr> {
        Ok(expr.clone())
    }

    fn rewrite_field(&mut self, expr: &Expr, base: &Expr, index: usize) -> CompileResult<Expr> {
        self.super_field(expr, base, index)
    }

    fn rewrite_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> CompileResult<Expr> {
        self.super_unary(expr, op, operand)
    }

    fn rewrite_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> CompileResult<Expr> {
        self.super_binary(expr, op, left, right)
    }

    fn rewrite_apply(&mut self, expr: &Expr, function: &Expr, args: &[Expr]) -> CompileResult<Expr> {
        self.super_apply(expr, function, args)
    }

    fn rewrite_call(&mut self, expr: &Expr, function: &str, args: &[Expr]) -> CompileResult<Expr> {
        self.super_call(expr, function, args)
    }

    fn rewrite_closure(&mut self, expr: &Expr, params: &[Param], body: &Expr) -> CompileResult<Expr> {
        self.super_closure(expr, params, body)
    }

    fn rewrite_tuple(&mut self, expr: &Expr, fields: &[Expr]) -> CompileResult<Expr> {
        self.super_tuple(expr, fields)
    }

    fn rewrite_raw_tuple(&mut self, expr: &Expr, fields: &[Expr]) -> CompileResult<Expr> {
        self.super_raw_tuple(expr, fields)
    }

    fn rewrite_struct(&mut self, expr: &Expr, name: &str, fields: &[Expr]) -> CompileResult<Expr> {
        self.super_struct(expr, name, fields)
    }

    fn rewrite_block(&mut self, expr: &Expr, statements: &[Statement], result: Option<&Expr>) -> CompileResult<Expr> {
        self.super_block(expr, statements, result)
    }

    fn rewrite_statement(&mut self, statement: &Statement) -> CompileResult<Statement> {
        self.super_statement(statement)
    }

    fn rewrite_if(&mut self, expr: &Expr, condition: &Expr, then_branch: &Expr, else_branch: &Expr) -> CompileResult<Expr> {
        self.super_if(expr, condition, then_branch, else_branch)
    }

    fn rewrite_match(&mut self, expr: &Expr, scrutinee: &Expr, arms: &[MatchArm]) -> CompileResult<Expr> {
        self.super_match(expr, scrutinee, arms)
    }

    fn rewrite_arm(&mut self, arm: &MatchArm) -> CompileResult<MatchArm> {
        Ok(MatchArm {
            pattern: arm.pattern.clone(),
            body: self.transform(&arm.body)?,
        })
    }

    fn rewrite_cast(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        self.super_cast(expr, operand)
    }

    fn rewrite_is_null(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        self.super_is_null(expr, operand)
    }

    fn rewrite_borrow(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        self.super_borrow(expr, operand)
    }

    fn rewrite_deref(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        self.super_deref(expr, operand)
    }

    fn rewrite_range(&mut self, expr: &Expr, start: Option<&Expr>, end: Option<&Expr>, inclusive: bool) -> CompileResult<Expr> {
        self.super_range(expr, start, end, inclusive)
    }

    fn rewrite_some(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        self.super_some(expr, operand)
    }

    fn rewrite_fold(&mut self, expr: &Expr, zero: &Expr, increment: &Expr, post: &Expr) -> CompileResult<Expr> {
        self.super_fold(expr, zero, increment, post)
    }

    // Default traversals

    fn super_literal(&mut self, expr: &Expr, literal: &Literal) -> CompileResult<Expr> {
        match literal {
            Literal::ZSet(rows) => {
                let mut new_rows = Vec::with_capacity(rows.len());
                let mut dirty = false;
                for (row, weight) in rows {
                    let new_row = self.transform(row)?;
                    dirty |= changed(row, &new_row);
                    new_rows.push((new_row, *weight));
                }
                if !dirty {
                    return Ok(expr.clone());
                }
                Ok(expr.with_kind(ExprKind::Literal(Literal::ZSet(new_rows))))
            }
            Literal::Vec(items) => {
                let new_items = self.transform_all(items)?;
                if !any_changed(items, &new_items) {
                    return Ok(expr.clone());
                }
                Ok(expr.with_kind(ExprKind::Literal(Literal::Vec(new_items))))
            }
            _ => Ok(expr.clone()),
        }
    }

    fn super_field(&mut self, expr: &Expr, base: &Expr, index: usize) -> CompileResult<Expr> {
        let new_base = self.transform(base)?;
        if !changed(base, &new_base) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Field {
            base: new_base,
            index,
        }))
    }

    fn super_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Unary {
            op,
            operand: new_operand,
        }))
    }

    fn super_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> CompileResult<Expr> {
        let new_left = self.transform(left)?;
        let new_right = self.transform(right)?;
        if !changed(left, &new_left) && !changed(right, &new_right) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Binary {
            op,
            left: new_left,
            right: new_right,
        }))
    }

    fn super_apply(&mut self, expr: &Expr, function: &Expr, args: &[Expr]) -> CompileResult<Expr> {
        let new_function = self.transform(function)?;
        let new_args = self.transform_all(args)?;
        if !changed(function, &new_function) && !any_changed(args, &new_args) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Apply {
            function: new_function,
            args: new_args,
        }))
    }

    fn super_call(&mut self, expr: &Expr, function: &str, args: &[Expr]) -> CompileResult<Expr> {
        let new_args = self.transform_all(args)?;
        if !any_changed(args, &new_args) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Call {
            function: function.to_string(),
            args: new_args,
        }))
    }

    fn super_closure(&mut self, expr: &Expr, params: &[Param], body: &Expr) -> CompileResult<Expr> {
        let new_body = self.transform(body)?;
        Ok(rebuild_closure(expr, params, body, params.to_vec(), new_body))
    }

    fn super_tuple(&mut self, expr: &Expr, fields: &[Expr]) -> CompileResult<Expr> {
        let new_fields = self.transform_all(fields)?;
        if !any_changed(fields, &new_fields) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Tuple(new_fields)))
    }

    fn super_raw_tuple(&mut self, expr: &Expr, fields: &[Expr]) -> CompileResult<Expr> {
        let new_fields = self.transform_all(fields)?;
        if !any_changed(fields, &new_fields) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::RawTuple(new_fields)))
    }

    fn super_struct(&mut self, expr: &Expr, name: &str, fields: &[Expr]) -> CompileResult<Expr> {
        let new_fields = self.transform_all(fields)?;
        if !any_changed(fields, &new_fields) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Struct {
            name: name.to_string(),
            fields: new_fields,
        }))
    }

    fn super_block(&mut self, expr: &Expr, statements: &[Statement], result: Option<&Expr>) -> CompileResult<Expr> {
        let new_statements = statements
            .iter()
            .map(|s| self.rewrite_statement(s))
            .collect::<CompileResult<Vec<_>>>()?;
        let new_result = self.transform_option(result)?;
        Ok(rebuild_block(expr, statements, result, new_statements, new_result))
    }

    fn super_statement(&mut self, statement: &Statement) -> CompileResult<Statement> {
        match statement {
            Statement::Let {
                name,
                ty,
                init,
                mutable,
            } => Ok(Statement::Let {
                name: name.clone(),
                ty: ty.clone(),
                init: self.transform_option(init.as_ref())?,
                mutable: *mutable,
            }),
            Statement::Expr(e) => Ok(Statement::Expr(self.transform(e)?)),
        }
    }

    fn super_if(&mut self, expr: &Expr, condition: &Expr, then_branch: &Expr, else_branch: &Expr) -> CompileResult<Expr> {
        let new_condition = self.transform(condition)?;
        let new_then = self.transform(then_branch)?;
        let new_else = self.transform(else_branch)?;
        if !changed(condition, &new_condition)
            && !changed(then_branch, &new_then)
            && !changed(else_branch, &new_else)
        {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::If {
            condition: new_condition,
            then_branch: new_then,
            else_branch: new_else,
        }))
    }

    fn super_match(&mut self, expr: &Expr, scrutinee: &Expr, arms: &[MatchArm]) -> CompileResult<Expr> {
        let new_scrutinee = self.transform(scrutinee)?;
        let new_arms = arms
            .iter()
            .map(|arm| self.rewrite_arm(arm))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(rebuild_match(expr, scrutinee, arms, new_scrutinee, new_arms))
    }

    fn super_cast(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Cast(new_operand)))
    }

    fn super_is_null(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::IsNull(new_operand)))
    }

    fn super_borrow(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Borrow(new_operand)))
    }

    fn super_deref(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Deref(new_operand)))
    }

    fn super_range(&mut self, expr: &Expr, start: Option<&Expr>, end: Option<&Expr>, inclusive: bool) -> CompileResult<Expr> {
        let new_start = self.transform_option(start)?;
        let new_end = self.transform_option(end)?;
        if !option_changed(start, new_start.as_ref()) && !option_changed(end, new_end.as_ref()) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Range {
            start: new_start,
            end: new_end,
            inclusive,
        }))
    }

    fn super_some(&mut self, expr: &Expr, operand: &Expr) -> CompileResult<Expr> {
        let new_operand = self.transform(operand)?;
        if !changed(operand, &new_operand) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Some(new_operand)))
    }

    fn super_fold(&mut self, expr: &Expr, zero: &Expr, increment: &Expr, post: &Expr) -> CompileResult<Expr> {
        let new_zero = self.transform(zero)?;
        let new_increment = self.transform(increment)?;
        let new_post = self.transform(post)?;
        if !changed(zero, &new_zero) && !changed(increment, &new_increment) && !changed(post, &new_post) {
            return Ok(expr.clone());
        }
        Ok(expr.with_kind(ExprKind::Fold {
            zero: new_zero,
            increment: new_increment,
            post: new_post,
        }))
    }
}
