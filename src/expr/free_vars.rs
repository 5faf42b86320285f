//! Free-variable analysis

use super::{Expr, ExprKind, Literal, Statement};
use std::collections::HashSet;

pub(super) fn free_variables(expr: &Expr) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut bound = Vec::new();
    collect(expr, &mut bound, &mut out);
    out
}

fn is_bound(bound: &[String], name: &str) -> bool {
    bound.iter().any(|b| b == name)
}

fn collect(expr: &Expr, bound: &mut Vec<String>, out: &mut HashSet<String>) {
    match expr.kind() {
        ExprKind::Var(name) => {
            if !is_bound(bound, name) {
                out.insert(name.clone());
            }
        }
        ExprKind::Literal(Literal::ZSet(rows)) => {
            for (row, _) in rows {
                collect(row, bound, out);
            }
        }
        ExprKind::Literal(Literal::Vec(items)) => {
            for item in items {
                collect(item, bound, out);
            }
        }
        ExprKind::Literal(_) => {}
        ExprKind::Field { base, .. } => collect(base, bound, out),
        ExprKind::Unary { operand, .. }
        | ExprKind::Cast(operand)
        | ExprKind::IsNull(operand)
        | ExprKind::Borrow(operand)
        | ExprKind::Deref(operand)
        | ExprKind::Some(operand) => collect(operand, bound, out),
        ExprKind::Binary { left, right, .. } => {
            collect(left, bound, out);
            collect(right, bound, out);
        }
        ExprKind::Apply { function, args } => {
            collect(function, bound, out);
            for arg in args {
                collect(arg, bound, out);
            }
        }
        ExprKind::Call { args, .. } | ExprKind::Tuple(args) | ExprKind::RawTuple(args) => {
            for arg in args {
                collect(arg, bound, out);
            }
        }
        ExprKind::Struct { fields, .. } => {
            for field in fields {
                collect(field, bound, out);
            }
        }
        ExprKind::Closure { params, body } => {
            let mark = bound.len();
            bound.extend(params.iter().map(|p| p.name.clone()));
            collect(body, bound, out);
            bound.truncate(mark);
        }
        ExprKind::Block { statements, result } => {
            let mark = bound.len();
            for statement in statements {
                match statement {
                    Statement::Let { name, init, .. } => {
                        if let Some(init) = init {
                            collect(init, bound, out);
                        }
                        bound.push(name.clone());
                    }
                    Statement::Expr(e) => collect(e, bound, out),
                }
            }
            if let Some(result) = result {
                collect(result, bound, out);
            }
            bound.truncate(mark);
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect(condition, bound, out);
            collect(then_branch, bound, out);
            collect(else_branch, bound, out);
        }
        ExprKind::Match { scrutinee, arms } => {
            collect(scrutinee, bound, out);
            for arm in arms {
                let mark = bound.len();
                bound.extend(arm.pattern.bindings().into_iter().map(str::to_string));
                collect(&arm.body, bound, out);
                bound.truncate(mark);
            }
        }
        ExprKind::Range { start, end, .. } => {
            for e in start.iter().chain(end.iter()) {
                collect(e, bound, out);
            }
        }
        ExprKind::Fold {
            zero,
            increment,
            post,
        } => {
            collect(zero, bound, out);
            collect(increment, bound, out);
            collect(post, bound, out);
        }
    }
}
