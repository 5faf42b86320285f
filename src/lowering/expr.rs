//! Scalar expression lowering.
//!
//! Plan expressions are evaluated against one row, bound to a closure
//! parameter of type `&Tuple<..>`. Operators on non-null operands with a
//! native spelling stay native; everything else becomes a call to the
//! specialized runtime function from the primitive table.
//!
//! ```text
//! a > 0      a: i32            ->  (t.0 > 0)
//! a > 0      a: Option<i32>    ->  gt_i32N_i32(t.0, 0)
//! a + NULL   a: i32            ->  plus_i32_i32N(t.0, (null as Option<i32>))
//! ```

use crate::error::{CompileError, CompileResult};
use crate::expr::{BinaryOp, Expr, Literal, UnaryOp};
use crate::plan::{CaseBranch, ScalarExpr, UnaryOperator, Value};
use crate::primitives::{self, UnaryPrimitive};
use crate::types::{IntWidth, Type, TypeKind};

/// Lower `expr` over the row `row`
pub fn lower_scalar(expr: &ScalarExpr, row: &Expr) -> CompileResult<Expr> {
    match expr {
        ScalarExpr::Column { index } => Expr::field(row.clone(), *index),
        ScalarExpr::Literal { value, ty } => lower_literal(value, ty),
        ScalarExpr::Unary { op, operand } => lower_unary(*op, lower_scalar(operand, row)?),
        ScalarExpr::Binary { op, left, right } => {
            binary(*op, lower_scalar(left, row)?, lower_scalar(right, row)?)
        }
        ScalarExpr::Cast { operand, ty } => {
            let operand = lower_scalar(operand, row)?;
            if operand.ty().same(ty) {
                return Ok(operand);
            }
            Ok(Expr::cast(operand, ty.clone()))
        }
        ScalarExpr::Case {
            branches,
            otherwise,
        } => lower_case(branches, otherwise, row),
    }
}

/// Lower a filter or join condition to a non-null `bool`.
/// SQL keeps a row only when its condition is true, so NULL counts as false.
pub fn lower_condition(expr: &ScalarExpr, row: &Expr) -> CompileResult<Expr> {
    let lowered = lower_scalar(expr, row)?;
    let ty = lowered.ty();
    if ty.is_null_type() {
        return Ok(Expr::bool(false));
    }
    if !ty.is_bool() {
        return Err(CompileError::construction(format!(
            "condition has type {ty}, expected bool"
        )));
    }
    if ty.may_be_null {
        return call_unary(UnaryPrimitive::IsTrue, lowered);
    }
    Ok(lowered)
}

/// A literal of the given type; non-null values of a nullable type are
/// wrapped in `Some`
pub fn lower_literal(value: &Value, ty: &Type) -> CompileResult<Expr> {
    if matches!(value, Value::Null) {
        let ty = if ty.is_null_type() { ty.clone() } else { ty.nullable() };
        return Ok(Expr::literal(Literal::Null, ty));
    }
    let base = ty.non_null();
    let literal = match (value, &base.kind) {
        (Value::Bool(b), TypeKind::Bool) => Literal::Bool(*b),
        (Value::Int(i), TypeKind::Integer(width)) => {
            let fits = match width {
                IntWidth::W16 => i16::try_from(*i).is_ok(),
                IntWidth::W32 => i32::try_from(*i).is_ok(),
                IntWidth::W64 => true,
            };
            if !fits {
                return Err(CompileError::construction(format!(
                    "literal {i} out of range for {ty}"
                )));
            }
            Literal::Int(*i)
        }
        (Value::Int(i), TypeKind::USize) => Literal::USize(u64::try_from(*i).map_err(|_| {
            CompileError::construction(format!("negative literal {i} of type {ty}"))
        })?),
        (Value::Int(i), TypeKind::Decimal { .. }) => Literal::Decimal(i.to_string()),
        (Value::Int(i), TypeKind::Float | TypeKind::Double) => Literal::Float(*i as f64),
        (Value::Float(x), TypeKind::Float | TypeKind::Double) => Literal::Float(*x),
        (Value::Decimal(d), TypeKind::Decimal { .. }) => Literal::Decimal(d.clone()),
        (Value::String(s), TypeKind::String) => Literal::String(s.clone()),
        (Value::Date(d), TypeKind::Date) => Literal::Date(*d),
        (Value::Timestamp(ts), TypeKind::Timestamp) => Literal::Timestamp(*ts),
        _ => {
            return Err(CompileError::construction(format!(
                "literal {value:?} cannot have type {ty}"
            )))
        }
    };
    let expr = Expr::literal(literal, base);
    if ty.may_be_null {
        Expr::some(expr)
    } else {
        Ok(expr)
    }
}

fn call_unary(op: UnaryPrimitive, operand: Expr) -> CompileResult<Expr> {
    let function = primitives::unary(op, operand.ty())?;
    Ok(Expr::call(function.name, vec![operand], function.result))
}

fn lower_unary(op: UnaryOperator, operand: Expr) -> CompileResult<Expr> {
    // NULL stands for an unknown boolean in the predicates
    let operand = if operand.ty().is_null_type() {
        match op {
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => operand,
            UnaryOperator::Neg => return Ok(operand),
            _ => Expr::cast(operand, Type::bool().nullable()),
        }
    } else {
        operand
    };
    let nullable = operand.ty().may_be_null;
    match op {
        UnaryOperator::IsNull => Ok(Expr::is_null(operand)),
        UnaryOperator::IsNotNull => Expr::unary(UnaryOp::Not, Expr::is_null(operand)),
        UnaryOperator::Not if !nullable => Expr::unary(UnaryOp::Not, operand),
        UnaryOperator::Not => call_unary(UnaryPrimitive::Not, operand),
        UnaryOperator::Neg if !nullable => Expr::unary(UnaryOp::Neg, operand),
        UnaryOperator::Neg => call_unary(UnaryPrimitive::Neg, operand),
        UnaryOperator::IsTrue | UnaryOperator::IsNotFalse if !nullable => Ok(operand),
        UnaryOperator::IsFalse | UnaryOperator::IsNotTrue if !nullable => {
            Expr::unary(UnaryOp::Not, operand)
        }
        UnaryOperator::IsTrue => call_unary(UnaryPrimitive::IsTrue, operand),
        UnaryOperator::IsFalse => call_unary(UnaryPrimitive::IsFalse, operand),
        UnaryOperator::IsNotTrue => call_unary(UnaryPrimitive::IsNotTrue, operand),
        UnaryOperator::IsNotFalse => call_unary(UnaryPrimitive::IsNotFalse, operand),
    }
}

/// `left op right`, native when both operands are non-null and the
/// operator has an infix form, otherwise a primitive call
pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> CompileResult<Expr> {
    let (left, right) = match (left.ty().is_null_type(), right.ty().is_null_type()) {
        (true, true) => return Ok(Expr::null()),
        (true, false) => {
            let ty = right.ty().nullable();
            (Expr::cast(left, ty), right)
        }
        (false, true) => {
            let ty = left.ty().nullable();
            (left, Expr::cast(right, ty))
        }
        (false, false) => (left, right),
    };
    if op.is_native() && !left.ty().may_be_null && !right.ty().may_be_null {
        return Expr::binary(op, left, right);
    }
    let function = primitives::binary(op, left.ty(), right.ty())?;
    Ok(Expr::call(function.name, vec![left, right], function.result))
}

fn lower_case(branches: &[CaseBranch], otherwise: &ScalarExpr, row: &Expr) -> CompileResult<Expr> {
    let mut arms = Vec::with_capacity(branches.len());
    for branch in branches {
        arms.push((
            lower_condition(&branch.when, row)?,
            lower_scalar(&branch.then, row)?,
        ));
    }
    let otherwise = lower_scalar(otherwise, row)?;

    let values = arms.iter().map(|(_, then)| then).chain(std::iter::once(&otherwise));
    let mut shape: Option<Type> = None;
    let mut nullable = false;
    for value in values {
        if value.ty().is_null_type() {
            nullable = true;
            continue;
        }
        nullable |= value.ty().may_be_null;
        match &shape {
            None => shape = Some(value.ty().non_null()),
            Some(s) if s.same_shape(value.ty()) => {}
            Some(s) => {
                return Err(CompileError::construction(format!(
                    "CASE branches have types {s} and {}",
                    value.ty()
                )))
            }
        }
    }
    let Some(shape) = shape else {
        return Ok(Expr::null());
    };
    let result = shape.with_nullable(nullable);
    let coerce = |value: Expr| -> CompileResult<Expr> {
        if value.ty().is_null_type() {
            Ok(Expr::cast(value, result.clone()))
        } else if result.may_be_null && !value.ty().may_be_null {
            Expr::some(value)
        } else {
            Ok(value)
        }
    };

    let mut expr = coerce(otherwise)?;
    for (condition, then) in arms.into_iter().rev() {
        expr = Expr::if_else(condition, coerce(then)?, expr)?;
    }
    Ok(expr)
}
