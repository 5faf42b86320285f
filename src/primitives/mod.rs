//! # Primitive Operator Table
//!
//! SQL scalar operators are implemented by runtime functions specialized per
//! operand type and nullability. This module names those functions and
//! computes their result types:
//!
//! ```text
//! a + b     a: Option<i32>, b: i32     ->  plus_i32N_i32      : Option<i32>
//! a > b     a: f64, b: f64             ->  gt_d_d             : bool
//! a / b     a: i64, b: i64             ->  div_i64_i64        : Option<i64>
//! is_true(c)  c: Option<bool>          ->  is_true_bN_        : bool
//! ```
//!
//! Nullability propagates: the result is nullable if any operand is.
//! Comparisons return `bool`, division is always nullable (division by
//! zero yields NULL) and the `is_*` predicates never return NULL.

use crate::error::{CompileError, CompileResult};
use crate::expr::BinaryOp;
use crate::types::{Type, TypeKind};

/// A specialized runtime function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescription {
    pub name: String,
    pub result: Type,
}

/// Unary operators implemented by runtime functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryPrimitive {
    Not,
    Neg,
    Abs,
    IsTrue,
    IsFalse,
    IsNotTrue,
    IsNotFalse,
}

impl UnaryPrimitive {
    fn key(self) -> &'static str {
        match self {
            UnaryPrimitive::Not => "not",
            UnaryPrimitive::Neg => "neg",
            UnaryPrimitive::Abs => "abs",
            UnaryPrimitive::IsTrue => "is_true",
            UnaryPrimitive::IsFalse => "is_false",
            UnaryPrimitive::IsNotTrue => "is_not_true",
            UnaryPrimitive::IsNotFalse => "is_not_false",
        }
    }

    fn is_predicate(self) -> bool {
        matches!(
            self,
            UnaryPrimitive::IsTrue
                | UnaryPrimitive::IsFalse
                | UnaryPrimitive::IsNotTrue
                | UnaryPrimitive::IsNotFalse
        )
    }
}

/// Operand families sharing one operator table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Boolean,
    Arithmetic,
    Floating,
    String,
    Temporal,
}

fn family(ty: &Type) -> Option<Family> {
    match ty.kind {
        TypeKind::Bool => Some(Family::Boolean),
        TypeKind::Integer(_) | TypeKind::Decimal { .. } | TypeKind::USize => Some(Family::Arithmetic),
        TypeKind::Float | TypeKind::Double => Some(Family::Floating),
        TypeKind::String => Some(Family::String),
        TypeKind::Date | TypeKind::Timestamp => Some(Family::Temporal),
        _ => None,
    }
}

/// Runtime name of a binary operator
pub fn binary_key(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "plus",
        BinaryOp::Sub => "minus",
        BinaryOp::Mul => "times",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Eq => "eq",
        BinaryOp::Neq => "neq",
        BinaryOp::Lt => "lt",
        BinaryOp::Gt => "gt",
        BinaryOp::Lte => "lte",
        BinaryOp::Gte => "gte",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::BitAnd => "band",
        BinaryOp::BitOr => "bor",
        BinaryOp::BitXor => "bxor",
        BinaryOp::Shl => "shiftl",
        BinaryOp::Shr => "shiftr",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
        BinaryOp::IsDistinct => "is_distinct",
    }
}

fn supports(family: Family, op: BinaryOp) -> bool {
    use BinaryOp::*;
    match family {
        Family::Boolean => matches!(op, Eq | Neq | And | Or | Min | Max | IsDistinct),
        Family::Arithmetic => !matches!(op, And | Or),
        Family::Floating => !matches!(op, And | Or | Mod | Shl | Shr | BitAnd | BitOr | BitXor),
        Family::String => matches!(op, Eq | Neq | IsDistinct),
        Family::Temporal => op.is_comparison() || matches!(op, Min | Max),
    }
}

fn null_suffix(ty: &Type) -> &'static str {
    if ty.may_be_null {
        "N"
    } else {
        ""
    }
}

fn unsupported(what: &str, ty: &Type) -> CompileError {
    CompileError::unimplemented(ty.to_string(), format!("could not find `{what}` for type {ty}"))
}

/// Specialization of a binary operator for the given operand types
pub fn binary(op: BinaryOp, left: &Type, right: &Type) -> CompileResult<FunctionDescription> {
    let fam = family(left).ok_or_else(|| unsupported(op.symbol(), left))?;
    if !supports(fam, op) {
        return Err(unsupported(op.symbol(), left));
    }
    let shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr);
    let compatible = if shift {
        matches!(right.kind, TypeKind::Integer(_))
    } else {
        left.same_shape(right)
    };
    if !compatible {
        return Err(CompileError::construction(format!(
            "operands of `{}` have types {left} and {right}",
            op.symbol()
        )));
    }

    let any_null = left.may_be_null || right.may_be_null;
    let result = if op == BinaryOp::IsDistinct {
        Type::bool()
    } else if op.is_comparison() {
        Type::bool().with_nullable(any_null)
    } else if op == BinaryOp::Div {
        left.nullable()
    } else {
        left.with_nullable(any_null)
    };

    let name = if op == BinaryOp::IsDistinct {
        format!("is_distinct_{}_{}", null_suffix(left), null_suffix(right))
    } else {
        format!(
            "{}_{}{}_{}{}",
            binary_key(op),
            left.short_name().unwrap_or_default(),
            null_suffix(left),
            right.short_name().unwrap_or_default(),
            null_suffix(right)
        )
    };
    Ok(FunctionDescription { name, result })
}

/// Specialization of a unary operator
pub fn unary(op: UnaryPrimitive, operand: &Type) -> CompileResult<FunctionDescription> {
    let fam = family(operand).ok_or_else(|| unsupported(op.key(), operand))?;
    let ok = match op {
        UnaryPrimitive::Neg | UnaryPrimitive::Abs => {
            matches!(fam, Family::Arithmetic | Family::Floating)
        }
        _ => fam == Family::Boolean,
    };
    if !ok {
        return Err(unsupported(op.key(), operand));
    }
    let result = if op.is_predicate() {
        Type::bool()
    } else {
        operand.clone()
    };
    let name = format!(
        "{}_{}{}_",
        op.key(),
        operand.short_name().unwrap_or_default(),
        null_suffix(operand)
    );
    Ok(FunctionDescription { name, result })
}

/// Accumulation step of an aggregate: `acc op value`, both of the accumulator's shape.
/// Aggregate helpers are generic over the numeric type, so only nullability
/// appears in the name.
pub fn aggregate(op: BinaryOp, accumulator: &Type, value: &Type) -> CompileResult<FunctionDescription> {
    if !matches!(op, BinaryOp::Add | BinaryOp::Min | BinaryOp::Max) {
        return Err(unsupported(op.symbol(), accumulator));
    }
    let fam = family(accumulator).ok_or_else(|| unsupported(op.symbol(), accumulator))?;
    if op == BinaryOp::Add && !matches!(fam, Family::Arithmetic | Family::Floating) {
        return Err(unsupported(op.symbol(), accumulator));
    }
    if !accumulator.same_shape(value) {
        return Err(CompileError::construction(format!(
            "aggregate `{}` of {value} into accumulator {accumulator}",
            binary_key(op)
        )));
    }
    let any_null = accumulator.may_be_null || value.may_be_null;
    Ok(FunctionDescription {
        name: format!(
            "agg_{}_{}_{}",
            binary_key(op),
            null_suffix(accumulator),
            null_suffix(value)
        ),
        result: accumulator.with_nullable(any_null),
    })
}

const BINARY_OPS: [BinaryOp; 21] = [
    BinaryOp::Eq,
    BinaryOp::Neq,
    BinaryOp::Lt,
    BinaryOp::Gt,
    BinaryOp::Lte,
    BinaryOp::Gte,
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mod,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Shr,
    BinaryOp::Shl,
    BinaryOp::BitAnd,
    BinaryOp::BitOr,
    BinaryOp::BitXor,
    BinaryOp::Min,
    BinaryOp::Max,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::IsDistinct,
];

/// Every binary specialization the runtime must provide for the scalar
/// types the compiler emits, each operand in both nullabilities
pub fn specializations() -> Vec<FunctionDescription> {
    let scalars = [
        Type::bool(),
        Type::int16(),
        Type::int32(),
        Type::int64(),
        Type::float(),
        Type::double(),
        Type::string(),
        Type::date(),
        Type::timestamp(),
    ];
    let mut out = Vec::new();
    for ty in &scalars {
        for op in BINARY_OPS {
            let right = if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
                Type::int32()
            } else {
                ty.clone()
            };
            for (ln, rn) in [(false, false), (false, true), (true, false), (true, true)] {
                if let Ok(desc) = binary(op, &ty.with_nullable(ln), &right.with_nullable(rn)) {
                    out.push(desc);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_plus() {
        let d = binary(BinaryOp::Add, &Type::int32().nullable(), &Type::int32()).unwrap();
        assert_eq!(d.name, "plus_i32N_i32");
        assert!(d.result.same(&Type::int32().nullable()));
    }

    #[test]
    fn test_comparison_returns_bool() {
        let d = binary(BinaryOp::Gt, &Type::double(), &Type::double()).unwrap();
        assert_eq!(d.name, "gt_d_d");
        assert!(d.result.same(&Type::bool()));
        let d = binary(BinaryOp::Eq, &Type::string().nullable(), &Type::string()).unwrap();
        assert!(d.result.same(&Type::bool().nullable()));
    }

    #[test]
    fn test_division_always_nullable() {
        let d = binary(BinaryOp::Div, &Type::int64(), &Type::int64()).unwrap();
        assert!(d.result.same(&Type::int64().nullable()));
    }

    #[test]
    fn test_is_distinct_never_null() {
        let d = binary(BinaryOp::IsDistinct, &Type::int32().nullable(), &Type::int32()).unwrap();
        assert_eq!(d.name, "is_distinct_N_");
        assert!(d.result.same(&Type::bool()));
    }

    #[test]
    fn test_unknown_combination_is_unimplemented() {
        let err = binary(BinaryOp::Lt, &Type::string(), &Type::string()).unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
        let err = binary(BinaryOp::Mod, &Type::double(), &Type::double()).unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
        let err = binary(BinaryOp::Add, &Type::zset(Type::int32()), &Type::zset(Type::int32()))
            .unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
    }

    #[test]
    fn test_mismatched_operands_rejected() {
        let err = binary(BinaryOp::Add, &Type::int32(), &Type::int64()).unwrap_err();
        assert!(matches!(err, CompileError::IrConstruction(_)));
        // shifts take any integer amount
        assert!(binary(BinaryOp::Shl, &Type::int64(), &Type::int32()).is_ok());
    }

    #[test]
    fn test_unary_predicates() {
        let d = unary(UnaryPrimitive::IsTrue, &Type::bool().nullable()).unwrap();
        assert_eq!(d.name, "is_true_bN_");
        assert!(d.result.same(&Type::bool()));
        let d = unary(UnaryPrimitive::Neg, &Type::int16().nullable()).unwrap();
        assert!(d.result.same(&Type::int16().nullable()));
        assert!(unary(UnaryPrimitive::Not, &Type::int32()).is_err());
    }

    #[test]
    fn test_aggregate_step() {
        let d = aggregate(BinaryOp::Add, &Type::int64().nullable(), &Type::int64()).unwrap();
        assert_eq!(d.name, "agg_plus_N_");
        assert!(d.result.same(&Type::int64().nullable()));
        assert!(aggregate(BinaryOp::Mul, &Type::int64(), &Type::int64()).is_err());
    }

    #[test]
    fn test_specializations_cover_every_nullability() {
        let all = specializations();
        for name in ["plus_i32_i32", "plus_i32N_i32", "plus_i32_i32N", "plus_i32N_i32N"] {
            assert!(all.iter().any(|d| d.name == name), "missing {name}");
        }
        assert!(!all.iter().any(|d| d.name.starts_with("mod_d")));
    }
}
