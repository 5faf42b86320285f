//! # Expression IR
//!
//! Typed, immutable expression trees embedded in circuit operators.
//!
//! An `Expr` is a cheap handle (`Arc`) to an `ExprNode` holding the node kind
//! and its resolved `Type`. Sub-trees are shared between operators and passes
//! without copying; rewrites rebuild only the spine above a changed child, so
//! `Expr::ptr_eq` tells a pass whether anything below a node was touched.
//!
//! Constructors compute and check the result type. A mismatch is an
//! `IrConstruction` error: the caller built an inconsistent tree.
//!
//! ```text
//! |t: &Tuple2<Option<i32>, i32>| plus_i32N_i32(t.0, t.1)
//!   Closure
//!   ├── Param t: &Tuple2<Option<i32>, i32>
//!   └── Call plus_i32N_i32 : Option<i32>
//!       ├── Field 0 (Var t)
//!       └── Field 1 (Var t)
//! ```

pub mod beta;
mod display;
mod free_vars;
pub mod rewrite;
pub mod simplify;
pub mod substitution;

pub use beta::BetaReducer;
pub use rewrite::ExprRewriter;
pub use simplify::Simplifier;
pub use substitution::{Binding, ScopeStack};

use crate::error::{CompileError, CompileResult};
use crate::primitives;
use crate::types::{Type, TypeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Literal values. `Null` under a nullable type `T` is `None::<T>`;
/// under `Type::null()` it is the untyped SQL `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Any signed integer width; the width comes from the literal's type
    Int(i64),
    Float(f64),
    /// Decimal in its canonical text form
    Decimal(String),
    String(String),
    /// Days since the epoch
    Date(i32),
    /// Milliseconds since the epoch
    Timestamp(i64),
    /// Milliseconds
    Interval(i64),
    USize(u64),
    /// Rows with their weights
    ZSet(Vec<(Expr, i64)>),
    Vec(Vec<Expr>),
}

/// Unary operators with a native spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

/// SQL binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Min,
    Max,
    IsDistinct,
}

impl BinaryOp {
    /// Infix spelling, or the runtime name for operators without one
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::IsDistinct => "is_distinct",
        }
    }

    /// Whether non-null operands can use the infix operator directly.
    /// Division is excluded: it yields NULL on a zero divisor.
    pub fn is_native(self) -> bool {
        !matches!(
            self,
            BinaryOp::Div | BinaryOp::Min | BinaryOp::Max | BinaryOp::IsDistinct
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Lte
                | BinaryOp::Gte
                | BinaryOp::IsDistinct
        )
    }
}

/// A closure parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Param {
            name: name.into(),
            ty,
        }
    }

    /// Reference to this parameter inside the closure body
    pub fn var(&self) -> Expr {
        Expr::var(self.name.clone(), self.ty.clone())
    }
}

/// Block statements
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let {
        name: String,
        ty: Type,
        init: Option<Expr>,
        mutable: bool,
    },
    Expr(Expr),
}

/// Match patterns
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Identifier { name: String, mutable: bool },
    Wildcard,
    Tuple(Vec<Pattern>),
    Some(Box<Pattern>),
    Literal(Literal),
}

impl Pattern {
    pub fn ident(name: impl Into<String>) -> Self {
        Pattern::Identifier {
            name: name.into(),
            mutable: false,
        }
    }

    /// Names bound by this pattern, left to right
    pub fn bindings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Identifier { name, .. } => out.push(name),
            Pattern::Tuple(items) => items.iter().for_each(|p| p.collect_bindings(out)),
            Pattern::Some(inner) => inner.collect_bindings(out),
            Pattern::Wildcard | Pattern::Literal(_) => {}
        }
    }

    /// Same pattern with identifiers renamed through `rename`
    pub fn rename(&self, rename: &impl Fn(&str) -> Option<String>) -> Pattern {
        match self {
            Pattern::Identifier { name, mutable } => Pattern::Identifier {
                name: rename(name).unwrap_or_else(|| name.clone()),
                mutable: *mutable,
            },
            Pattern::Tuple(items) => Pattern::Tuple(items.iter().map(|p| p.rename(rename)).collect()),
            Pattern::Some(inner) => Pattern::Some(Box::new(inner.rename(rename))),
            Pattern::Wildcard | Pattern::Literal(_) => self.clone(),
        }
    }
}

/// One arm of a `match`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Var(String),
    /// Positional field of a tuple, raw tuple or struct (auto-derefs)
    Field { base: Expr, index: usize },
    Unary { op: UnaryOp, operand: Expr },
    Binary { op: BinaryOp, left: Expr, right: Expr },
    /// Application of a closure-valued expression
    Apply { function: Expr, args: Vec<Expr> },
    /// Call to a named runtime primitive
    Call { function: String, args: Vec<Expr> },
    Closure { params: Vec<Param>, body: Expr },
    Tuple(Vec<Expr>),
    RawTuple(Vec<Expr>),
    Struct { name: String, fields: Vec<Expr> },
    Block {
        statements: Vec<Statement>,
        result: Option<Expr>,
    },
    If {
        condition: Expr,
        then_branch: Expr,
        else_branch: Expr,
    },
    Match { scrutinee: Expr, arms: Vec<MatchArm> },
    /// Conversion to the node's type
    Cast(Expr),
    IsNull(Expr),
    Borrow(Expr),
    Deref(Expr),
    Range {
        start: Option<Expr>,
        end: Option<Expr>,
        inclusive: bool,
    },
    Some(Expr),
    /// Aggregate descriptor: initial accumulator, `|acc, row, weight|` step,
    /// and `|acc|` post-processing
    Fold { zero: Expr, increment: Expr, post: Expr },
}

/// A typed expression node
#[derive(Debug, PartialEq)]
pub struct ExprNode {
    kind: ExprKind,
    ty: Type,
}

/// Shared handle to an immutable expression
#[derive(Debug, Clone)]
pub struct Expr(Arc<ExprNode>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

fn mismatch(what: &str, expected: &Type, found: &Type) -> CompileError {
    CompileError::construction(format!("{what}: expected {expected}, found {found}"))
}

impl Expr {
    fn make(kind: ExprKind, ty: Type) -> Expr {
        Expr(Arc::new(ExprNode { kind, ty }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    /// True when both handles point at the same node
    pub fn ptr_eq(a: &Expr, b: &Expr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// A node of the same type with a new kind. Rewrites use this so that
    /// the declared type survives every transformation.
    pub(crate) fn with_kind(&self, kind: ExprKind) -> Expr {
        Expr::make(kind, self.ty().clone())
    }

    // Literals

    pub fn literal(value: Literal, ty: Type) -> Expr {
        Expr::make(ExprKind::Literal(value), ty)
    }

    pub fn bool(value: bool) -> Expr {
        Expr::literal(Literal::Bool(value), Type::bool())
    }

    pub fn int(value: i64, ty: Type) -> CompileResult<Expr> {
        if !matches!(ty.kind, TypeKind::Integer(_)) {
            return Err(CompileError::construction(format!(
                "integer literal {value} with non-integer type {ty}"
            )));
        }
        Ok(Expr::literal(Literal::Int(value), ty))
    }

    pub fn i32(value: i32) -> Expr {
        Expr::literal(Literal::Int(i64::from(value)), Type::int32())
    }

    pub fn i64(value: i64) -> Expr {
        Expr::literal(Literal::Int(value), Type::int64())
    }

    pub fn usize(value: u64) -> Expr {
        Expr::literal(Literal::USize(value), Type::usize())
    }

    pub fn double(value: f64) -> Expr {
        Expr::literal(Literal::Float(value), Type::double())
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::literal(Literal::String(value.into()), Type::string())
    }

    /// `None` of type `Option<T>`
    pub fn none(ty: &Type) -> Expr {
        Expr::literal(Literal::Null, ty.nullable())
    }

    /// The untyped SQL `NULL`
    pub fn null() -> Expr {
        Expr::literal(Literal::Null, Type::null())
    }

    /// ZSet literal with the given element type and weighted rows
    pub fn zset(element: Type, rows: Vec<(Expr, i64)>) -> CompileResult<Expr> {
        for (row, _) in &rows {
            if !row.ty().same(&element) {
                return Err(mismatch("zset literal row", &element, row.ty()));
            }
        }
        Ok(Expr::literal(Literal::ZSet(rows), Type::zset(element)))
    }

    pub fn vec(element: Type, items: Vec<Expr>) -> CompileResult<Expr> {
        for item in &items {
            if !item.ty().same(&element) {
                return Err(mismatch("vec literal item", &element, item.ty()));
            }
        }
        Ok(Expr::literal(Literal::Vec(items), Type::vec(element)))
    }

    // Variables and access

    pub fn var(name: impl Into<String>, ty: Type) -> Expr {
        Expr::make(ExprKind::Var(name.into()), ty)
    }

    /// `base.index`, looking through one reference
    pub fn field(base: Expr, index: usize) -> CompileResult<Expr> {
        let target = base.ty().deref().unwrap_or(base.ty());
        if target.may_be_null {
            return Err(CompileError::construction(format!(
                "field {index} of nullable value of type {target}"
            )));
        }
        let ty = target.field(index).cloned().ok_or_else(|| {
            CompileError::construction(format!("type {target} has no field {index}"))
        })?;
        Ok(Expr::make(ExprKind::Field { base, index }, ty))
    }

    pub fn borrow(operand: Expr) -> Expr {
        let ty = Type::reference(operand.ty().clone());
        Expr::make(ExprKind::Borrow(operand), ty)
    }

    pub fn deref(operand: Expr) -> CompileResult<Expr> {
        let ty = match &operand.ty().kind {
            TypeKind::Ref(inner) => (**inner).clone(),
            TypeKind::Any => Type::any(),
            _ => {
                return Err(CompileError::construction(format!(
                    "dereference of non-reference type {}",
                    operand.ty()
                )))
            }
        };
        Ok(Expr::make(ExprKind::Deref(operand), ty))
    }

    // Operators

    pub fn unary(op: UnaryOp, operand: Expr) -> CompileResult<Expr> {
        let ok = match op {
            UnaryOp::Not => operand.ty().is_bool(),
            UnaryOp::Neg => operand.ty().is_numeric(),
        };
        if !ok {
            return Err(CompileError::construction(format!(
                "operator {} applied to {}",
                op.symbol(),
                operand.ty()
            )));
        }
        let ty = operand.ty().clone();
        Ok(Expr::make(ExprKind::Unary { op, operand }, ty))
    }

    /// Binary operator; the result type comes from the primitive table
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> CompileResult<Expr> {
        let ty = primitives::binary(op, left.ty(), right.ty())?.result;
        Ok(Expr::make(ExprKind::Binary { op, left, right }, ty))
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>, result: Type) -> Expr {
        Expr::make(
            ExprKind::Call {
                function: function.into(),
                args,
            },
            result,
        )
    }

    /// Apply a function-typed expression to arguments
    pub fn apply(function: Expr, args: Vec<Expr>) -> CompileResult<Expr> {
        let (params, result) = function.ty().function_parts().ok_or_else(|| {
            CompileError::construction(format!("apply of non-function type {}", function.ty()))
        })?;
        if params.len() != args.len() {
            return Err(CompileError::construction(format!(
                "closure with {} parameters called with {} arguments",
                params.len(),
                args.len()
            )));
        }
        for (param, arg) in params.iter().zip(&args) {
            if !matches!(param.kind, TypeKind::Any) && !param.same(arg.ty()) {
                return Err(mismatch("closure argument", param, arg.ty()));
            }
        }
        let ty = result.clone();
        Ok(Expr::make(ExprKind::Apply { function, args }, ty))
    }

    pub fn closure(params: Vec<Param>, body: Expr) -> Expr {
        let ty = Type::function(
            params.iter().map(|p| p.ty.clone()).collect(),
            body.ty().clone(),
        );
        Expr::make(ExprKind::Closure { params, body }, ty)
    }

    // Construction

    pub fn tuple(fields: Vec<Expr>) -> Expr {
        let ty = Type::tuple(fields.iter().map(|f| f.ty().clone()).collect());
        Expr::make(ExprKind::Tuple(fields), ty)
    }

    pub fn raw_tuple(fields: Vec<Expr>) -> Expr {
        let ty = Type::raw_tuple(fields.iter().map(|f| f.ty().clone()).collect());
        Expr::make(ExprKind::RawTuple(fields), ty)
    }

    pub fn structure(ty: Type, fields: Vec<Expr>) -> CompileResult<Expr> {
        let (name, declared) = match &ty.kind {
            TypeKind::Struct { name, fields } => (name.clone(), fields),
            _ => {
                return Err(CompileError::construction(format!(
                    "struct expression with non-struct type {ty}"
                )))
            }
        };
        if declared.len() != fields.len() {
            return Err(CompileError::construction(format!(
                "struct {name} has {} fields, {} given",
                declared.len(),
                fields.len()
            )));
        }
        for (field, value) in declared.iter().zip(&fields) {
            if !field.ty.same(value.ty()) {
                return Err(mismatch(&format!("field {name}.{}", field.name), &field.ty, value.ty()));
            }
        }
        Ok(Expr::make(ExprKind::Struct { name, fields }, ty))
    }

    pub fn some(operand: Expr) -> CompileResult<Expr> {
        if operand.ty().may_be_null {
            return Err(CompileError::construction(format!(
                "Some of already nullable type {}",
                operand.ty()
            )));
        }
        let ty = operand.ty().nullable();
        Ok(Expr::make(ExprKind::Some(operand), ty))
    }

    // Control flow

    pub fn block(statements: Vec<Statement>, result: Option<Expr>) -> Expr {
        let ty = result.as_ref().map_or_else(Type::unit, |r| r.ty().clone());
        Expr::make(ExprKind::Block { statements, result }, ty)
    }

    pub fn if_else(condition: Expr, then_branch: Expr, else_branch: Expr) -> CompileResult<Expr> {
        if !condition.ty().same(&Type::bool()) {
            return Err(mismatch("if condition", &Type::bool(), condition.ty()));
        }
        if !then_branch.ty().same_shape(else_branch.ty()) {
            return Err(mismatch("else branch", then_branch.ty(), else_branch.ty()));
        }
        let ty = then_branch
            .ty()
            .with_nullable(then_branch.ty().may_be_null || else_branch.ty().may_be_null);
        Ok(Expr::make(
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            },
            ty,
        ))
    }

    pub fn match_expr(scrutinee: Expr, arms: Vec<MatchArm>) -> CompileResult<Expr> {
        let first = arms
            .first()
            .ok_or_else(|| CompileError::construction("match without arms"))?;
        let mut ty = first.body.ty().clone();
        for arm in &arms[1..] {
            if !arm.body.ty().same_shape(&ty) {
                return Err(mismatch("match arm", &ty, arm.body.ty()));
            }
            ty.may_be_null |= arm.body.ty().may_be_null;
        }
        Ok(Expr::make(ExprKind::Match { scrutinee, arms }, ty))
    }

    pub fn cast(operand: Expr, to: Type) -> Expr {
        Expr::make(ExprKind::Cast(operand), to)
    }

    pub fn is_null(operand: Expr) -> Expr {
        Expr::make(ExprKind::IsNull(operand), Type::bool())
    }

    pub fn range(start: Option<Expr>, end: Option<Expr>, inclusive: bool) -> CompileResult<Expr> {
        let element = match (&start, &end) {
            (Some(s), Some(e)) if !s.ty().same(e.ty()) => {
                return Err(mismatch("range end", s.ty(), e.ty()))
            }
            (Some(s), _) => s.ty().clone(),
            (None, Some(e)) => e.ty().clone(),
            (None, None) => Type::any(),
        };
        Ok(Expr::make(
            ExprKind::Range {
                start,
                end,
                inclusive,
            },
            Type::user("Range", vec![element]),
        ))
    }

    /// Fold over rows of type `row`: `zero: A`, `increment: |A, &row, i64| -> A`,
    /// `post: |A| -> R`. Typed `Fold<row, A, R>`.
    pub fn fold(row: &Type, zero: Expr, increment: Expr, post: Expr) -> CompileResult<Expr> {
        let acc = zero.ty().clone();
        let expected_increment = Type::function(
            vec![acc.clone(), Type::reference(row.clone()), Type::int64()],
            acc.clone(),
        );
        if !increment.ty().same(&expected_increment) {
            return Err(mismatch("fold increment", &expected_increment, increment.ty()));
        }
        let result = match post.ty().function_parts() {
            Some((params, result)) if params.len() == 1 && params[0].same(&acc) => result.clone(),
            _ => {
                return Err(mismatch(
                    "fold post-processing",
                    &Type::function(vec![acc.clone()], Type::any()),
                    post.ty(),
                ))
            }
        };
        let ty = Type::user("Fold", vec![row.clone(), acc, result]);
        Ok(Expr::make(
            ExprKind::Fold {
                zero,
                increment,
                post,
            },
            ty,
        ))
    }

    // Queries

    /// Value of a boolean literal
    pub fn as_bool_literal(&self) -> Option<bool> {
        match self.kind() {
            ExprKind::Literal(Literal::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Parameters and body of a closure
    pub fn as_closure(&self) -> Option<(&[Param], &Expr)> {
        match self.kind() {
            ExprKind::Closure { params, body } => Some((params, body)),
            _ => None,
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self.kind(), ExprKind::Literal(Literal::Null))
    }

    /// Result type of a closure, or of the post step of a fold
    pub fn result_type(&self) -> Option<&Type> {
        match &self.ty().kind {
            TypeKind::Function { result, .. } => Some(result),
            TypeKind::User { name, args } if name == "Fold" => args.get(2),
            _ => None,
        }
    }

    /// Variables referenced but not bound inside this expression
    pub fn free_variables(&self) -> HashSet<String> {
        free_vars::free_variables(self)
    }
}
