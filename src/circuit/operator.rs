//! Circuit operators.
//!
//! An operator consumes the streams of its inputs and produces one stream of
//! type `ZSet<T>` or `IndexedZSet<K, V>`. Operators are immutable and shared
//! through `Arc`; a rewrite that changes nothing hands back the same `Arc`.
//!
//! Construction checks the embedded function against the input types:
//!
//! ```text
//! input ZSet<T>             closure parameter  &T
//! input IndexedZSet<K, V>   closure parameter  (&K, &V)
//! join of IndexedZSet<K, L> and IndexedZSet<K, R>
//!                           closure parameters &K, &L, &R
//! ```

use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use crate::expr::Expr;
use crate::types::{Type, TypeKind};
use std::fmt;
use std::sync::Arc;

pub type OperatorRef = Arc<Operator>;

/// Operator kinds
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    /// Input relation
    Source { table: String },
    /// Output relation
    Sink { view: String },
    /// Apply a function to each row
    Map,
    /// Keep the rows satisfying a predicate
    Filter,
    /// Split each row into a `(key, value)` pair
    Index,
    /// Equi-join of two indexed collections on their keys
    Join,
    /// Per-key fold of an indexed collection
    Aggregate,
    /// Per-key fold over a sliding range
    WindowAggregate { window: Expr },
    /// Clamp every positive weight to 1, drop the rest
    Distinct,
    Sum,
    Subtract,
    Negate,
    /// A fixed collection, given as a literal
    Constant,
    Noop,
    /// Running sum of a stream of deltas
    Integrate,
    /// Change of a stream since the previous step
    Differentiate,
    /// Delta of `distinct`, computed from the integral of its input
    IncrementalDistinct,
    /// Delta of `join`, computed from the deltas of its inputs
    IncrementalJoin,
    /// Delta of `aggregate`, computed from the integral of its input
    IncrementalAggregate,
}

impl OperatorKind {
    /// Name used in dumps and as the prefix of generated stream names
    pub fn operation(&self) -> &'static str {
        match self {
            OperatorKind::Source { .. } => "source",
            OperatorKind::Sink { .. } => "sink",
            OperatorKind::Map => "map",
            OperatorKind::Filter => "filter",
            OperatorKind::Index => "index_with",
            OperatorKind::Join => "join",
            OperatorKind::Aggregate => "stream_aggregate",
            OperatorKind::WindowAggregate { .. } => "window_aggregate",
            OperatorKind::Distinct => "distinct",
            OperatorKind::Sum => "sum",
            OperatorKind::Subtract => "minus",
            OperatorKind::Negate => "neg",
            OperatorKind::Constant => "constant",
            OperatorKind::Noop => "noop",
            OperatorKind::Integrate => "integrate",
            OperatorKind::Differentiate => "differentiate",
            OperatorKind::IncrementalDistinct => "incremental_distinct",
            OperatorKind::IncrementalJoin => "incremental_join",
            OperatorKind::IncrementalAggregate => "incremental_aggregate",
        }
    }

    /// Operators that commute with integration: `op(I a, ..) == I(op(a, ..))`
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            OperatorKind::Map
                | OperatorKind::Filter
                | OperatorKind::Index
                | OperatorKind::Negate
                | OperatorKind::Noop
                | OperatorKind::Sum
                | OperatorKind::Subtract
        )
    }
}

/// A node of the circuit
#[derive(Debug, PartialEq)]
pub struct Operator {
    kind: OperatorKind,
    /// Name of the stream this operator produces, unique within a circuit
    output_name: String,
    inputs: Vec<OperatorRef>,
    function: Option<Expr>,
    output_type: Type,
    /// Whether the output may hold rows with weights other than 0 and 1
    is_multiset: bool,
}

fn construction(op: &str, message: impl fmt::Display) -> CompileError {
    CompileError::construction(format!("{op}: {message}"))
}

/// Closure parameter types for reading rows of a collection
pub fn row_params(collection: &Type) -> CompileResult<Vec<Type>> {
    match &collection.kind {
        TypeKind::ZSet(element) => Ok(vec![Type::reference((**element).clone())]),
        TypeKind::IndexedZSet { key, value } => Ok(vec![Type::raw_tuple(vec![
            Type::reference((**key).clone()),
            Type::reference((**value).clone()),
        ])]),
        _ => Err(CompileError::construction(format!(
            "expected a collection type, found {collection}"
        ))),
    }
}

/// Check `function` takes `params` and return its result type
fn check_closure<'a>(op: &str, function: &'a Expr, params: &[Type]) -> CompileResult<&'a Type> {
    let (declared, result) = function
        .ty()
        .function_parts()
        .ok_or_else(|| construction(op, format!("function has non-function type {}", function.ty())))?;
    if declared.len() != params.len() {
        return Err(construction(
            op,
            format!(
                "function takes {} parameters, expected {}",
                declared.len(),
                params.len()
            ),
        ));
    }
    for (declared, expected) in declared.iter().zip(params) {
        if !declared.same(expected) {
            return Err(construction(
                op,
                format!("parameter has type {declared}, input provides {expected}"),
            ));
        }
    }
    Ok(result)
}

fn expect_zset<'a>(op: &str, input: &'a Operator) -> CompileResult<&'a Type> {
    input.output_type.zset_element().ok_or_else(|| {
        construction(
            op,
            format!("input {} is {}, expected a ZSet", input.output_name, input.output_type),
        )
    })
}

fn expect_indexed<'a>(op: &str, input: &'a Operator) -> CompileResult<(&'a Type, &'a Type)> {
    input.output_type.indexed_parts().ok_or_else(|| {
        construction(
            op,
            format!(
                "input {} is {}, expected an IndexedZSet",
                input.output_name, input.output_type
            ),
        )
    })
}

/// Row and result types of a fold descriptor
fn fold_parts<'a>(op: &str, fold: &'a Expr) -> CompileResult<(&'a Type, &'a Type)> {
    match &fold.ty().kind {
        TypeKind::User { name, args } if name == "Fold" && args.len() == 3 => Ok((&args[0], &args[2])),
        _ => Err(construction(op, format!("expected a Fold, found {}", fold.ty()))),
    }
}

fn same_inputs(op: &str, inputs: &[OperatorRef]) -> CompileResult<Type> {
    let first = inputs
        .first()
        .ok_or_else(|| construction(op, "needs at least one input"))?;
    for input in &inputs[1..] {
        if !input.output_type.same(&first.output_type) {
            return Err(construction(
                op,
                format!(
                    "input {} is {}, expected {}",
                    input.output_name, input.output_type, first.output_type
                ),
            ));
        }
    }
    Ok(first.output_type.clone())
}

impl Operator {
    fn build(
        ctx: &mut CompilationContext,
        kind: OperatorKind,
        inputs: Vec<OperatorRef>,
        function: Option<Expr>,
        output_type: Type,
        is_multiset: bool,
    ) -> OperatorRef {
        Arc::new(Operator {
            kind,
            output_name: ctx.stream_name(),
            inputs,
            function,
            output_type,
            is_multiset,
        })
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn inputs(&self) -> &[OperatorRef] {
        &self.inputs
    }

    /// The single input of a unary operator
    pub fn input(&self) -> Option<&OperatorRef> {
        match self.inputs.as_slice() {
            [input] => Some(input),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<&Expr> {
        self.function.as_ref()
    }

    pub fn output_type(&self) -> &Type {
        &self.output_type
    }

    pub fn is_multiset(&self) -> bool {
        self.is_multiset
    }

    pub fn operation(&self) -> &'static str {
        self.kind.operation()
    }

    pub fn is(&self, kind: &OperatorKind) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(kind)
    }

    // Constructors

    pub fn source(
        ctx: &mut CompilationContext,
        table: impl Into<String>,
        element: Type,
        is_multiset: bool,
    ) -> OperatorRef {
        Operator::build(
            ctx,
            OperatorKind::Source {
                table: table.into(),
            },
            Vec::new(),
            None,
            Type::zset(element),
            is_multiset,
        )
    }

    pub fn sink(ctx: &mut CompilationContext, view: impl Into<String>, input: OperatorRef) -> OperatorRef {
        let ty = input.output_type.clone();
        let multiset = input.is_multiset;
        Operator::build(
            ctx,
            OperatorKind::Sink { view: view.into() },
            vec![input],
            None,
            ty,
            multiset,
        )
    }

    pub fn map(ctx: &mut CompilationContext, input: OperatorRef, function: Expr) -> CompileResult<OperatorRef> {
        let params = row_params(&input.output_type)?;
        let result = check_closure("map", &function, &params)?.clone();
        Ok(Operator::build(
            ctx,
            OperatorKind::Map,
            vec![input],
            Some(function),
            Type::zset(result),
            true,
        ))
    }

    pub fn filter(ctx: &mut CompilationContext, input: OperatorRef, predicate: Expr) -> CompileResult<OperatorRef> {
        let element = expect_zset("filter", &input)?.clone();
        let result = check_closure("filter", &predicate, &[Type::reference(element)])?;
        if !result.same(&Type::bool()) {
            return Err(construction(
                "filter",
                format!("predicate returns {result}, expected bool"),
            ));
        }
        let ty = input.output_type.clone();
        let multiset = input.is_multiset;
        Ok(Operator::build(
            ctx,
            OperatorKind::Filter,
            vec![input],
            Some(predicate),
            ty,
            multiset,
        ))
    }

    /// `function` maps a row to a `(key, value)` raw tuple
    pub fn index(ctx: &mut CompilationContext, input: OperatorRef, function: Expr) -> CompileResult<OperatorRef> {
        let element = expect_zset("index_with", &input)?.clone();
        let result = check_closure("index_with", &function, &[Type::reference(element)])?;
        let ty = match &result.kind {
            TypeKind::RawTuple(parts) if parts.len() == 2 && !result.may_be_null => {
                Type::indexed_zset(parts[0].clone(), parts[1].clone())
            }
            _ => {
                return Err(construction(
                    "index_with",
                    format!("function returns {result}, expected a (key, value) pair"),
                ))
            }
        };
        let multiset = input.is_multiset;
        Ok(Operator::build(
            ctx,
            OperatorKind::Index,
            vec![input],
            Some(function),
            ty,
            multiset,
        ))
    }

    fn join_kind(
        ctx: &mut CompilationContext,
        kind: OperatorKind,
        left: OperatorRef,
        right: OperatorRef,
        function: Expr,
    ) -> CompileResult<OperatorRef> {
        let op = kind.operation();
        let (left_key, left_value) = expect_indexed(op, &left)?;
        let (right_key, right_value) = expect_indexed(op, &right)?;
        if !left_key.same(right_key) {
            return Err(construction(
                op,
                format!("key types differ: {left_key} and {right_key}"),
            ));
        }
        let params = [
            Type::reference(left_key.clone()),
            Type::reference(left_value.clone()),
            Type::reference(right_value.clone()),
        ];
        let result = check_closure(op, &function, &params)?.clone();
        Ok(Operator::build(
            ctx,
            kind,
            vec![left, right],
            Some(function),
            Type::zset(result),
            true,
        ))
    }

    /// `function` is `|k: &K, l: &L, r: &R| -> T`
    pub fn join(
        ctx: &mut CompilationContext,
        left: OperatorRef,
        right: OperatorRef,
        function: Expr,
    ) -> CompileResult<OperatorRef> {
        Operator::join_kind(ctx, OperatorKind::Join, left, right, function)
    }

    pub fn incremental_join(
        ctx: &mut CompilationContext,
        left: OperatorRef,
        right: OperatorRef,
        function: Expr,
    ) -> CompileResult<OperatorRef> {
        Operator::join_kind(ctx, OperatorKind::IncrementalJoin, left, right, function)
    }

    fn aggregate_kind(
        ctx: &mut CompilationContext,
        kind: OperatorKind,
        input: OperatorRef,
        fold: Expr,
    ) -> CompileResult<OperatorRef> {
        let op = kind.operation();
        let (key, value) = expect_indexed(op, &input)?;
        let (row, result) = fold_parts(op, &fold)?;
        if !row.same(value) {
            return Err(construction(
                op,
                format!("fold over {row} applied to values of type {value}"),
            ));
        }
        let ty = Type::indexed_zset(key.clone(), result.clone());
        Ok(Operator::build(ctx, kind, vec![input], Some(fold), ty, false))
    }

    /// Per-key aggregate; `fold` is a `Fold<V, A, R>` over the values
    pub fn aggregate(ctx: &mut CompilationContext, input: OperatorRef, fold: Expr) -> CompileResult<OperatorRef> {
        Operator::aggregate_kind(ctx, OperatorKind::Aggregate, input, fold)
    }

    pub fn incremental_aggregate(
        ctx: &mut CompilationContext,
        input: OperatorRef,
        fold: Expr,
    ) -> CompileResult<OperatorRef> {
        Operator::aggregate_kind(ctx, OperatorKind::IncrementalAggregate, input, fold)
    }

    /// Aggregate over the rows whose key falls in `window`, a range expression
    pub fn window_aggregate(
        ctx: &mut CompilationContext,
        input: OperatorRef,
        window: Expr,
        fold: Expr,
    ) -> CompileResult<OperatorRef> {
        if !matches!(&window.ty().kind, TypeKind::User { name, .. } if name == "Range") {
            return Err(construction(
                "window_aggregate",
                format!("window has type {}, expected a Range", window.ty()),
            ));
        }
        Operator::aggregate_kind(ctx, OperatorKind::WindowAggregate { window }, input, fold)
    }

    fn unary_kind(
        ctx: &mut CompilationContext,
        kind: OperatorKind,
        input: OperatorRef,
        is_multiset: bool,
    ) -> CompileResult<OperatorRef> {
        if !input.output_type.is_collection() {
            return Err(construction(
                kind.operation(),
                format!("input {} is {}", input.output_name, input.output_type),
            ));
        }
        let ty = input.output_type.clone();
        Ok(Operator::build(ctx, kind, vec![input], None, ty, is_multiset))
    }

    pub fn distinct(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        Operator::unary_kind(ctx, OperatorKind::Distinct, input, false)
    }

    /// Takes the integral of the original input
    pub fn incremental_distinct(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        Operator::unary_kind(ctx, OperatorKind::IncrementalDistinct, input, true)
    }

    pub fn negate(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        let multiset = input.is_multiset;
        Operator::unary_kind(ctx, OperatorKind::Negate, input, multiset)
    }

    pub fn noop(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        let multiset = input.is_multiset;
        Operator::unary_kind(ctx, OperatorKind::Noop, input, multiset)
    }

    pub fn integrate(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        let multiset = input.is_multiset;
        Operator::unary_kind(ctx, OperatorKind::Integrate, input, multiset)
    }

    pub fn differentiate(ctx: &mut CompilationContext, input: OperatorRef) -> CompileResult<OperatorRef> {
        Operator::unary_kind(ctx, OperatorKind::Differentiate, input, true)
    }

    pub fn sum(ctx: &mut CompilationContext, inputs: Vec<OperatorRef>) -> CompileResult<OperatorRef> {
        let ty = same_inputs("sum", &inputs)?;
        Ok(Operator::build(ctx, OperatorKind::Sum, inputs, None, ty, true))
    }

    /// `left - right`
    pub fn subtract(ctx: &mut CompilationContext, left: OperatorRef, right: OperatorRef) -> CompileResult<OperatorRef> {
        let inputs = vec![left, right];
        let ty = same_inputs("minus", &inputs)?;
        Ok(Operator::build(ctx, OperatorKind::Subtract, inputs, None, ty, true))
    }

    /// A constant collection; `value` is a ZSet literal
    pub fn constant(ctx: &mut CompilationContext, value: Expr) -> CompileResult<OperatorRef> {
        if !value.ty().is_collection() {
            return Err(construction(
                "constant",
                format!("value has type {}, expected a collection", value.ty()),
            ));
        }
        let ty = value.ty().clone();
        Ok(Operator::build(ctx, OperatorKind::Constant, Vec::new(), Some(value), ty, true))
    }

    // Rewriting

    /// Same operator with a different function of the same type
    pub fn with_function(self: &Arc<Self>, function: Expr) -> CompileResult<OperatorRef> {
        let Some(current) = &self.function else {
            return Err(construction(self.operation(), "operator has no function"));
        };
        if Expr::ptr_eq(current, &function) {
            return Ok(Arc::clone(self));
        }
        if !current.ty().same(function.ty()) {
            return Err(construction(
                self.operation(),
                format!("replacement function has type {}, expected {}", function.ty(), current.ty()),
            ));
        }
        Ok(Arc::new(Operator {
            function: Some(function),
            ..self.shallow_clone()
        }))
    }

    /// Same operator reading from `inputs`, which must produce the same types.
    /// Returns `self` when every input is unchanged, unless `force` is set.
    pub fn with_inputs(self: &Arc<Self>, inputs: Vec<OperatorRef>, force: bool) -> CompileResult<OperatorRef> {
        self.check_inputs(&inputs)?;
        let unchanged = inputs.iter().zip(&self.inputs).all(|(a, b)| Arc::ptr_eq(a, b));
        if unchanged && !force {
            return Ok(Arc::clone(self));
        }
        Ok(Arc::new(Operator {
            inputs,
            ..self.shallow_clone()
        }))
    }

    /// Copy of this operator under a fresh output name, reading from `inputs`
    pub fn duplicate(
        self: &Arc<Self>,
        ctx: &mut CompilationContext,
        inputs: Vec<OperatorRef>,
    ) -> CompileResult<OperatorRef> {
        self.check_inputs(&inputs)?;
        Ok(Arc::new(Operator {
            output_name: ctx.stream_name(),
            inputs,
            ..self.shallow_clone()
        }))
    }

    fn check_inputs(&self, inputs: &[OperatorRef]) -> CompileResult<()> {
        if inputs.len() != self.inputs.len() {
            return Err(construction(
                self.operation(),
                format!("{} inputs given, {} expected", inputs.len(), self.inputs.len()),
            ));
        }
        for (new, old) in inputs.iter().zip(&self.inputs) {
            if !new.output_type.same(&old.output_type) {
                return Err(construction(
                    self.operation(),
                    format!("input {} is {}, expected {}", new.output_name, new.output_type, old.output_type),
                ));
            }
        }
        Ok(())
    }

    /// Same operator with a different kind and inputs. Used by rewrites that
    /// swap an operator for its incremental version.
    pub(crate) fn with_kind(
        self: &Arc<Self>,
        ctx: &mut CompilationContext,
        kind: OperatorKind,
        inputs: Vec<OperatorRef>,
    ) -> CompileResult<OperatorRef> {
        match (kind, self.function.clone()) {
            (OperatorKind::IncrementalDistinct, None) => {
                let input = single(inputs)?;
                Operator::incremental_distinct(ctx, input)
            }
            (OperatorKind::IncrementalJoin, Some(function)) => {
                let mut inputs = inputs.into_iter();
                match (inputs.next(), inputs.next(), inputs.next()) {
                    (Some(left), Some(right), None) => Operator::incremental_join(ctx, left, right, function),
                    _ => Err(construction("incremental_join", "needs two inputs")),
                }
            }
            (OperatorKind::IncrementalAggregate, Some(fold)) => {
                let input = single(inputs)?;
                Operator::incremental_aggregate(ctx, input, fold)
            }
            (kind, _) => Err(CompileError::invariant(format!(
                "cannot turn {} into {}",
                self.operation(),
                kind.operation()
            ))),
        }
    }

    fn shallow_clone(&self) -> Operator {
        Operator {
            kind: self.kind.clone(),
            output_name: self.output_name.clone(),
            inputs: self.inputs.clone(),
            function: self.function.clone(),
            output_type: self.output_type.clone(),
            is_multiset: self.is_multiset,
        }
    }
}

fn single(inputs: Vec<OperatorRef>) -> CompileResult<OperatorRef> {
    let mut inputs = inputs.into_iter();
    match (inputs.next(), inputs.next()) {
        (Some(input), None) => Ok(input),
        _ => Err(CompileError::invariant("expected exactly one input")),
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "let {}: {} = ", self.output_name, self.output_type)?;
        match &self.kind {
            OperatorKind::Source { table } => return write!(f, "source({table:?})"),
            OperatorKind::Sink { view } => {
                let input = self.inputs.first().map_or("?", |i| i.output_name());
                return write!(f, "sink({view:?}, {input})");
            }
            _ => {}
        }
        write!(f, "{}(", self.operation())?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input.output_name)?;
        }
        if let OperatorKind::WindowAggregate { window } = &self.kind {
            write!(f, ", {window}")?;
        }
        if let Some(function) = &self.function {
            if !self.inputs.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{function}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Param};

    fn row() -> Type {
        Type::tuple(vec![Type::int32().nullable(), Type::int32()])
    }

    fn source(ctx: &mut CompilationContext) -> OperatorRef {
        Operator::source(ctx, "T", row(), true)
    }

    fn key_by_b() -> Expr {
        let t = Param::new("t", Type::reference(row()));
        let b = Expr::field(t.var(), 1).unwrap();
        Expr::closure(
            vec![t.clone()],
            Expr::raw_tuple(vec![b, Expr::field(t.var(), 0).unwrap()]),
        )
    }

    #[test]
    fn test_map_checks_parameter_type() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let t = Param::new("t", Type::reference(row()));
        let ok = Expr::closure(vec![t.clone()], Expr::field(t.var(), 1).unwrap());
        let m = Operator::map(&mut ctx, s.clone(), ok).unwrap();
        assert!(m.output_type().same(&Type::zset(Type::int32())));

        let wrong = Param::new("t", row());
        let bad = Expr::closure(vec![wrong.clone()], Expr::field(wrong.var(), 1).unwrap());
        assert!(Operator::map(&mut ctx, s, bad).is_err());
    }

    #[test]
    fn test_filter_requires_bool_predicate() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let t = Param::new("t", Type::reference(row()));
        let nullable = Expr::binary(BinaryOp::Gt, Expr::field(t.var(), 0).unwrap(), Expr::none(&Type::int32()))
            .unwrap();
        let bad = Expr::closure(vec![t.clone()], nullable);
        assert!(Operator::filter(&mut ctx, s.clone(), bad).is_err());

        let good = Expr::closure(
            vec![t.clone()],
            Expr::binary(BinaryOp::Gt, Expr::field(t.var(), 1).unwrap(), Expr::i32(0)).unwrap(),
        );
        let f = Operator::filter(&mut ctx, s.clone(), good).unwrap();
        assert!(f.output_type().same(s.output_type()));
    }

    #[test]
    fn test_index_and_join_types() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let left = Operator::index(&mut ctx, s.clone(), key_by_b()).unwrap();
        let right = Operator::index(&mut ctx, s, key_by_b()).unwrap();
        assert!(left
            .output_type()
            .same(&Type::indexed_zset(Type::int32(), Type::int32().nullable())));

        let k = Param::new("k", Type::reference(Type::int32()));
        let l = Param::new("l", Type::reference(Type::int32().nullable()));
        let r = Param::new("r", Type::reference(Type::int32().nullable()));
        let body = Expr::tuple(vec![Expr::deref(k.var()).unwrap(), Expr::deref(l.var()).unwrap()]);
        let j = Operator::join(&mut ctx, left.clone(), right, Expr::closure(vec![k, l, r], body)).unwrap();
        assert!(j
            .output_type()
            .same(&Type::zset(Type::tuple(vec![Type::int32(), Type::int32().nullable()]))));
        assert!(Operator::join(&mut ctx, left, j, key_by_b()).is_err());
    }

    #[test]
    fn test_sum_requires_matching_inputs() {
        let mut ctx = CompilationContext::new();
        let a = source(&mut ctx);
        let b = Operator::source(&mut ctx, "U", Type::tuple(vec![Type::int32()]), false);
        assert!(Operator::sum(&mut ctx, vec![a.clone(), a.clone()]).is_ok());
        assert!(Operator::sum(&mut ctx, vec![a.clone(), b.clone()]).is_err());
        assert!(Operator::subtract(&mut ctx, a, b).is_err());
        assert!(Operator::sum(&mut ctx, Vec::new()).is_err());
    }

    #[test]
    fn test_with_inputs_unchanged_is_same_arc() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let d = Operator::distinct(&mut ctx, s.clone()).unwrap();
        let same = d.with_inputs(vec![s.clone()], false).unwrap();
        assert!(Arc::ptr_eq(&d, &same));
        let forced = d.with_inputs(vec![s], true).unwrap();
        assert!(!Arc::ptr_eq(&d, &forced));
        assert_eq!(forced.output_name(), d.output_name());
    }

    #[test]
    fn test_with_inputs_rejects_type_change() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let other = Operator::source(&mut ctx, "U", Type::tuple(vec![Type::bool()]), false);
        let d = Operator::distinct(&mut ctx, s).unwrap();
        assert!(d.with_inputs(vec![other], false).is_err());
    }

    #[test]
    fn test_with_function_keeps_name() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let t = Param::new("t", Type::reference(row()));
        let m = Operator::map(&mut ctx, s, Expr::closure(vec![t.clone()], Expr::field(t.var(), 1).unwrap()))
            .unwrap();
        let replacement = Expr::closure(vec![t.clone()], Expr::i32(3));
        let m2 = m.with_function(replacement).unwrap();
        assert_eq!(m2.output_name(), m.output_name());
        assert!(m.with_function(Expr::closure(vec![t], Expr::bool(true))).is_err());
    }

    #[test]
    fn test_generated_names_are_distinct() {
        let mut ctx = CompilationContext::new();
        let a = source(&mut ctx);
        let b = source(&mut ctx);
        assert_ne!(a.output_name(), b.output_name());
    }

    /// `Fold` counting values of type `value`
    fn count_fold(value: Type) -> Expr {
        let acc = Param::new("acc", Type::int64());
        let v = Param::new("v", Type::reference(value.clone()));
        let w = Param::new("w", Type::int64());
        let increment = Expr::closure(
            vec![acc.clone(), v, w.clone()],
            Expr::binary(BinaryOp::Add, acc.var(), w.var()).unwrap(),
        );
        let done = Param::new("acc", Type::int64());
        let post = Expr::closure(vec![done.clone()], done.var());
        Expr::fold(&value, Expr::i64(0), increment, post).unwrap()
    }

    #[test]
    fn test_window_aggregate_types() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let indexed = Operator::index(&mut ctx, s, key_by_b()).unwrap();
        let frame = Expr::range(Some(Expr::i32(-1)), Some(Expr::i32(1)), true).unwrap();
        let w = Operator::window_aggregate(&mut ctx, indexed, frame.clone(), count_fold(Type::int32().nullable()))
            .unwrap();
        assert_eq!(w.operation(), "window_aggregate");
        assert!(w
            .output_type()
            .same(&Type::indexed_zset(Type::int32(), Type::int64())));
        match w.kind() {
            OperatorKind::WindowAggregate { window } => assert_eq!(window, &frame),
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(!w.is_multiset());
    }

    #[test]
    fn test_window_must_be_a_range() {
        let mut ctx = CompilationContext::new();
        let s = source(&mut ctx);
        let indexed = Operator::index(&mut ctx, s.clone(), key_by_b()).unwrap();
        let fold = count_fold(Type::int32().nullable());
        let err = Operator::window_aggregate(&mut ctx, indexed.clone(), Expr::i32(3), fold.clone()).unwrap_err();
        assert!(err.to_string().contains("expected a Range"), "{err}");

        let frame = Expr::range(None, Some(Expr::i32(0)), true).unwrap();
        // values are Option<i32>, the fold reads i32
        assert!(Operator::window_aggregate(&mut ctx, indexed, frame.clone(), count_fold(Type::int32())).is_err());
        // not indexed
        assert!(Operator::window_aggregate(&mut ctx, s, frame, fold).is_err());
    }
}
