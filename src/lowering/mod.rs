//! # Plan Lowering
//!
//! Translates a typed relational plan into a whole-relation circuit, the
//! input of the optimizer pipeline. Every relation becomes a stream of
//! `ZSet<TupleN<..>>`; scalar expressions become closures over `&TupleN<..>`.
//!
//! ```text
//! Scan T               source(T)                     shared by every scan
//! Project              map(|t| TupleN::new(..))
//! Filter               filter(|t| is_true(cond))
//! Join (inner)         index_with x2 -> join -> filter (residual)
//! Join (outer)         inner + map(pad, side - semi_join(side, inner))
//! Aggregate            index_with -> stream_aggregate(Fold) -> map (flatten)
//! Union / Minus        sum, neg, distinct
//! Intersect            distinct, index_with(row, ()) x2 -> join
//! Window (RANGE)       index_with -> window_aggregate -> join (row, aggregates)
//! Values               constant(zset!(..))
//! view V               sink(V)
//! ```
//!
//! EXCEPT ALL, INTERSECT ALL and DISTINCT aggregates have no lowering and
//! fail with `CompileError::Unimplemented`.

mod aggregate;
pub mod expr;
mod window;

use crate::circuit::{Circuit, Operator, OperatorRef};
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use crate::expr::{BinaryOp, Expr, Param, UnaryOp};
use crate::plan::{JoinKind, Plan, RelNode, ScalarExpr};
use crate::types::Type;
use std::collections::HashMap;
use std::ops::Range;

pub use self::expr::{lower_condition, lower_literal, lower_scalar};

/// Builds the circuit for one plan
pub struct Lowering<'a> {
    ctx: &'a mut CompilationContext,
    circuit: Circuit,
    /// Streams of tables and of the views lowered so far
    relations: HashMap<String, OperatorRef>,
}

/// Parameter binding one row of a `ZSet<element>`
fn row_param(element: &Type) -> Param {
    Param::new("t", Type::reference(element.clone()))
}

/// Field types of the rows of a relation stream
fn row_fields(op: &Operator) -> CompileResult<Vec<Type>> {
    op.output_type()
        .zset_element()
        .and_then(Type::tuple_fields)
        .map(<[Type]>::to_vec)
        .ok_or_else(|| {
            CompileError::construction(format!(
                "relation {} has type {}, expected a ZSet of tuples",
                op.output_name(),
                op.output_type()
            ))
        })
}

fn element(op: &Operator) -> CompileResult<Type> {
    op.output_type().zset_element().cloned().ok_or_else(|| {
        CompileError::construction(format!(
            "relation {} has type {}, expected a ZSet",
            op.output_name(),
            op.output_type()
        ))
    })
}

/// Split a condition into its top-level conjuncts
fn conjuncts(condition: &ScalarExpr, out: &mut Vec<ScalarExpr>) {
    match condition {
        ScalarExpr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

/// `(left column, right column)` when `conjunct` equates a column of each side
fn equi_key(conjunct: &ScalarExpr, left: &[Type], right: &[Type]) -> Option<(usize, usize)> {
    let ScalarExpr::Binary {
        op: BinaryOp::Eq,
        left: a,
        right: b,
    } = conjunct
    else {
        return None;
    };
    let (ScalarExpr::Column { index: a }, ScalarExpr::Column { index: b }) = (&**a, &**b) else {
        return None;
    };
    let width = left.len();
    let (l, r) = match (*a < width, *b < width) {
        (true, false) => (*a, *b - width),
        (false, true) => (*b, *a - width),
        _ => return None,
    };
    let same = right.get(r).is_some_and(|rt| left[l].same_shape(rt));
    same.then_some((l, r))
}

/// Output column types of a join of `kind`: the columns of a side that may
/// lack a partner become nullable
fn join_columns(kind: JoinKind, left: &[Type], right: &[Type]) -> Vec<Type> {
    let pad_left = matches!(kind, JoinKind::Right | JoinKind::Full);
    let pad_right = matches!(kind, JoinKind::Left | JoinKind::Full);
    let widen = |ty: &Type, pad: bool| if pad { ty.nullable() } else { ty.clone() };
    left.iter()
        .map(|ty| widen(ty, pad_left))
        .chain(right.iter().map(|ty| widen(ty, pad_right)))
        .collect()
}

/// `expr` converted to `ty` when the types differ
fn cast_to(expr: Expr, ty: &Type) -> Expr {
    if expr.ty().same(ty) {
        expr
    } else {
        Expr::cast(expr, ty.clone())
    }
}

/// `a && b && ..` over non-null booleans, `None` when empty
fn and_all(terms: Vec<Expr>) -> CompileResult<Option<Expr>> {
    let mut terms = terms.into_iter();
    let Some(first) = terms.next() else {
        return Ok(None);
    };
    terms
        .try_fold(first, |acc, term| Expr::binary(BinaryOp::And, acc, term))
        .map(Some)
}

impl<'a> Lowering<'a> {
    pub fn new(ctx: &'a mut CompilationContext, name: impl Into<String>) -> Self {
        Lowering {
            ctx,
            circuit: Circuit::new(name),
            relations: HashMap::new(),
        }
    }

    /// Lower every table and view of `plan`
    pub fn lower(plan: &Plan, ctx: &'a mut CompilationContext) -> CompileResult<Circuit> {
        let mut lowering = Lowering::new(ctx, plan.name.clone());
        for table in &plan.tables {
            if lowering.relations.contains_key(&table.name) {
                return Err(CompileError::construction(format!(
                    "table {} declared twice",
                    table.name
                )));
            }
            let element = Type::tuple(table.row_types());
            let multiset = table.primary_key.is_empty();
            let source = Operator::source(lowering.ctx, table.name.clone(), element, multiset);
            lowering.emit(source.clone())?;
            lowering.relations.insert(table.name.clone(), source);
        }
        for view in &plan.views {
            if lowering.relations.contains_key(&view.name) {
                return Err(CompileError::construction(format!(
                    "view {} collides with an earlier relation",
                    view.name
                )));
            }
            let output = lowering.lower_node(&view.query)?;
            let sink = Operator::sink(lowering.ctx, view.name.clone(), output.clone());
            lowering.emit(sink)?;
            tracing::debug!(view = %view.name, stream = output.output_name(), "view_lowered");
            lowering.relations.insert(view.name.clone(), output);
        }
        Ok(lowering.circuit)
    }

    fn emit(&mut self, op: OperatorRef) -> CompileResult<OperatorRef> {
        self.circuit.add(op.clone())?;
        Ok(op)
    }

    fn lower_node(&mut self, node: &RelNode) -> CompileResult<OperatorRef> {
        match node {
            RelNode::Scan { table } => self.relations.get(table).cloned().ok_or_else(|| {
                CompileError::construction(format!("scan of unknown relation {table}"))
            }),
            RelNode::Project { input, exprs } => {
                let input = self.lower_node(input)?;
                self.project(input, exprs)
            }
            RelNode::Filter { input, condition } => {
                let input = self.lower_node(input)?;
                self.filter(input, condition)
            }
            RelNode::Join {
                left,
                right,
                kind,
                condition,
            } => {
                let left = self.lower_node(left)?;
                let right = self.lower_node(right)?;
                let inner = self.join(left.clone(), right.clone(), condition)?;
                if *kind == JoinKind::Inner {
                    return Ok(inner);
                }
                self.outer_join(*kind, left, right, inner)
            }
            RelNode::Aggregate {
                input,
                group,
                calls,
            } => {
                if calls.iter().any(|c| c.distinct) {
                    return Err(CompileError::unimplemented(
                        node,
                        "DISTINCT aggregates are not supported",
                    ));
                }
                let input = self.lower_node(input)?;
                self.aggregate(input, group, calls)
            }
            RelNode::Union { inputs, all } => {
                let inputs = self.lower_all(inputs)?;
                let op = Operator::sum(self.ctx, inputs)?;
                let sum = self.emit(op)?;
                if *all {
                    return Ok(sum);
                }
                let op = Operator::distinct(self.ctx, sum)?;
                self.emit(op)
            }
            RelNode::Minus { inputs, all } => {
                if *all {
                    return Err(CompileError::unimplemented(node, "EXCEPT ALL is not supported"));
                }
                let inputs = self.lower_all(inputs)?;
                self.minus(inputs)
            }
            RelNode::Intersect { inputs, all } => {
                if *all {
                    return Err(CompileError::unimplemented(node, "INTERSECT ALL is not supported"));
                }
                let inputs = self.lower_all(inputs)?;
                self.intersect(inputs)
            }
            RelNode::Distinct { input } => {
                let input = self.lower_node(input)?;
                let op = Operator::distinct(self.ctx, input)?;
                self.emit(op)
            }
            RelNode::Values { columns, rows } => {
                let element = Type::tuple(columns.clone());
                let mut tuples = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(CompileError::construction(format!(
                            "VALUES row has {} fields, expected {}",
                            row.len(),
                            columns.len()
                        )));
                    }
                    let fields = row
                        .iter()
                        .zip(columns)
                        .map(|(value, ty)| lower_literal(value, ty))
                        .collect::<CompileResult<Vec<_>>>()?;
                    tuples.push((Expr::tuple(fields), 1));
                }
                let value = Expr::zset(element, tuples)?;
                let op = Operator::constant(self.ctx, value)?;
                self.emit(op)
            }
            RelNode::Window {
                input,
                partition,
                order,
                lower,
                upper,
                calls,
            } => {
                let &[order] = order.as_slice() else {
                    return Err(CompileError::unimplemented(
                        node,
                        format!("window ordered by {} columns, expected one", order.len()),
                    ));
                };
                if calls.iter().any(|c| c.distinct) {
                    return Err(CompileError::unimplemented(
                        node,
                        "DISTINCT window aggregates are not supported",
                    ));
                }
                let input = self.lower_node(input)?;
                self.window(node, input, partition, order, (*lower, *upper), calls)
            }
        }
    }

    fn lower_all(&mut self, nodes: &[RelNode]) -> CompileResult<Vec<OperatorRef>> {
        nodes.iter().map(|n| self.lower_node(n)).collect()
    }

    fn project(&mut self, input: OperatorRef, exprs: &[ScalarExpr]) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let fields = exprs
            .iter()
            .map(|e| lower_scalar(e, &t.var()))
            .collect::<CompileResult<Vec<_>>>()?;
        let function = Expr::closure(vec![t], Expr::tuple(fields));
        let op = Operator::map(self.ctx, input, function)?;
        self.emit(op)
    }

    /// `map(|t| TupleN::new(fields(t)..))`
    fn map_row<F>(&mut self, input: OperatorRef, fields: F) -> CompileResult<OperatorRef>
    where
        F: FnOnce(&Expr) -> CompileResult<Vec<Expr>>,
    {
        let t = row_param(&element(&input)?);
        let body = Expr::tuple(fields(&t.var())?);
        let op = Operator::map(self.ctx, input, Expr::closure(vec![t], body))?;
        self.emit(op)
    }

    fn filter(&mut self, input: OperatorRef, condition: &ScalarExpr) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let predicate = Expr::closure(vec![t.clone()], lower_condition(condition, &t.var())?);
        let op = Operator::filter(self.ctx, input, predicate)?;
        self.emit(op)
    }

    /// Drop rows with a NULL in any of `columns`; NULL keys never match
    fn drop_null_keys(&mut self, input: OperatorRef, columns: &[usize]) -> CompileResult<OperatorRef> {
        let fields = row_fields(&input)?;
        let t = row_param(&element(&input)?);
        let mut checks = Vec::new();
        for &c in columns {
            if fields[c].may_be_null {
                let field = Expr::field(t.var(), c)?;
                checks.push(Expr::unary(UnaryOp::Not, Expr::is_null(field))?);
            }
        }
        match and_all(checks)? {
            Some(predicate) => {
                let predicate = Expr::closure(vec![t], predicate);
                let op = Operator::filter(self.ctx, input, predicate)?;
                self.emit(op)
            }
            None => Ok(input),
        }
    }

    /// `index_with(|t| (TupleN::new(keys..), *t))` with non-null keys
    fn index_by(&mut self, input: OperatorRef, columns: &[usize]) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let mut keys = Vec::with_capacity(columns.len());
        for &c in columns {
            let field = Expr::field(t.var(), c)?;
            let key = if field.ty().may_be_null {
                let ty = field.ty().non_null();
                Expr::cast(field, ty)
            } else {
                field
            };
            keys.push(key);
        }
        let pair = Expr::raw_tuple(vec![Expr::tuple(keys), Expr::deref(t.var())?]);
        let function = Expr::closure(vec![t], pair);
        let op = Operator::index(self.ctx, input, function)?;
        self.emit(op)
    }

    fn join(&mut self, left: OperatorRef, right: OperatorRef, condition: &ScalarExpr) -> CompileResult<OperatorRef> {
        let left_fields = row_fields(&left)?;
        let right_fields = row_fields(&right)?;

        let mut terms = Vec::new();
        conjuncts(condition, &mut terms);
        let mut keys = Vec::new();
        let mut residual = Vec::new();
        for term in terms {
            match equi_key(&term, &left_fields, &right_fields) {
                Some(key) => keys.push(key),
                None if term == ScalarExpr::boolean(true) => {}
                None => residual.push(term),
            }
        }
        tracing::trace!(keys = keys.len(), residual = residual.len(), "join_condition_split");

        let left_keys: Vec<usize> = keys.iter().map(|(l, _)| *l).collect();
        let right_keys: Vec<usize> = keys.iter().map(|(_, r)| *r).collect();
        let left = self.drop_null_keys(left, &left_keys)?;
        let right = self.drop_null_keys(right, &right_keys)?;
        let left_indexed = self.index_by(left.clone(), &left_keys)?;
        let right_indexed = self.index_by(right.clone(), &right_keys)?;

        let key_type = left_indexed
            .output_type()
            .indexed_parts()
            .map(|(k, _)| k.clone())
            .ok_or_else(|| CompileError::invariant("index_with produced a non-indexed stream"))?;
        let k = Param::new("k", Type::reference(key_type));
        let l = Param::new("l", Type::reference(element(&left)?));
        let r = Param::new("r", Type::reference(element(&right)?));
        let mut fields = Vec::with_capacity(left_fields.len() + right_fields.len());
        for i in 0..left_fields.len() {
            fields.push(Expr::field(l.var(), i)?);
        }
        for i in 0..right_fields.len() {
            fields.push(Expr::field(r.var(), i)?);
        }
        let function = Expr::closure(vec![k, l, r], Expr::tuple(fields));
        let op = Operator::join(self.ctx, left_indexed, right_indexed, function)?;
        let joined = self.emit(op)?;

        let mut residual = residual.into_iter();
        let Some(first) = residual.next() else {
            return Ok(joined);
        };
        let condition = residual.fold(first, |acc, term| ScalarExpr::binary(BinaryOp::And, acc, term));
        self.filter(joined, &condition)
    }

    /// Outer join from its inner part: rows of each outer side without a
    /// partner are padded with NULLs and added to the inner rows
    fn outer_join(
        &mut self,
        kind: JoinKind,
        left: OperatorRef,
        right: OperatorRef,
        inner: OperatorRef,
    ) -> CompileResult<OperatorRef> {
        let left_fields = row_fields(&left)?;
        let right_fields = row_fields(&right)?;
        let output = join_columns(kind, &left_fields, &right_fields);
        let width = left_fields.len();

        let mut terms = Vec::with_capacity(3);
        let inner_fields = row_fields(&inner)?;
        let widened = inner_fields.iter().zip(&output).any(|(a, b)| !a.same(b));
        terms.push(if widened {
            self.map_row(inner.clone(), |t| {
                (0..output.len())
                    .map(|i| -> CompileResult<Expr> { Ok(cast_to(Expr::field(t.clone(), i)?, &output[i])) })
                    .collect()
            })?
        } else {
            inner.clone()
        });
        if matches!(kind, JoinKind::Left | JoinKind::Full) {
            let unmatched = self.unmatched(left, inner.clone(), 0..width)?;
            terms.push(self.pad(unmatched, &output, 0)?);
        }
        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            let unmatched = self.unmatched(right, inner, width..output.len())?;
            terms.push(self.pad(unmatched, &output, width)?);
        }
        tracing::trace!(kind = ?kind, terms = terms.len(), "outer_join_lowered");
        let op = Operator::sum(self.ctx, terms)?;
        self.emit(op)
    }

    /// Rows of `side` that do not occur in `inner`, where `columns` are the
    /// side's positions in the joined row. Duplicates keep their weight.
    fn unmatched(&mut self, side: OperatorRef, inner: OperatorRef, columns: Range<usize>) -> CompileResult<OperatorRef> {
        let projected = self.map_row(inner, |t| {
            columns.map(|i| Expr::field(t.clone(), i)).collect()
        })?;
        let op = Operator::distinct(self.ctx, projected)?;
        let matched = self.emit(op)?;
        let kept = self.semi_join(side.clone(), matched)?;
        let op = Operator::subtract(self.ctx, side, kept)?;
        self.emit(op)
    }

    /// Widen the rows of one side to `output`, with NULL in every column
    /// outside `offset..offset + width`
    fn pad(&mut self, rows: OperatorRef, output: &[Type], offset: usize) -> CompileResult<OperatorRef> {
        let width = row_fields(&rows)?.len();
        self.map_row(rows, |t| {
            output
                .iter()
                .enumerate()
                .map(|(i, ty)| -> CompileResult<Expr> {
                    if (offset..offset + width).contains(&i) {
                        Ok(cast_to(Expr::field(t.clone(), i - offset)?, ty))
                    } else {
                        Ok(Expr::none(ty))
                    }
                })
                .collect()
        })
    }

    /// `index_with(|t| (*t, ()))`: the whole row is the key
    fn index_row(&mut self, input: OperatorRef) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let pair = Expr::raw_tuple(vec![Expr::deref(t.var())?, Expr::raw_tuple(Vec::new())]);
        let op = Operator::index(self.ctx, input, Expr::closure(vec![t], pair))?;
        self.emit(op)
    }

    /// Rows of `rows` that also occur in `set`, weighted by their weight in
    /// `rows` times their weight in `set`
    fn semi_join(&mut self, rows: OperatorRef, set: OperatorRef) -> CompileResult<OperatorRef> {
        let row_type = element(&rows)?;
        let left = self.index_row(rows)?;
        let right = self.index_row(set)?;
        let k = Param::new("k", Type::reference(row_type));
        let unit = Type::reference(Type::raw_tuple(Vec::new()));
        let l = Param::new("l", unit.clone());
        let r = Param::new("r", unit);
        let function = Expr::closure(vec![k.clone(), l, r], Expr::deref(k.var())?);
        let op = Operator::join(self.ctx, left, right, function)?;
        self.emit(op)
    }

    /// Pairwise whole-row joins of the distinct inputs
    fn intersect(&mut self, inputs: Vec<OperatorRef>) -> CompileResult<OperatorRef> {
        let mut inputs = inputs.into_iter();
        let first = inputs
            .next()
            .ok_or_else(|| CompileError::construction("INTERSECT without inputs"))?;
        let op = Operator::distinct(self.ctx, first)?;
        let mut result = self.emit(op)?;
        for input in inputs {
            let op = Operator::distinct(self.ctx, input)?;
            let distinct = self.emit(op)?;
            result = self.semi_join(result, distinct)?;
        }
        Ok(result)
    }

    /// `distinct(sum(distinct(first), neg(distinct(rest))..))`
    fn minus(&mut self, inputs: Vec<OperatorRef>) -> CompileResult<OperatorRef> {
        let mut terms = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.into_iter().enumerate() {
            let op = Operator::distinct(self.ctx, input)?;
            let distinct = self.emit(op)?;
            if i == 0 {
                terms.push(distinct);
            } else {
                let op = Operator::negate(self.ctx, distinct)?;
                terms.push(self.emit(op)?);
            }
        }
        let op = Operator::sum(self.ctx, terms)?;
        let sum = self.emit(op)?;
        let op = Operator::distinct(self.ctx, sum)?;
        self.emit(op)
    }
}
