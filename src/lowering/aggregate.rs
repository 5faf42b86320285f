//! Aggregate lowering.
//!
//! One `Fold` computes every aggregate call of a GROUP BY at once. Its
//! accumulator is a tuple with one or two slots per call:
//!
//! ```text
//! COUNT(*)     i64              acc + w
//! COUNT(c)     i64              if c.is_none() { acc } else { acc + w }
//! SUM(c)       Option<C>        agg_plus(acc, c * (w as C))
//! MIN/MAX(c)   Option<C>        agg_min(acc, c) / agg_max(acc, c)
//! AVG(c)       Option<C>, i64   sum and count, divided in the post step
//! ```
//!
//! The grouped output is flattened back into `(keys.., aggregates..)`. With
//! no GROUP BY, SQL still returns one row for an empty input, so the
//! aggregate is summed with `constant(default) - map(aggregate -> default)`:
//! the default row survives exactly when the aggregate produced nothing.

use super::{element, row_fields, row_param, Lowering};
use crate::circuit::{operator::row_params, Operator, OperatorRef};
use crate::error::{CompileError, CompileResult};
use crate::expr::{BinaryOp, Expr, Param};
use crate::lowering::expr::binary;
use crate::plan::{AggregateCall, AggregateFunction};
use crate::primitives;
use crate::types::Type;

/// How one aggregate call accumulates
#[derive(Debug, Clone)]
enum Accumulator {
    /// Counts rows, skipping those where `column` is NULL
    Count { column: Option<usize> },
    Sum { column: usize, ty: Type },
    Extremum { op: BinaryOp, column: usize, ty: Type },
    Avg { column: usize, ty: Type },
}

fn column_type(fields: &[Type], column: usize, call: &AggregateCall) -> CompileResult<Type> {
    fields.get(column).cloned().ok_or_else(|| {
        CompileError::construction(format!(
            "{:?} argument {column} out of range for {} columns",
            call.function,
            fields.len()
        ))
    })
}

fn required_argument(call: &AggregateCall) -> CompileResult<usize> {
    call.argument
        .ok_or_else(|| CompileError::construction(format!("{:?} without an argument", call.function)))
}

/// Native addition for non-null slots
fn add(acc: Expr, w: Expr) -> CompileResult<Expr> {
    Expr::binary(BinaryOp::Add, acc, w)
}

/// `acc op value` through the aggregate helpers of the runtime
fn accumulate(op: BinaryOp, acc: Expr, value: Expr) -> CompileResult<Expr> {
    let function = primitives::aggregate(op, acc.ty(), value.ty())?;
    Ok(Expr::call(function.name, vec![acc, value], function.result))
}

/// A count or weight converted to the column's type
fn weight_as(w: &Expr, ty: &Type) -> Expr {
    let target = ty.non_null();
    if w.ty().same(&target) {
        w.clone()
    } else {
        Expr::cast(w.clone(), target)
    }
}

/// `acc + w`, or `acc` unchanged when `value` is NULL
fn count_step(acc: Expr, value: Option<Expr>, w: &Expr) -> CompileResult<Expr> {
    let counted = add(acc.clone(), w.clone())?;
    match value {
        Some(value) if value.ty().may_be_null => Expr::if_else(Expr::is_null(value), acc, counted),
        _ => Ok(counted),
    }
}

fn sum_step(acc: Expr, value: Expr, ty: &Type, w: &Expr) -> CompileResult<Expr> {
    let weighted = binary(BinaryOp::Mul, value, weight_as(w, ty))?;
    accumulate(BinaryOp::Add, acc, weighted)
}

impl Accumulator {
    fn new(call: &AggregateCall, fields: &[Type]) -> CompileResult<Self> {
        let accumulator = match call.function {
            AggregateFunction::Count => {
                if let Some(column) = call.argument {
                    column_type(fields, column, call)?;
                }
                Accumulator::Count {
                    column: call.argument,
                }
            }
            AggregateFunction::Sum => {
                let column = required_argument(call)?;
                let ty = column_type(fields, column, call)?;
                Accumulator::Sum { column, ty }
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let column = required_argument(call)?;
                let ty = column_type(fields, column, call)?;
                let op = if call.function == AggregateFunction::Min {
                    BinaryOp::Min
                } else {
                    BinaryOp::Max
                };
                Accumulator::Extremum { op, column, ty }
            }
            AggregateFunction::Avg => {
                let column = required_argument(call)?;
                let ty = column_type(fields, column, call)?;
                Accumulator::Avg { column, ty }
            }
        };
        Ok(accumulator)
    }

    /// Initial value of each slot
    fn zero(&self) -> Vec<Expr> {
        match self {
            Accumulator::Count { .. } => vec![Expr::i64(0)],
            Accumulator::Sum { ty, .. } | Accumulator::Extremum { ty, .. } => vec![Expr::none(ty)],
            Accumulator::Avg { ty, .. } => vec![Expr::none(ty), Expr::i64(0)],
        }
    }

    /// New value of each slot after adding row `t` with weight `w`
    fn step(&self, slots: &[Expr], t: &Expr, w: &Expr) -> CompileResult<Vec<Expr>> {
        let field = |column: usize| Expr::field(t.clone(), column);
        let steps = match self {
            Accumulator::Count { column } => {
                let value = column.map(&field).transpose()?;
                vec![count_step(slots[0].clone(), value, w)?]
            }
            Accumulator::Sum { column, ty } => vec![sum_step(slots[0].clone(), field(*column)?, ty, w)?],
            Accumulator::Extremum { op, column, .. } => {
                vec![accumulate(*op, slots[0].clone(), field(*column)?)?]
            }
            Accumulator::Avg { column, ty } => vec![
                sum_step(slots[0].clone(), field(*column)?, ty, w)?,
                count_step(slots[1].clone(), Some(field(*column)?), w)?,
            ],
        };
        Ok(steps)
    }

    /// Final value from the slots
    fn result(&self, slots: &[Expr]) -> CompileResult<Expr> {
        match self {
            Accumulator::Avg { ty, .. } => {
                binary(BinaryOp::Div, slots[0].clone(), weight_as(&slots[1], ty))
            }
            _ => Ok(slots[0].clone()),
        }
    }

    /// Value over an empty input
    fn empty_value(&self, result: &Type) -> Expr {
        match self {
            Accumulator::Count { .. } => Expr::i64(0),
            _ => Expr::none(result),
        }
    }
}

impl Lowering<'_> {
    /// `index_with -> stream_aggregate -> map`, plus the empty-input
    /// correction for a global aggregate
    pub(super) fn aggregate(
        &mut self,
        input: OperatorRef,
        group: &[usize],
        calls: &[AggregateCall],
    ) -> CompileResult<OperatorRef> {
        let fields = row_fields(&input)?;
        if let Some(&bad) = group.iter().find(|&&g| g >= fields.len()) {
            return Err(CompileError::construction(format!(
                "group column {bad} out of range for {} columns",
                fields.len()
            )));
        }
        if calls.is_empty() {
            return self.distinct_keys(input, group);
        }
        let accumulators = calls
            .iter()
            .map(|call| Accumulator::new(call, &fields))
            .collect::<CompileResult<Vec<_>>>()?;

        let row = element(&input)?;
        let fold = fold(&row, &accumulators)?;
        let indexed = self.index_grouped(input, group)?;
        let op = Operator::aggregate(self.ctx, indexed, fold)?;
        let grouped = self.emit(op)?;
        let flattened = self.flatten(grouped)?;
        tracing::trace!(
            group = group.len(),
            calls = calls.len(),
            stream = flattened.output_name(),
            "aggregate_lowered"
        );
        if !group.is_empty() {
            return Ok(flattened);
        }
        self.default_when_empty(flattened, &accumulators)
    }

    /// Grouping keys keep their nullability: NULL forms its own group
    fn index_grouped(&mut self, input: OperatorRef, group: &[usize]) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let keys = group
            .iter()
            .map(|&g| Expr::field(t.var(), g))
            .collect::<CompileResult<Vec<_>>>()?;
        let pair = Expr::raw_tuple(vec![Expr::tuple(keys), Expr::deref(t.var())?]);
        let op = Operator::index(self.ctx, input, Expr::closure(vec![t], pair))?;
        self.emit(op)
    }

    /// GROUP BY without aggregates
    fn distinct_keys(&mut self, input: OperatorRef, group: &[usize]) -> CompileResult<OperatorRef> {
        let t = row_param(&element(&input)?);
        let keys = group
            .iter()
            .map(|&g| Expr::field(t.var(), g))
            .collect::<CompileResult<Vec<_>>>()?;
        let op = Operator::map(self.ctx, input, Expr::closure(vec![t], Expr::tuple(keys)))?;
        let projected = self.emit(op)?;
        let op = Operator::distinct(self.ctx, projected)?;
        self.emit(op)
    }

    /// `|kv: (&K, &R)| TupleN::new(kv.0.0, .., kv.1.0, ..)`
    fn flatten(&mut self, grouped: OperatorRef) -> CompileResult<OperatorRef> {
        let (key, value) = grouped
            .output_type()
            .indexed_parts()
            .map(|(k, v)| (k.clone(), v.clone()))
            .ok_or_else(|| CompileError::invariant("aggregate produced a non-indexed stream"))?;
        let param_type = row_params(grouped.output_type())?
            .pop()
            .ok_or_else(|| CompileError::invariant("indexed stream without row parameter"))?;
        let kv = Param::new("kv", param_type);
        let mut fields = Vec::new();
        for (part, ty) in [(0, &key), (1, &value)] {
            let arity = ty.tuple_fields().map_or(0, <[Type]>::len);
            for i in 0..arity {
                fields.push(Expr::field(Expr::field(kv.var(), part)?, i)?);
            }
        }
        let op = Operator::map(self.ctx, grouped, Expr::closure(vec![kv], Expr::tuple(fields)))?;
        self.emit(op)
    }

    /// `aggregate + constant(default) - map(aggregate -> default)`
    fn default_when_empty(
        &mut self,
        aggregated: OperatorRef,
        accumulators: &[Accumulator],
    ) -> CompileResult<OperatorRef> {
        let result_types = row_fields(&aggregated)?;
        let defaults = accumulators
            .iter()
            .zip(&result_types)
            .map(|(acc, ty)| acc.empty_value(ty))
            .collect::<Vec<_>>();
        let default_row = Expr::tuple(defaults);
        let row_type = element(&aggregated)?;

        let value = Expr::zset(row_type.clone(), vec![(default_row.clone(), 1)])?;
        let op = Operator::constant(self.ctx, value)?;
        let constant = self.emit(op)?;
        let t = row_param(&row_type);
        let op = Operator::map(self.ctx, aggregated.clone(), Expr::closure(vec![t], default_row))?;
        let replaced = self.emit(op)?;
        let op = Operator::negate(self.ctx, replaced)?;
        let negated = self.emit(op)?;
        let op = Operator::sum(self.ctx, vec![aggregated, constant, negated])?;
        self.emit(op)
    }
}

/// One `Fold` computing every call of `calls` over rows of type `row`
pub(super) fn calls_fold(row: &Type, fields: &[Type], calls: &[AggregateCall]) -> CompileResult<Expr> {
    let accumulators = calls
        .iter()
        .map(|call| Accumulator::new(call, fields))
        .collect::<CompileResult<Vec<_>>>()?;
    fold(row, &accumulators)
}

/// The `Fold` computing every accumulator over rows of type `row`
fn fold(row: &Type, accumulators: &[Accumulator]) -> CompileResult<Expr> {
    let zero: Vec<Expr> = accumulators.iter().flat_map(Accumulator::zero).collect();
    let zero = Expr::tuple(zero);
    let acc_type = zero.ty().clone();

    // |acc, t, w| TupleN::new(step..)
    let acc = Param::new("acc", acc_type.clone());
    let t = Param::new("t", Type::reference(row.clone()));
    let w = Param::new("w", Type::int64());
    let mut steps = Vec::new();
    let mut slot = 0;
    for accumulator in accumulators {
        let width = accumulator.zero().len();
        let slots = (slot..slot + width)
            .map(|i| Expr::field(acc.var(), i))
            .collect::<CompileResult<Vec<_>>>()?;
        steps.extend(accumulator.step(&slots, &t.var(), &w.var())?);
        slot += width;
    }
    let increment = Expr::closure(vec![acc, t, w], Expr::tuple(steps));

    // |acc| TupleN::new(result..)
    let acc = Param::new("acc", acc_type);
    let mut results = Vec::new();
    let mut slot = 0;
    for accumulator in accumulators {
        let width = accumulator.zero().len();
        let slots = (slot..slot + width)
            .map(|i| Expr::field(acc.var(), i))
            .collect::<CompileResult<Vec<_>>>()?;
        results.push(accumulator.result(&slots)?);
        slot += width;
    }
    let post = Expr::closure(vec![acc], Expr::tuple(results));

    Expr::fold(row, zero, increment, post)
}

#[cfg(test)]
mod tests {
    use crate::circuit::Circuit;
    use crate::context::CompilationContext;
    use crate::error::CompileError;
    use crate::lowering::Lowering;
    use crate::plan::builders::PlanBuilder;
    use crate::plan::{AggregateCall, AggregateFunction, RelNode};
    use crate::types::Type;

    fn lower(query: RelNode) -> Result<Circuit, CompileError> {
        let plan = PlanBuilder::new("c")
            .table(
                "T",
                &[("g", Type::int32()), ("x", Type::int64().nullable()), ("s", Type::string())],
            )
            .view("V", query)
            .build();
        Lowering::lower(&plan, &mut CompilationContext::new())
    }

    fn operations(circuit: &Circuit) -> Vec<&'static str> {
        circuit.all_operators().map(|op| op.operation()).collect()
    }

    #[test]
    fn test_grouped_aggregate_shape() {
        let circuit = lower(RelNode::scan("T").aggregate(
            vec![0],
            vec![
                AggregateCall::count_star(),
                AggregateCall::new(AggregateFunction::Sum, Some(1)),
                AggregateCall::new(AggregateFunction::Max, Some(1)),
            ],
        ))
        .unwrap();
        assert_eq!(
            operations(&circuit),
            vec!["source", "index_with", "stream_aggregate", "map", "sink"]
        );
        let sink = circuit.sink("V").unwrap();
        assert_eq!(
            sink.output_type().to_string(),
            "ZSet<Tuple4<i32, i64, Option<i64>, Option<i64>>>"
        );
        let fold = circuit.operators()[1].function().unwrap().to_string();
        assert!(fold.contains("agg_plus_N_N"), "{fold}");
        assert!(fold.contains("agg_max_N_N"), "{fold}");
        assert!(fold.contains("times_i64N_i64"), "{fold}");
    }

    #[test]
    fn test_global_aggregate_default_row() {
        let circuit = lower(RelNode::scan("T").aggregate(vec![], vec![AggregateCall::count_star()])).unwrap();
        assert_eq!(
            operations(&circuit),
            vec![
                "source",
                "index_with",
                "stream_aggregate",
                "map",
                "constant",
                "map",
                "neg",
                "sum",
                "sink"
            ]
        );
        let constant = &circuit.operators()[3];
        assert_eq!(
            constant.function().unwrap().to_string(),
            "zset!(Tuple1::new(0) => 1)"
        );
    }

    #[test]
    fn test_avg_divides_in_post() {
        let circuit = lower(
            RelNode::scan("T").aggregate(vec![0], vec![AggregateCall::new(AggregateFunction::Avg, Some(1))]),
        )
        .unwrap();
        let fold = circuit.operators()[1].function().unwrap().to_string();
        assert!(fold.contains("div_i64N_i64"), "{fold}");
        let sink = circuit.sink("V").unwrap();
        assert_eq!(sink.output_type().to_string(), "ZSet<Tuple2<i32, Option<i64>>>");
    }

    #[test]
    fn test_group_without_calls_is_distinct() {
        let circuit = lower(RelNode::scan("T").aggregate(vec![0, 2], vec![])).unwrap();
        assert_eq!(operations(&circuit), vec!["source", "map", "distinct", "sink"]);
    }

    #[test]
    fn test_sum_of_string_unsupported() {
        let err = lower(
            RelNode::scan("T").aggregate(vec![0], vec![AggregateCall::new(AggregateFunction::Sum, Some(2))]),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
    }

    #[test]
    fn test_distinct_aggregate_unimplemented() {
        let mut call = AggregateCall::new(AggregateFunction::Count, Some(1));
        call.distinct = true;
        let err = lower(RelNode::scan("T").aggregate(vec![0], vec![call])).unwrap_err();
        assert!(matches!(err, CompileError::Unimplemented { .. }));
    }
}
