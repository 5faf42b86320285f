//! Window lowering.
//!
//! Only `RANGE` frames over a single non-null integer ORDER BY column are
//! lowered. Rows are keyed by their partition columns followed by the order
//! value. `window_aggregate` folds, for every key, the rows of the same
//! partition whose order value lies in the frame around the key's, and a
//! join puts those results next to every row with that key:
//!
//! ```text
//! SUM(x) OVER (PARTITION BY p ORDER BY o RANGE BETWEEN 2 PRECEDING AND CURRENT ROW)
//!
//! index_with(|t| (Tuple2::new(t.p, t.o), *t)) ──┬──► window_aggregate(-2..=0, fold)
//!                                               │            │
//!                                               └──► join ◄──┘
//! ```

use super::aggregate::calls_fold;
use super::{element, lower_literal, row_fields, row_param, Lowering};
use crate::circuit::{Operator, OperatorRef};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, Param};
use crate::plan::{AggregateCall, RelNode, Value, WindowBound};
use crate::types::{Type, TypeKind};

/// Offset of a frame bound from the current order value; `None` when unbounded
fn offset(bound: WindowBound) -> CompileResult<Option<i64>> {
    let magnitude = |n: u64| {
        i64::try_from(n).map_err(|_| CompileError::construction(format!("window offset {n} out of range")))
    };
    Ok(match bound {
        WindowBound::Unbounded => None,
        WindowBound::CurrentRow => Some(0),
        WindowBound::Preceding(n) => Some(-magnitude(n)?),
        WindowBound::Following(n) => Some(magnitude(n)?),
    })
}

impl Lowering<'_> {
    /// Input rows extended with one column per window call
    pub(super) fn window(
        &mut self,
        node: &RelNode,
        input: OperatorRef,
        partition: &[usize],
        order: usize,
        (lower, upper): (WindowBound, WindowBound),
        calls: &[AggregateCall],
    ) -> CompileResult<OperatorRef> {
        let fields = row_fields(&input)?;
        let width = fields.len();
        if let Some(&bad) = partition.iter().chain([&order]).find(|&&c| c >= width) {
            return Err(CompileError::construction(format!(
                "window column {bad} out of range for {width} columns"
            )));
        }
        if calls.is_empty() {
            return Ok(input);
        }
        let order_type = &fields[order];
        if !matches!(order_type.kind, TypeKind::Integer(_)) || order_type.may_be_null {
            return Err(CompileError::unimplemented(
                node,
                format!("window ordered by {order_type}, expected a non-null integer"),
            ));
        }
        let bound = |b: WindowBound| -> CompileResult<Option<Expr>> {
            offset(b)?
                .map(|o| lower_literal(&Value::Int(o), order_type))
                .transpose()
        };
        let frame = Expr::range(bound(lower)?, bound(upper)?, true)?;

        let row = element(&input)?;
        let fold = calls_fold(&row, &fields, calls)?;

        let t = row_param(&row);
        let mut keys = partition
            .iter()
            .map(|&p| Expr::field(t.var(), p))
            .collect::<CompileResult<Vec<_>>>()?;
        keys.push(Expr::field(t.var(), order)?);
        let pair = Expr::raw_tuple(vec![Expr::tuple(keys), Expr::deref(t.var())?]);
        let op = Operator::index(self.ctx, input, Expr::closure(vec![t], pair))?;
        let indexed = self.emit(op)?;
        let op = Operator::window_aggregate(self.ctx, indexed.clone(), frame, fold)?;
        let windowed = self.emit(op)?;

        let (key, results) = windowed
            .output_type()
            .indexed_parts()
            .map(|(k, v)| (k.clone(), v.clone()))
            .ok_or_else(|| CompileError::invariant("window_aggregate produced a non-indexed stream"))?;
        let extra = results.tuple_fields().map_or(0, <[Type]>::len);
        let k = Param::new("k", Type::reference(key));
        let l = Param::new("l", Type::reference(row));
        let r = Param::new("r", Type::reference(results));
        let mut out = Vec::with_capacity(width + extra);
        for i in 0..width {
            out.push(Expr::field(l.var(), i)?);
        }
        for i in 0..extra {
            out.push(Expr::field(r.var(), i)?);
        }
        let function = Expr::closure(vec![k, l, r], Expr::tuple(out));
        let op = Operator::join(self.ctx, indexed, windowed, function)?;
        let joined = self.emit(op)?;
        tracing::trace!(
            partition = partition.len(),
            calls = calls.len(),
            stream = joined.output_name(),
            "window_lowered"
        );
        Ok(joined)
    }
}
