//! Rust-like rendering of expressions, used in circuit dumps and test failures

use super::{Expr, ExprKind, Literal, Pattern, Statement};
use std::fmt;

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "None"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Decimal(v) => write!(f, "Decimal::from_str({v:?})"),
            Literal::String(s) => write!(f, "String::from({s:?})"),
            Literal::Date(d) => write!(f, "Date::new({d})"),
            Literal::Timestamp(t) => write!(f, "Timestamp::new({t})"),
            Literal::Interval(i) => write!(f, "ShortInterval::new({i})"),
            Literal::USize(v) => write!(f, "{v}usize"),
            Literal::ZSet(rows) => {
                write!(f, "zset!(")?;
                for (i, (row, weight)) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{row} => {weight}")?;
                }
                write!(f, ")")
            }
            Literal::Vec(items) => {
                write!(f, "vec!(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Identifier { name, mutable } => {
                if *mutable {
                    write!(f, "mut ")?;
                }
                write!(f, "{name}")
            }
            Pattern::Wildcard => write!(f, "_"),
            Pattern::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Pattern::Some(inner) => write!(f, "Some({inner})"),
            Pattern::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Literal(Literal::Null) if self.ty().is_null_type() => write!(f, "null"),
            ExprKind::Literal(Literal::Null) => write!(f, "None::<{}>", self.ty().non_null()),
            ExprKind::Literal(lit) => write!(f, "{lit}"),
            ExprKind::Var(name) => write!(f, "{name}"),
            ExprKind::Field { base, index } => write!(f, "{base}.{index}"),
            ExprKind::Unary { op, operand } => write!(f, "({}{operand})", op.symbol()),
            ExprKind::Binary { op, left, right } if op.is_native() => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExprKind::Binary { op, left, right } => write!(f, "{}({left}, {right})", op.symbol()),
            ExprKind::Apply { function, args } => {
                write!(f, "({function})(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Closure { params, body } => {
                write!(f, "move |")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", param.name, param.ty)?;
                }
                write!(f, "| {body}")
            }
            ExprKind::Tuple(fields) => {
                write!(f, "Tuple{}::new(", fields.len())?;
                write_list(f, fields)?;
                write!(f, ")")
            }
            ExprKind::RawTuple(fields) => {
                write!(f, "(")?;
                write_list(f, fields)?;
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            ExprKind::Struct { name, fields } => {
                write!(f, "{name}::new(")?;
                write_list(f, fields)?;
                write!(f, ")")
            }
            ExprKind::Block { statements, result } => {
                write!(f, "{{ ")?;
                for statement in statements {
                    match statement {
                        Statement::Let {
                            name,
                            ty,
                            init,
                            mutable,
                        } => {
                            write!(f, "let {}{name}: {ty}", if *mutable { "mut " } else { "" })?;
                            if let Some(init) = init {
                                write!(f, " = {init}")?;
                            }
                            write!(f, "; ")?;
                        }
                        Statement::Expr(e) => write!(f, "{e}; ")?,
                    }
                }
                if let Some(result) = result {
                    write!(f, "{result} ")?;
                }
                write!(f, "}}")
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "if {condition} {{ {then_branch} }} else {{ {else_branch} }}"),
            ExprKind::Match { scrutinee, arms } => {
                write!(f, "match {scrutinee} {{ ")?;
                for arm in arms {
                    write!(f, "{} => {}, ", arm.pattern, arm.body)?;
                }
                write!(f, "}}")
            }
            ExprKind::Cast(operand) => write!(f, "({operand} as {})", self.ty()),
            ExprKind::IsNull(operand) => write!(f, "{operand}.is_none()"),
            ExprKind::Borrow(operand) => write!(f, "&{operand}"),
            ExprKind::Deref(operand) => write!(f, "(*{operand})"),
            ExprKind::Range {
                start,
                end,
                inclusive,
            } => {
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                write!(f, "{}", if *inclusive { "..=" } else { ".." })?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                Ok(())
            }
            ExprKind::Some(operand) => write!(f, "Some({operand})"),
            ExprKind::Fold {
                zero,
                increment,
                post,
            } => write!(f, "Fold::with_output({zero}, {increment}, {post})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{BinaryOp, Expr, Param};
    use crate::types::Type;

    #[test]
    fn test_render_closure() {
        let t = Param::new("t", Type::reference(Type::tuple(vec![Type::int32(), Type::int32()])));
        let body = Expr::binary(
            BinaryOp::Add,
            Expr::field(t.var(), 0).unwrap(),
            Expr::field(t.var(), 1).unwrap(),
        )
        .unwrap();
        let c = Expr::closure(vec![t], body);
        assert_eq!(c.to_string(), "move |t: &Tuple2<i32, i32>| (t.0 + t.1)");
    }

    #[test]
    fn test_render_literals() {
        assert_eq!(Expr::none(&Type::int32()).to_string(), "None::<i32>");
        assert_eq!(Expr::null().to_string(), "null");
        assert_eq!(Expr::string("a").to_string(), "String::from(\"a\")");
        let z = Expr::zset(Type::int32(), vec![(Expr::i32(1), 2)]).unwrap();
        assert_eq!(z.to_string(), "zset!(1 => 2)");
    }
}
