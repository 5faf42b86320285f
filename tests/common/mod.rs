//! Test-only circuit evaluator over Z-sets.
//!
//! Runs a circuit one step at a time: each step feeds a Z-set per source and
//! returns a Z-set per sink. Values are untyped: `Option<T>` is either
//! `Val::Null` or the `T` value itself, and references are transparent.
//! Only the expression forms produced by lowering and the optimizer are
//! interpreted.

#![allow(dead_code)]

use deltaplan::circuit::{Circuit, Operator, OperatorKind};
use deltaplan::expr::{BinaryOp, Expr, ExprKind, Literal, Statement, UnaryOp};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Runtime value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<Val>),
}

pub fn int(v: i64) -> Val {
    Val::Int(v)
}

pub fn tuple(fields: Vec<Val>) -> Val {
    Val::Tuple(fields)
}

/// Rows with non-zero integer weights
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZSet(BTreeMap<Val, i64>);

impl ZSet {
    pub fn new() -> Self {
        ZSet::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (Val, i64)>) -> Self {
        let mut z = ZSet::new();
        for (row, weight) in rows {
            z.add(row, weight);
        }
        z
    }

    pub fn add(&mut self, row: Val, weight: i64) {
        let entry = self.0.entry(row.clone()).or_insert(0);
        *entry += weight;
        if *entry == 0 {
            self.0.remove(&row);
        }
    }

    pub fn plus(&self, other: &ZSet) -> ZSet {
        let mut out = self.clone();
        for (row, weight) in &other.0 {
            out.add(row.clone(), *weight);
        }
        out
    }

    pub fn negate(&self) -> ZSet {
        ZSet(self.0.iter().map(|(r, w)| (r.clone(), -w)).collect())
    }

    pub fn minus(&self, other: &ZSet) -> ZSet {
        self.plus(&other.negate())
    }

    pub fn distinct(&self) -> ZSet {
        ZSet(
            self.0
                .iter()
                .filter(|(_, w)| **w > 0)
                .map(|(r, _)| (r.clone(), 1))
                .collect(),
        )
    }

    pub fn weight(&self, row: &Val) -> i64 {
        self.0.get(row).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Val, i64)> {
        self.0.iter().map(|(r, w)| (r, *w))
    }
}

type Env = HashMap<String, Val>;

fn as_bool(v: &Val) -> bool {
    match v {
        Val::Bool(b) => *b,
        other => panic!("expected a bool, found {other:?}"),
    }
}

fn as_int(v: &Val) -> i64 {
    match v {
        Val::Int(i) => *i,
        other => panic!("expected an integer, found {other:?}"),
    }
}

fn literal(lit: &Literal) -> Val {
    match lit {
        Literal::Null => Val::Null,
        Literal::Bool(b) => Val::Bool(*b),
        Literal::Int(i) | Literal::Timestamp(i) | Literal::Interval(i) => Val::Int(*i),
        Literal::Date(d) => Val::Int(i64::from(*d)),
        Literal::USize(u) => Val::Int(*u as i64),
        Literal::String(s) => Val::Str(s.clone()),
        other => panic!("literal {other:?} not supported by the test evaluator"),
    }
}

/// Strict SQL semantics of a binary operator by its runtime key
fn apply_binary(key: &str, a: &Val, b: &Val) -> Val {
    match key {
        "and" => match (a, b) {
            (Val::Bool(false), _) | (_, Val::Bool(false)) => Val::Bool(false),
            (Val::Bool(true), Val::Bool(true)) => Val::Bool(true),
            _ => Val::Null,
        },
        "or" => match (a, b) {
            (Val::Bool(true), _) | (_, Val::Bool(true)) => Val::Bool(true),
            (Val::Bool(false), Val::Bool(false)) => Val::Bool(false),
            _ => Val::Null,
        },
        "is_distinct" => Val::Bool(a != b),
        _ if *a == Val::Null || *b == Val::Null => Val::Null,
        "eq" => Val::Bool(a == b),
        "neq" => Val::Bool(a != b),
        "lt" => Val::Bool(a < b),
        "gt" => Val::Bool(a > b),
        "lte" => Val::Bool(a <= b),
        "gte" => Val::Bool(a >= b),
        "min" => a.min(b).clone(),
        "max" => a.max(b).clone(),
        "plus" => Val::Int(as_int(a) + as_int(b)),
        "minus" => Val::Int(as_int(a) - as_int(b)),
        "times" => Val::Int(as_int(a) * as_int(b)),
        "div" if as_int(b) == 0 => Val::Null,
        "div" => Val::Int(as_int(a) / as_int(b)),
        "mod" if as_int(b) == 0 => Val::Null,
        "mod" => Val::Int(as_int(a) % as_int(b)),
        "band" => Val::Int(as_int(a) & as_int(b)),
        "bor" => Val::Int(as_int(a) | as_int(b)),
        "bxor" => Val::Int(as_int(a) ^ as_int(b)),
        "shiftl" => Val::Int(as_int(a) << as_int(b)),
        "shiftr" => Val::Int(as_int(a) >> as_int(b)),
        other => panic!("unknown operator {other}"),
    }
}

fn native_key(op: BinaryOp) -> &'static str {
    deltaplan::primitives::binary_key(op)
}

/// Runtime functions named by the primitive table
fn call(function: &str, args: &[Val]) -> Val {
    if let Some(rest) = function.strip_prefix("agg_") {
        let op = rest.split('_').next().unwrap_or_default();
        return match (&args[0], &args[1]) {
            (Val::Null, v) | (v, Val::Null) => v.clone(),
            (a, b) => apply_binary(op, a, b),
        };
    }
    for (prefix, expected, negated) in [
        ("is_not_true_", true, true),
        ("is_not_false_", false, true),
        ("is_true_", true, false),
        ("is_false_", false, false),
    ] {
        if function.starts_with(prefix) {
            return Val::Bool((args[0] == Val::Bool(expected)) != negated);
        }
    }
    if function.starts_with("is_distinct_") {
        return apply_binary("is_distinct", &args[0], &args[1]);
    }
    if function.starts_with("not_") {
        return match &args[0] {
            Val::Null => Val::Null,
            v => Val::Bool(!as_bool(v)),
        };
    }
    if function.starts_with("neg_") || function.starts_with("abs_") {
        return match &args[0] {
            Val::Null => Val::Null,
            v if function.starts_with("abs_") => Val::Int(as_int(v).abs()),
            v => Val::Int(-as_int(v)),
        };
    }
    let key = function.split('_').next().unwrap_or_default();
    apply_binary(key, &args[0], &args[1])
}

/// Evaluate `expr` in `env`
pub fn eval(expr: &Expr, env: &Env) -> Val {
    match expr.kind() {
        ExprKind::Literal(lit) => literal(lit),
        ExprKind::Var(name) => env
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("unbound variable {name}")),
        ExprKind::Field { base, index } => match eval(base, env) {
            Val::Tuple(fields) => fields[*index].clone(),
            other => panic!("field {index} of {other:?}"),
        },
        ExprKind::Unary { op, operand } => {
            let v = eval(operand, env);
            match op {
                UnaryOp::Not => Val::Bool(!as_bool(&v)),
                UnaryOp::Neg => Val::Int(-as_int(&v)),
            }
        }
        ExprKind::Binary { op, left, right } => {
            apply_binary(native_key(*op), &eval(left, env), &eval(right, env))
        }
        ExprKind::Apply { function, args } => {
            let args: Vec<Val> = args.iter().map(|a| eval(a, env)).collect();
            apply_closure(function, &args, env)
        }
        ExprKind::Call { function, args } => {
            let args: Vec<Val> = args.iter().map(|a| eval(a, env)).collect();
            call(function, &args)
        }
        ExprKind::Closure { .. } => panic!("closure evaluated outside an application"),
        ExprKind::Tuple(fields) | ExprKind::RawTuple(fields) | ExprKind::Struct { fields, .. } => {
            Val::Tuple(fields.iter().map(|f| eval(f, env)).collect())
        }
        ExprKind::Block { statements, result } => {
            let mut scope = env.clone();
            for statement in statements {
                match statement {
                    Statement::Let { name, init, .. } => {
                        let value = init.as_ref().map_or(Val::Null, |e| eval(e, &scope));
                        scope.insert(name.clone(), value);
                    }
                    Statement::Expr(e) => {
                        eval(e, &scope);
                    }
                }
            }
            result.as_ref().map_or(Val::Tuple(Vec::new()), |r| eval(r, &scope))
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if as_bool(&eval(condition, env)) {
                eval(then_branch, env)
            } else {
                eval(else_branch, env)
            }
        }
        ExprKind::Cast(operand)
        | ExprKind::Borrow(operand)
        | ExprKind::Deref(operand)
        | ExprKind::Some(operand) => eval(operand, env),
        ExprKind::IsNull(operand) => Val::Bool(eval(operand, env) == Val::Null),
        other => panic!("{other:?} not supported by the test evaluator"),
    }
}

/// Call a closure expression with already evaluated arguments
pub fn apply_closure(function: &Expr, args: &[Val], env: &Env) -> Val {
    let (params, body) = function
        .as_closure()
        .unwrap_or_else(|| panic!("applying non-closure {function}"));
    assert_eq!(params.len(), args.len(), "arity of {function}");
    let mut scope = env.clone();
    for (param, arg) in params.iter().zip(args) {
        scope.insert(param.name.clone(), arg.clone());
    }
    eval(body, &scope)
}

fn closure_call(function: &Expr, args: &[Val]) -> Val {
    apply_closure(function, args, &Env::new())
}

fn split_pair(row: &Val) -> (&Val, &Val) {
    match row {
        Val::Tuple(parts) if parts.len() == 2 => (&parts[0], &parts[1]),
        other => panic!("expected a (key, value) pair, found {other:?}"),
    }
}

fn join(function: &Expr, left: &ZSet, right: &ZSet) -> ZSet {
    let mut out = ZSet::new();
    for (l, lw) in left.iter() {
        let (lk, lv) = split_pair(l);
        for (r, rw) in right.iter() {
            let (rk, rv) = split_pair(r);
            if lk == rk {
                out.add(closure_call(function, &[lk.clone(), lv.clone(), rv.clone()]), lw * rw);
            }
        }
    }
    out
}

fn fold_parts(fold: &Expr) -> (&Expr, &Expr, &Expr) {
    match fold.kind() {
        ExprKind::Fold {
            zero,
            increment,
            post,
        } => (zero, increment, post),
        _ => panic!("expected a fold, found {fold}"),
    }
}

fn aggregate(fold: &Expr, input: &ZSet) -> ZSet {
    let (zero, increment, post) = fold_parts(fold);
    let mut groups: BTreeMap<Val, Vec<(Val, i64)>> = BTreeMap::new();
    for (row, weight) in input.iter() {
        let (k, v) = split_pair(row);
        groups.entry(k.clone()).or_default().push((v.clone(), weight));
    }
    let mut out = ZSet::new();
    for (key, values) in groups {
        let mut acc = eval(zero, &Env::new());
        for (value, weight) in values {
            acc = closure_call(increment, &[acc, value, Val::Int(weight)]);
        }
        out.add(tuple(vec![key, closure_call(post, &[acc])]), 1);
    }
    out
}

/// `(partition, order)` of a window key: the order value comes last
fn window_key(key: &Val) -> (&[Val], i64) {
    match key {
        Val::Tuple(fields) => {
            let (order, partition) = fields.split_last().expect("window key without order value");
            (partition, as_int(order))
        }
        other => panic!("window key {other:?}"),
    }
}

/// For every key, fold the values of its partition whose order value lies
/// in `window` relative to the key's
fn window_aggregate(window: &Expr, fold: &Expr, input: &ZSet) -> ZSet {
    let ExprKind::Range {
        start,
        end,
        inclusive,
    } = window.kind()
    else {
        panic!("expected a range, found {window}");
    };
    let bound = |e: &Option<Expr>| e.as_ref().map(|e| as_int(&eval(e, &Env::new())));
    let (lo, hi) = (bound(start), bound(end));
    let (zero, increment, post) = fold_parts(fold);

    let keys: BTreeSet<Val> = input.iter().map(|(row, _)| split_pair(row).0.clone()).collect();
    let mut out = ZSet::new();
    for key in keys {
        let (partition, order) = window_key(&key);
        let mut acc = eval(zero, &Env::new());
        for (row, weight) in input.iter() {
            let (k, v) = split_pair(row);
            let (p, o) = window_key(k);
            let offset = o - order;
            let inside = p == partition
                && lo.map_or(true, |lo| offset >= lo)
                && hi.map_or(true, |hi| if *inclusive { offset <= hi } else { offset < hi });
            if inside {
                acc = closure_call(increment, &[acc, v.clone(), Val::Int(weight)]);
            }
        }
        let result = closure_call(post, &[acc]);
        out.add(tuple(vec![key, result]), 1);
    }
    out
}

/// Whole-relation semantics of one operator
fn apply(op: &Operator, inputs: &[ZSet]) -> ZSet {
    let function = || op.function().expect("operator function");
    let mut out = ZSet::new();
    match op.kind() {
        OperatorKind::Map | OperatorKind::Index => {
            for (row, weight) in inputs[0].iter() {
                out.add(closure_call(function(), &[row.clone()]), weight);
            }
        }
        OperatorKind::Filter => {
            for (row, weight) in inputs[0].iter() {
                if as_bool(&closure_call(function(), &[row.clone()])) {
                    out.add(row.clone(), weight);
                }
            }
        }
        OperatorKind::Join | OperatorKind::IncrementalJoin => {
            return join(function(), &inputs[0], &inputs[1])
        }
        OperatorKind::Aggregate | OperatorKind::IncrementalAggregate => {
            return aggregate(function(), &inputs[0])
        }
        OperatorKind::WindowAggregate { window } => {
            return window_aggregate(window, function(), &inputs[0])
        }
        OperatorKind::Distinct | OperatorKind::IncrementalDistinct => return inputs[0].distinct(),
        OperatorKind::Sum => {
            for input in inputs {
                out = out.plus(input);
            }
        }
        OperatorKind::Subtract => return inputs[0].minus(&inputs[1]),
        OperatorKind::Negate => return inputs[0].negate(),
        OperatorKind::Noop | OperatorKind::Sink { .. } => return inputs[0].clone(),
        OperatorKind::Constant => match function().kind() {
            ExprKind::Literal(Literal::ZSet(rows)) => {
                for (row, weight) in rows {
                    out.add(eval(row, &Env::new()), *weight);
                }
            }
            other => panic!("constant {other:?}"),
        },
        other => panic!("{other:?} has no whole-relation semantics here"),
    }
    out
}

/// Steps a circuit, keeping the state of its stateful operators
pub struct Runner<'a> {
    circuit: &'a Circuit,
    /// Running sums of integrals and the previous inputs of
    /// differentiates and incremental operators, by output name
    state: HashMap<String, Vec<ZSet>>,
}

impl<'a> Runner<'a> {
    pub fn new(circuit: &'a Circuit) -> Self {
        Runner {
            circuit,
            state: HashMap::new(),
        }
    }

    /// Feed one Z-set per table (missing tables get an empty one) and
    /// return the output of every view
    pub fn step(&mut self, inputs: &[(&str, ZSet)]) -> HashMap<String, ZSet> {
        let mut values: HashMap<String, ZSet> = HashMap::new();
        let mut outputs = HashMap::new();
        let circuit = self.circuit;
        for op in circuit.all_operators() {
            let args: Vec<ZSet> = op
                .inputs()
                .iter()
                .map(|i| values[i.output_name()].clone())
                .collect();
            let name = op.output_name().to_string();
            let value = match op.kind() {
                OperatorKind::Source { table } => inputs
                    .iter()
                    .find(|(t, _)| *t == table.as_str())
                    .map(|(_, z)| z.clone())
                    .unwrap_or_default(),
                OperatorKind::Integrate => {
                    let state = self.state.entry(name.clone()).or_insert_with(|| vec![ZSet::new()]);
                    state[0] = state[0].plus(&args[0]);
                    state[0].clone()
                }
                OperatorKind::Differentiate => {
                    let state = self.state.entry(name.clone()).or_insert_with(|| vec![ZSet::new()]);
                    let delta = args[0].minus(&state[0]);
                    state[0] = args[0].clone();
                    delta
                }
                OperatorKind::IncrementalDistinct | OperatorKind::IncrementalAggregate => {
                    // input is the integral; output the change of the result
                    let previous = self
                        .state
                        .insert(name.clone(), vec![args[0].clone()])
                        .map_or_else(ZSet::new, |mut s| s.remove(0));
                    apply(op, &args).minus(&apply(op, &[previous]))
                }
                OperatorKind::IncrementalJoin => {
                    let state = self
                        .state
                        .entry(name.clone())
                        .or_insert_with(|| vec![ZSet::new(), ZSet::new()]);
                    let before = apply(op, &state.clone());
                    state[0] = state[0].plus(&args[0]);
                    state[1] = state[1].plus(&args[1]);
                    apply(op, &state.clone()).minus(&before)
                }
                _ => apply(op, &args),
            };
            if let OperatorKind::Sink { view } = op.kind() {
                outputs.insert(view.clone(), value.clone());
            }
            values.insert(name, value);
        }
        outputs
    }
}
