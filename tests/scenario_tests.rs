//! End-to-end Scenarios
//!
//! Compiles small plans through the whole pipeline and runs the resulting
//! circuits on Z-set batches.

mod common;

use common::{int, tuple, Runner, Val, ZSet};
use deltaplan::expr::{BetaReducer, BinaryOp, Expr, Param, Simplifier};
use deltaplan::plan::builders::PlanBuilder;
use deltaplan::plan::{RelNode, ScalarExpr};
use deltaplan::{CompilationContext, Compiler, CompilerConfig, OptimizerConfig, Type};

fn compiler(optimizer: OptimizerConfig) -> Compiler {
    Compiler::new(CompilerConfig {
        optimizer,
        ..CompilerConfig::default()
    })
}

fn operations(circuit: &deltaplan::Circuit) -> Vec<&'static str> {
    circuit.all_operators().map(|op| op.operation()).collect()
}

#[test]
fn test_filter_then_project() {
    let plan = PlanBuilder::new("scenario1")
        .table("T", &[("a", Type::int32().nullable()), ("b", Type::int32())])
        .view(
            "V",
            RelNode::scan("T")
                .filter(ScalarExpr::binary(BinaryOp::Gt, ScalarExpr::column(0), ScalarExpr::int32(0)))
                .project(vec![ScalarExpr::binary(
                    BinaryOp::Add,
                    ScalarExpr::column(0),
                    ScalarExpr::column(1),
                )]),
        )
        .build();
    let circuit = Compiler::default().compile(&plan).unwrap();

    assert_eq!(operations(&circuit), vec!["source", "filter", "map", "sink"]);

    let filter = &circuit.operators()[0];
    let predicate = filter.function().unwrap().result_type().unwrap();
    assert!(predicate.is_bool());
    assert!(!predicate.may_be_null);

    let map = &circuit.operators()[1];
    assert_eq!(map.function().unwrap().result_type().unwrap().to_string(), "Tuple1<Option<i32>>");

    let mut runner = Runner::new(&circuit);
    let rows = ZSet::from_rows([
        (tuple(vec![int(1), int(10)]), 1),
        (tuple(vec![int(-1), int(10)]), 1),
        (tuple(vec![Val::Null, int(10)]), 1),
        (tuple(vec![int(2), int(20)]), 2),
    ]);
    let out = runner.step(&[("T", rows)]);
    let expected = ZSet::from_rows([(tuple(vec![int(11)]), 1), (tuple(vec![int(22)]), 2)]);
    assert_eq!(out["V"], expected);
}

#[test]
fn test_incremental_distinct() {
    let plan = PlanBuilder::new("scenario2")
        .table("T", &[("a", Type::int32())])
        .view("V", RelNode::scan("T").distinct())
        .build();
    let circuit = compiler(OptimizerConfig::incremental()).compile(&plan).unwrap();

    assert_eq!(
        operations(&circuit),
        vec!["source", "integrate", "incremental_distinct", "sink"]
    );
    let sink = circuit.sink("V").unwrap();
    let distinct = &sink.inputs()[0];
    assert_eq!(distinct.operation(), "incremental_distinct");
    assert_eq!(distinct.inputs()[0].operation(), "integrate");

    let row1 = tuple(vec![int(1)]);
    let mut runner = Runner::new(&circuit);

    let first = runner.step(&[("T", ZSet::from_rows([(row1.clone(), 1)]))]);
    assert_eq!(first["V"], ZSet::from_rows([(row1.clone(), 1)]));

    // {+row1, -row1} cancels out inside the batch
    let second = runner.step(&[("T", ZSet::from_rows([(row1.clone(), 1), (row1, -1)]))]);
    assert!(second["V"].is_empty());
}

#[test]
fn test_incremental_distinct_retraction() {
    let plan = PlanBuilder::new("retract")
        .table("T", &[("a", Type::int32())])
        .view("V", RelNode::scan("T").distinct())
        .build();
    let circuit = compiler(OptimizerConfig::incremental()).compile(&plan).unwrap();
    let row = tuple(vec![int(7)]);
    let mut runner = Runner::new(&circuit);

    let out = runner.step(&[("T", ZSet::from_rows([(row.clone(), 3)]))]);
    assert_eq!(out["V"].weight(&row), 1);
    let out = runner.step(&[("T", ZSet::from_rows([(row.clone(), -2)]))]);
    assert!(out["V"].is_empty());
    let out = runner.step(&[("T", ZSet::from_rows([(row.clone(), -1)]))]);
    assert_eq!(out["V"].weight(&row), -1);
}

#[test]
fn test_beta_then_simplify() {
    // (|x: bool| if x { true } else { false })(is_null(5))
    let x = Param::new("x", Type::bool());
    let body = Expr::if_else(x.var(), Expr::bool(true), Expr::bool(false)).unwrap();
    let app = Expr::apply(Expr::closure(vec![x], body), vec![Expr::is_null(Expr::i32(5))]).unwrap();

    let mut ctx = CompilationContext::new();
    let reduced = BetaReducer::new(&mut ctx).reduce(&app).unwrap();
    let simplified = Simplifier::new().simplify(&reduced).unwrap();

    assert_eq!(simplified, Expr::bool(false));
    assert!(!simplified.ty().may_be_null);
}
