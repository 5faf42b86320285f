//! # Relational Plan
//!
//! The typed plan a front end hands to the compiler: tables with typed
//! columns, and views as trees of relational operators over them. Names are
//! resolved and every column carries its type; column references are
//! positional.
//!
//! ```text
//! SELECT a + b FROM T WHERE a > 0
//!
//! Project [col0 + col1]
//! └── Filter (col0 > 0)
//!     └── Scan T
//! ```
//!
//! Plans are plain data and (de)serialize with serde, so a front end in any
//! language can produce them as JSON.

pub mod builders;

use crate::expr::BinaryOp;
use crate::types::Type;
use serde::{Deserialize, Serialize};

/// A set of tables and the views defined over them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_plan_name")]
    pub name: String,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
}

fn default_plan_name() -> String {
    "circuit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Key column positions; a table with a key holds no duplicate rows
    #[serde(default)]
    pub primary_key: Vec<usize>,
}

impl Table {
    /// Column types in order
    pub fn row_types(&self) -> Vec<Type> {
        self.columns.iter().map(|c| c.ty.clone()).collect()
    }
}

/// A named query. Views may scan tables and views declared before them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub query: RelNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// `COUNT(*)` without an argument, `COUNT(col)` with one
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    /// Input column, absent for `COUNT(*)`
    #[serde(default)]
    pub argument: Option<usize>,
    /// `AGG(DISTINCT col)`
    #[serde(default)]
    pub distinct: bool,
}

/// Relational operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RelNode {
    /// Read a table or an earlier view
    Scan { table: String },
    Project {
        input: Box<RelNode>,
        exprs: Vec<ScalarExpr>,
    },
    Filter {
        input: Box<RelNode>,
        condition: ScalarExpr,
    },
    /// Join; the output row is the left row followed by the right row, and
    /// `condition` is evaluated over that concatenation
    Join {
        left: Box<RelNode>,
        right: Box<RelNode>,
        kind: JoinKind,
        condition: ScalarExpr,
    },
    /// Grouped aggregate; output row is the group columns followed by one
    /// column per call
    Aggregate {
        input: Box<RelNode>,
        group: Vec<usize>,
        calls: Vec<AggregateCall>,
    },
    Union { inputs: Vec<RelNode>, all: bool },
    /// `EXCEPT`: rows of the first input absent from all others
    Minus { inputs: Vec<RelNode>, all: bool },
    /// `INTERSECT`: rows present in every input
    Intersect { inputs: Vec<RelNode>, all: bool },
    Distinct { input: Box<RelNode> },
    /// Literal rows
    Values {
        columns: Vec<Type>,
        rows: Vec<Vec<Value>>,
    },
    /// `OVER (PARTITION BY .. ORDER BY .. RANGE BETWEEN lower AND upper)`;
    /// output row is the input row followed by one column per call
    Window {
        input: Box<RelNode>,
        partition: Vec<usize>,
        order: Vec<usize>,
        #[serde(default)]
        lower: WindowBound,
        #[serde(default = "WindowBound::current_row")]
        upper: WindowBound,
        calls: Vec<AggregateCall>,
    },
}

/// One end of a `RANGE` frame, measured from the current row's ORDER BY value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowBound {
    /// `UNBOUNDED PRECEDING` as a lower bound, `UNBOUNDED FOLLOWING` as an upper one
    #[default]
    Unbounded,
    CurrentRow,
    Preceding(u64),
    Following(u64),
}

impl WindowBound {
    fn current_row() -> Self {
        WindowBound::CurrentRow
    }
}

/// Literal values of the plan language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal in text form
    Decimal(String),
    String(String),
    /// Days since the epoch
    Date(i32),
    /// Milliseconds since the epoch
    Timestamp(i64),
}

/// SQL unary operators and predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Neg,
    IsNull,
    IsNotNull,
    IsTrue,
    IsFalse,
    IsNotTrue,
    IsNotFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: ScalarExpr,
    pub then: ScalarExpr,
}

/// Scalar expressions over the columns of the input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ScalarExpr {
    Column { index: usize },
    Literal { value: Value, ty: Type },
    Unary {
        op: UnaryOperator,
        operand: Box<ScalarExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Cast { operand: Box<ScalarExpr>, ty: Type },
    Case {
        branches: Vec<CaseBranch>,
        otherwise: Box<ScalarExpr>,
    },
}

// Convenience constructors, mostly for tests and embedding front ends

impl RelNode {
    pub fn scan(table: impl Into<String>) -> Self {
        RelNode::Scan {
            table: table.into(),
        }
    }

    pub fn project(self, exprs: Vec<ScalarExpr>) -> Self {
        RelNode::Project {
            input: Box::new(self),
            exprs,
        }
    }

    pub fn filter(self, condition: ScalarExpr) -> Self {
        RelNode::Filter {
            input: Box::new(self),
            condition,
        }
    }

    pub fn join(self, right: RelNode, kind: JoinKind, condition: ScalarExpr) -> Self {
        RelNode::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            condition,
        }
    }

    pub fn aggregate(self, group: Vec<usize>, calls: Vec<AggregateCall>) -> Self {
        RelNode::Aggregate {
            input: Box::new(self),
            group,
            calls,
        }
    }

    pub fn distinct(self) -> Self {
        RelNode::Distinct {
            input: Box::new(self),
        }
    }

    /// Window over one ORDER BY column
    pub fn window(
        self,
        partition: Vec<usize>,
        order: usize,
        (lower, upper): (WindowBound, WindowBound),
        calls: Vec<AggregateCall>,
    ) -> Self {
        RelNode::Window {
            input: Box::new(self),
            partition,
            order: vec![order],
            lower,
            upper,
            calls,
        }
    }
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, argument: Option<usize>) -> Self {
        AggregateCall {
            function,
            argument,
            distinct: false,
        }
    }

    pub fn count_star() -> Self {
        AggregateCall::new(AggregateFunction::Count, None)
    }
}

impl ScalarExpr {
    pub fn column(index: usize) -> Self {
        ScalarExpr::Column { index }
    }

    pub fn literal(value: Value, ty: Type) -> Self {
        ScalarExpr::Literal { value, ty }
    }

    pub fn int32(value: i32) -> Self {
        ScalarExpr::literal(Value::Int(i64::from(value)), Type::int32())
    }

    pub fn boolean(value: bool) -> Self {
        ScalarExpr::literal(Value::Bool(value), Type::bool())
    }

    pub fn null() -> Self {
        ScalarExpr::literal(Value::Null, Type::null())
    }

    pub fn binary(op: BinaryOp, left: ScalarExpr, right: ScalarExpr) -> Self {
        ScalarExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: ScalarExpr) -> Self {
        ScalarExpr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn cast(operand: ScalarExpr, ty: Type) -> Self {
        ScalarExpr::Cast {
            operand: Box::new(operand),
            ty,
        }
    }
}
