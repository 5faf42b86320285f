//! Renderings of a circuit for debugging: a text listing (`Display`),
//! Graphviz DOT, and a JSON summary.

use super::visitor::CircuitVisitor;
use super::{Circuit, Operator, OperatorKind};
use crate::error::CompileResult;
use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Serializable description of one operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSummary {
    pub name: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub inputs: Vec<String>,
    pub output_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub multiset: bool,
}

/// Serializable description of a circuit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSummary {
    pub name: String,
    pub sources: Vec<OperatorSummary>,
    pub operators: Vec<OperatorSummary>,
    pub sinks: Vec<OperatorSummary>,
}

impl From<&Operator> for OperatorSummary {
    fn from(op: &Operator) -> Self {
        let relation = match op.kind() {
            OperatorKind::Source { table } => Some(table.clone()),
            OperatorKind::Sink { view } => Some(view.clone()),
            _ => None,
        };
        let function = match (op.kind(), op.function()) {
            (OperatorKind::WindowAggregate { window }, Some(f)) => Some(format!("{window}, {f}")),
            (_, f) => f.map(ToString::to_string),
        };
        OperatorSummary {
            name: op.output_name().to_string(),
            operation: op.operation().to_string(),
            relation,
            inputs: op.inputs().iter().map(|i| i.output_name().to_string()).collect(),
            output_type: op.output_type().clone(),
            function,
            multiset: op.is_multiset(),
        }
    }
}

impl From<&Circuit> for CircuitSummary {
    fn from(circuit: &Circuit) -> Self {
        let summarize = |ops: &[super::OperatorRef]| ops.iter().map(|op| OperatorSummary::from(&**op)).collect();
        CircuitSummary {
            name: circuit.name().to_string(),
            sources: summarize(circuit.sources()),
            operators: summarize(circuit.operators()),
            sinks: summarize(circuit.sinks()),
        }
    }
}

struct DotWriter {
    out: String,
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

impl CircuitVisitor for DotWriter {
    fn preorder_circuit(&mut self, circuit: &Circuit) -> CompileResult<()> {
        let _ = writeln!(self.out, "digraph {} {{", circuit.name());
        Ok(())
    }

    fn postorder_circuit(&mut self, _circuit: &Circuit) -> CompileResult<()> {
        self.out.push_str("}\n");
        Ok(())
    }

    fn preorder(&mut self, op: &Operator) -> CompileResult<bool> {
        let _ = writeln!(
            self.out,
            "  {} [ shape=box,label=\"{}\" ]",
            op.output_name(),
            escape(&op.to_string())
        );
        for input in op.inputs() {
            let _ = writeln!(self.out, "  {} -> {};", input.output_name(), op.output_name());
        }
        Ok(false)
    }
}

impl Circuit {
    /// Graphviz rendering, one box per operator
    pub fn to_dot(&self) -> CompileResult<String> {
        let mut writer = DotWriter { out: String::new() };
        self.accept(&mut writer)?;
        Ok(writer.out)
    }

    pub fn summary(&self) -> CircuitSummary {
        CircuitSummary::from(self)
    }

    /// Pretty-printed JSON summary
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.summary())
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "circuit {} {{", self.name())?;
        for declaration in self.declarations() {
            writeln!(f, "    struct {declaration};")?;
        }
        for op in self.all_operators() {
            writeln!(f, "    {op};")?;
        }
        write!(f, "}}")
    }
}
