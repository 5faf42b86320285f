//! Reachability analysis.
//!
//! An operator is live if it is a source, or if some sink depends on it
//! through a chain of inputs. Everything else can be dropped without
//! changing any sink's output.

use crate::circuit::{Circuit, CircuitVisitor, Operator, OperatorKind};
use crate::error::CompileResult;
use std::collections::HashSet;

/// Output names of the live operators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachable {
    names: HashSet<String>,
}

impl Reachable {
    pub fn contains(&self, op: &Operator) -> bool {
        self.names.contains(op.output_name())
    }

    pub fn contains_name(&self, output_name: &str) -> bool {
        self.names.contains(output_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn keep(&mut self, op: &Operator) -> bool {
        let inserted = self.names.insert(op.output_name().to_string());
        if inserted {
            tracing::trace!(operator = op.output_name(), "reachable");
        }
        inserted
    }
}

pub struct DeadCodeAnalysis {
    reachable: Reachable,
}

impl DeadCodeAnalysis {
    /// Compute the live operators of `circuit`
    pub fn analyze(circuit: &Circuit) -> CompileResult<Reachable> {
        let mut analysis = DeadCodeAnalysis {
            reachable: Reachable::default(),
        };
        circuit.accept(&mut analysis)?;
        tracing::debug!(
            live = analysis.reachable.len(),
            total = circuit.len(),
            "dead_code_analyzed"
        );
        Ok(analysis.reachable)
    }
}

impl CircuitVisitor for DeadCodeAnalysis {
    fn preorder(&mut self, op: &Operator) -> CompileResult<bool> {
        match op.kind() {
            OperatorKind::Source { .. } => {
                self.reachable.keep(op);
            }
            OperatorKind::Sink { .. } => {
                let mut pending = vec![op];
                while let Some(next) = pending.pop() {
                    if self.reachable.keep(next) {
                        pending.extend(next.inputs().iter().map(|i| &**i));
                    }
                }
            }
            _ => {}
        }
        Ok(false)
    }
}
