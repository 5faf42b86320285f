//! # Circuit IR
//!
//! A circuit is a DAG of operators over ZSets, compiled from a set of views:
//!
//! ```text
//! sources      source(T)                    one per table
//!                 │
//! operators    filter ─► map ─► distinct    declaration order is a
//!                 │                          topological order
//! sinks        sink(V)                      one per view
//! ```
//!
//! Every operator only references operators declared before it, so the
//! declaration order is always a valid evaluation order. Passes never mutate
//! a circuit; they return a new one sharing the operators they did not touch.

pub mod export;
pub mod operator;
pub mod rebuild;
pub mod visitor;

pub use operator::{Operator, OperatorKind, OperatorRef};
pub use rebuild::CircuitRebuilder;
pub use visitor::CircuitVisitor;

use crate::error::{CompileError, CompileResult};
use crate::types::{Type, TypeKind};
use std::collections::HashSet;
use std::sync::Arc;

/// A compiled circuit
#[derive(Debug, Clone)]
pub struct Circuit {
    name: String,
    /// Struct types the circuit's expressions refer to
    declarations: Vec<Type>,
    sources: Vec<OperatorRef>,
    operators: Vec<OperatorRef>,
    sinks: Vec<OperatorRef>,
    /// Output names declared so far
    declared: HashSet<String>,
}

impl Circuit {
    pub fn new(name: impl Into<String>) -> Self {
        Circuit {
            name: name.into(),
            declarations: Vec::new(),
            sources: Vec::new(),
            operators: Vec::new(),
            sinks: Vec::new(),
            declared: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declarations(&self) -> &[Type] {
        &self.declarations
    }

    pub fn sources(&self) -> &[OperatorRef] {
        &self.sources
    }

    /// Interior operators, in declaration order
    pub fn operators(&self) -> &[OperatorRef] {
        &self.operators
    }

    pub fn sinks(&self) -> &[OperatorRef] {
        &self.sinks
    }

    /// Sources, then interior operators, then sinks
    pub fn all_operators(&self) -> impl Iterator<Item = &OperatorRef> {
        self.sources
            .iter()
            .chain(self.operators.iter())
            .chain(self.sinks.iter())
    }

    pub fn len(&self) -> usize {
        self.sources.len() + self.operators.len() + self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, output_name: &str) -> bool {
        self.declared.contains(output_name)
    }

    pub fn operator(&self, output_name: &str) -> Option<&OperatorRef> {
        self.all_operators().find(|op| op.output_name() == output_name)
    }

    pub fn source(&self, table: &str) -> Option<&OperatorRef> {
        self.sources
            .iter()
            .find(|op| matches!(op.kind(), OperatorKind::Source { table: t } if t == table))
    }

    pub fn sink(&self, view: &str) -> Option<&OperatorRef> {
        self.sinks
            .iter()
            .find(|op| matches!(op.kind(), OperatorKind::Sink { view: v } if v == view))
    }

    /// True when both circuits hold the same operators (by identity) in the same order
    pub fn same_operators(&self, other: &Circuit) -> bool {
        self.len() == other.len()
            && self
                .all_operators()
                .zip(other.all_operators())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    /// Declare a struct type
    pub fn add_declaration(&mut self, ty: Type) -> CompileResult<()> {
        let TypeKind::Struct { name, .. } = &ty.kind else {
            return Err(CompileError::construction(format!(
                "only struct types can be declared, found {ty}"
            )));
        };
        if self
            .declarations
            .iter()
            .any(|d| matches!(&d.kind, TypeKind::Struct { name: n, .. } if n == name))
        {
            return Err(CompileError::construction(format!(
                "struct {name} declared twice"
            )));
        }
        self.declarations.push(ty);
        Ok(())
    }

    fn declare(&mut self, op: &Operator) -> CompileResult<()> {
        for input in op.inputs() {
            if !self.declared.contains(input.output_name()) {
                return Err(CompileError::construction(format!(
                    "{} reads {} before it is declared",
                    op.output_name(),
                    input.output_name()
                )));
            }
        }
        if !self.declared.insert(op.output_name().to_string()) {
            return Err(CompileError::construction(format!(
                "stream {} declared twice",
                op.output_name()
            )));
        }
        Ok(())
    }

    /// Add an operator to the section matching its kind
    pub fn add(&mut self, op: OperatorRef) -> CompileResult<()> {
        self.declare(&op)?;
        match op.kind() {
            OperatorKind::Source { .. } => self.sources.push(op),
            OperatorKind::Sink { .. } => self.sinks.push(op),
            _ => self.operators.push(op),
        }
        Ok(())
    }

    /// Accept a visitor: sources, interior operators, sinks, in declaration order
    pub fn accept<V: CircuitVisitor + ?Sized>(&self, visitor: &mut V) -> CompileResult<()> {
        visitor.preorder_circuit(self)?;
        for op in self.all_operators() {
            if visitor.preorder(op)? {
                visitor.postorder(op)?;
            }
        }
        visitor.postorder_circuit(self)
    }
}
