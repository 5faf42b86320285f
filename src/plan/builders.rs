//! Builder for assembling plans, particularly useful for tests.
//!
//! ```rust
//! use deltaplan::plan::builders::PlanBuilder;
//! use deltaplan::plan::RelNode;
//! use deltaplan::types::Type;
//!
//! let plan = PlanBuilder::new("demo")
//!     .table("T", &[("a", Type::int32())])
//!     .view("V", RelNode::scan("T").distinct())
//!     .build();
//! assert_eq!(plan.views.len(), 1);
//! ```

use super::{Column, Plan, RelNode, Table, View};
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: Plan,
}

impl PlanBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        PlanBuilder {
            plan: Plan {
                name: name.into(),
                tables: Vec::new(),
                views: Vec::new(),
            },
        }
    }

    /// Add a table without a primary key
    pub fn table(self, name: &str, columns: &[(&str, Type)]) -> Self {
        self.keyed_table(name, columns, Vec::new())
    }

    pub fn keyed_table(mut self, name: &str, columns: &[(&str, Type)], primary_key: Vec<usize>) -> Self {
        self.plan.tables.push(Table {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, ty)| Column {
                    name: (*n).to_string(),
                    ty: ty.clone(),
                })
                .collect(),
            primary_key,
        });
        self
    }

    pub fn view(mut self, name: &str, query: RelNode) -> Self {
        self.plan.views.push(View {
            name: name.to_string(),
            query,
        });
        self
    }

    pub fn build(self) -> Plan {
        self.plan
    }
}
