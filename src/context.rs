//! Compilation Context
//!
//! Everything a single compilation may mutate lives here. Each call to
//! `Compiler::compile` creates a fresh context, so independent compilations
//! can run on different threads without sharing counters.

use std::collections::HashMap;

/// Prefix-keyed counter producing names like `stream0`, `stream1`, `tmp0`
#[derive(Debug, Clone, Default)]
pub struct NameGen {
    counters: HashMap<String, usize>,
}

impl NameGen {
    pub fn new() -> Self {
        NameGen::default()
    }

    /// Next fresh name for `prefix`
    pub fn fresh(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{prefix}{counter}");
        *counter += 1;
        name
    }

    /// Number of names handed out for `prefix` so far
    pub fn issued(&self, prefix: &str) -> usize {
        self.counters.get(prefix).copied().unwrap_or(0)
    }
}

/// Per-compilation mutable state
#[derive(Debug, Clone, Default)]
pub struct CompilationContext {
    names: NameGen,
}

impl CompilationContext {
    pub fn new() -> Self {
        CompilationContext::default()
    }

    /// Fresh output name for an operator
    pub fn stream_name(&mut self) -> String {
        self.names.fresh("stream")
    }

    /// Fresh name for a synthesized variable
    pub fn temp_name(&mut self, prefix: &str) -> String {
        self.names.fresh(prefix)
    }

    pub fn names(&self) -> &NameGen {
        &self.names
    }
}
