//! Lexical scope stack for substituting variables.
//!
//! Each scope maps names either to a replacement expression or to a
//! tombstone. A tombstone marks a name re-bound in that scope (by `let`, a
//! nested closure parameter, or a match pattern): lookups stop there and
//! never reach an outer substitution for the same name.

use super::Expr;
use crate::error::{CompileError, CompileResult};
use std::collections::{HashMap, HashSet};

/// Result of resolving a variable against the stack
#[derive(Debug, Clone, PartialEq)]
pub enum Binding<'a> {
    /// A live substitution
    Replace(&'a Expr),
    /// Re-bound under a fresh name to avoid capture
    Renamed(&'a str),
    /// Re-bound in an inner scope; leave the variable alone
    Shadowed,
    /// Not bound by any scope
    Free,
}

#[derive(Debug, Default)]
struct Scope {
    replacements: HashMap<String, Expr>,
    renames: HashMap<String, String>,
    tombstones: HashSet<String>,
    /// Free variables of the replacement expressions
    free: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop(&mut self) -> CompileResult<()> {
        self.scopes
            .pop()
            .map(|_| ())
            .ok_or_else(|| CompileError::invariant("pop of empty scope stack"))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn innermost(&mut self) -> CompileResult<&mut Scope> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CompileError::invariant("Empty context"))
    }

    /// Bind `name` to `replacement` in the innermost scope
    pub fn substitute(&mut self, name: &str, replacement: Expr) -> CompileResult<()> {
        let free = replacement.free_variables();
        let scope = self.innermost()?;
        scope.tombstones.remove(name);
        scope.renames.remove(name);
        scope.free.extend(free);
        scope.replacements.insert(name.to_string(), replacement);
        Ok(())
    }

    /// Mark `name` as re-bound in the innermost scope
    pub fn tombstone(&mut self, name: &str) -> CompileResult<()> {
        let scope = self.innermost()?;
        scope.replacements.remove(name);
        scope.renames.remove(name);
        scope.tombstones.insert(name.to_string());
        Ok(())
    }

    /// Re-bind `name` in the innermost scope under the name `fresh`
    pub fn rename(&mut self, name: &str, fresh: &str) -> CompileResult<()> {
        let scope = self.innermost()?;
        scope.replacements.remove(name);
        scope.tombstones.remove(name);
        scope.renames.insert(name.to_string(), fresh.to_string());
        Ok(())
    }

    /// Resolve `name` from the innermost scope outwards
    pub fn lookup(&self, name: &str) -> Binding<'_> {
        for scope in self.scopes.iter().rev() {
            if scope.tombstones.contains(name) {
                return Binding::Shadowed;
            }
            if let Some(replacement) = scope.replacements.get(name) {
                return Binding::Replace(replacement);
            }
            if let Some(fresh) = scope.renames.get(name) {
                return Binding::Renamed(fresh);
            }
        }
        Binding::Free
    }

    /// Would binding `name` here capture a free variable of a live
    /// replacement, or a name an outer binder was renamed to?
    pub fn would_capture(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|s| s.free.contains(name) || s.renames.values().any(|fresh| fresh == name))
    }

    pub fn must_be_empty(&self) -> CompileResult<()> {
        if self.scopes.is_empty() {
            Ok(())
        } else {
            Err(CompileError::invariant(format!(
                "{} scopes left open",
                self.scopes.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn test_substitute_on_empty_stack_fails() {
        let mut stack = ScopeStack::new();
        let err = stack.substitute("x", Expr::i32(1)).unwrap_err();
        assert_eq!(err, CompileError::invariant("Empty context"));
        assert!(stack.pop().is_err());
    }

    #[test]
    fn test_tombstone_blocks_outer_substitution() {
        let mut stack = ScopeStack::new();
        stack.push();
        stack.substitute("x", Expr::i32(1)).unwrap();
        stack.push();
        stack.tombstone("x").unwrap();
        assert_eq!(stack.lookup("x"), Binding::Shadowed);
        stack.pop().unwrap();
        assert_eq!(stack.lookup("x"), Binding::Replace(&Expr::i32(1)));
        assert_eq!(stack.lookup("y"), Binding::Free);
        stack.pop().unwrap();
        stack.must_be_empty().unwrap();
    }

    #[test]
    fn test_would_capture_tracks_replacement_free_vars() {
        let mut stack = ScopeStack::new();
        stack.push();
        stack.substitute("x", Expr::var("y", Type::int32())).unwrap();
        assert!(stack.would_capture("y"));
        assert!(!stack.would_capture("x"));
        assert!(stack.must_be_empty().is_err());
    }

    #[test]
    fn test_rename_shadows_outer_binding() {
        let mut stack = ScopeStack::new();
        stack.push();
        stack.substitute("x", Expr::i32(1)).unwrap();
        stack.push();
        stack.rename("x", "x_0").unwrap();
        assert_eq!(stack.lookup("x"), Binding::Renamed("x_0"));
        assert!(stack.would_capture("x_0"));
        stack.pop().unwrap();
        stack.pop().unwrap();
    }
}
