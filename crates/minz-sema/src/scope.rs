//! The Symbol & Scope Manager (spec §4.1).
//!
//! A [`Scope`] owns a mapping from identifier to [`ScopeEntry`] plus
//! an optional parent (lexical chain); [`ScopeManager`] is the arena
//! that owns every `Scope` created during a compilation and exposes
//! `enter_scope`/`leave_scope`/`define`/`lookup`/`lookup_local` as the
//! current-scope cursor moves through the tree. Function scopes carry
//! the enclosing function symbol for `return`/`self` resolution.

use rustc_hash::FxHashMap;

use minz_diagnostics::{Diagnostic, Position};
use minz_entity::{entity_impl, EntityRef, PrimaryMap};

use crate::symbol::{FunctionSymbol, OverloadSet, ScopeEntry, Symbol};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);
entity_impl!(ScopeId, "s");

pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The function symbol owning this scope, for `return`/`self`
    /// resolution; set on function-body scopes and inherited by
    /// nested block scopes via `current_function`'s chain walk.
    pub owning_function: Option<Rc<FunctionSymbol>>,
    entries: FxHashMap<String, ScopeEntry>,
}

impl Scope {
    fn new(parent: Option<ScopeId>) -> Self {
        Scope { parent, owning_function: None, entries: FxHashMap::default() }
    }
}

/// Owns every [`Scope`] created during a single compilation and
/// tracks the current lexical position as a cursor over that arena.
pub struct ScopeManager {
    scopes: PrimaryMap<ScopeId, Scope>,
    current: ScopeId,
}

impl ScopeManager {
    pub fn new() -> Self {
        let mut scopes = PrimaryMap::new();
        let root = scopes.push(Scope::new(None));
        ScopeManager { scopes, current: root }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    pub fn enter_scope(&mut self) -> ScopeId {
        let parent = self.current;
        let id = self.scopes.push(Scope::new(Some(parent)));
        self.current = id;
        id
    }

    /// Like [`enter_scope`](Self::enter_scope), but also marks the new
    /// scope as owned by `function` so `current_function` resolves
    /// inside it.
    pub fn enter_function_scope(&mut self, function: Rc<FunctionSymbol>) -> ScopeId {
        let id = self.enter_scope();
        self.scopes[id].owning_function = Some(function);
        id
    }

    pub fn leave_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    /// Define `name` as `symbol` in the current scope. Fails with
    /// `DuplicateDefinition` unless the new symbol is a function that
    /// can form or extend an `OverloadSet` with an existing binding of
    /// the same name (§4.1).
    pub fn define(&mut self, name: &str, symbol: Symbol, pos: Position) -> Result<(), Diagnostic> {
        let scope = &mut self.scopes[self.current];
        if let Some(existing) = scope.entries.get(name) {
            return match (&existing.symbol, &symbol) {
                (Symbol::Function(first), Symbol::Function(second)) => {
                    let set = Rc::new(RefCell::new(OverloadSet {
                        name: name.to_string(),
                        members: vec![first.clone(), second.clone()],
                    }));
                    scope.entries.insert(name.to_string(), ScopeEntry { symbol: Symbol::OverloadSet(set), pos: existing.pos });
                    Ok(())
                }
                (Symbol::OverloadSet(set), Symbol::Function(new_fn)) => {
                    set.borrow_mut().members.push(new_fn.clone());
                    Ok(())
                }
                _ => Err(Diagnostic::DuplicateDefinition { name: name.to_string(), pos, first_pos: existing.pos }),
            };
        }
        scope.entries.insert(name.to_string(), ScopeEntry { symbol, pos });
        Ok(())
    }

    /// Nearest enclosing binding for `name`, walking the scope chain
    /// from the current scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            if let Some(entry) = scope.entries.get(name) {
                return Some(&entry.symbol);
            }
            cursor = scope.parent;
        }
        None
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes[self.current].entries.get(name).map(|e| &e.symbol)
    }

    /// All identifiers visible from the current scope (nearest-first),
    /// used to compute "did you mean …?" suggestions (§7).
    pub fn visible_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            out.extend(scope.entries.keys().map(|s| s.as_str()));
            cursor = scope.parent;
        }
        out
    }

    /// The function symbol owning the innermost enclosing function
    /// scope, for `return`/`self` resolution.
    pub fn current_function(&self) -> Option<Rc<FunctionSymbol>> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            if let Some(f) = &scope.owning_function {
                return Some(f.clone());
            }
            cursor = scope.parent;
        }
        None
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_types::Type;

    fn func(name: &str) -> Rc<FunctionSymbol> {
        Rc::new(FunctionSymbol {
            name: name.to_string(),
            params: vec![],
            ret: Type::Void,
            mangled_name: name.to_string(),
            is_pub: false,
            is_interrupt: false,
        })
    }

    #[test]
    fn lookup_walks_the_chain() {
        let mut mgr = ScopeManager::new();
        mgr.define("x", Symbol::Variable(Rc::new(crate::symbol::VariableSymbol {
            name: "x".into(), ty: Type::U8, mutable: false,
        })), Position::synthetic()).unwrap();
        mgr.enter_scope();
        assert!(mgr.lookup("x").is_some());
        assert!(mgr.lookup_local("x").is_none());
    }

    #[test]
    fn duplicate_plain_definition_errors() {
        let mut mgr = ScopeManager::new();
        let v = Symbol::Variable(Rc::new(crate::symbol::VariableSymbol { name: "x".into(), ty: Type::U8, mutable: false }));
        mgr.define("x", v.clone(), Position::synthetic()).unwrap();
        let err = mgr.define("x", v, Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "DuplicateDefinition");
    }

    #[test]
    fn two_functions_form_an_overload_set() {
        let mut mgr = ScopeManager::new();
        mgr.define("print", Symbol::Function(func("print$u8")), Position::synthetic()).unwrap();
        mgr.define("print", Symbol::Function(func("print$u16")), Position::synthetic()).unwrap();
        match mgr.lookup("print").unwrap() {
            Symbol::OverloadSet(set) => assert_eq!(set.borrow().members.len(), 2),
            _ => panic!("expected overload set"),
        }
    }
}
