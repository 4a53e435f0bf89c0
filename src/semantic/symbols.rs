//! Symbol table

use std::collections::HashMap;

use crate::parser::ast::Span;

/// What a name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// Module-level variable bound with `=`
    Variable,
    /// User function; imported library exports are stored under
    /// `alias.name` keys with `source_library` set.
    Function { params: Vec<String> },
}

/// Symbol information
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub declared_at: Span,
    /// Ever reassigned with `:=`; drives `let` vs `const` emission.
    pub reassigned: bool,
    /// Reassignment reads the variable's own history.
    pub recursive: bool,
    /// Largest literal history offset observed on reads of this symbol.
    pub max_history_depth: usize,
    /// Marked on library exports for `export fn(...)` declarations.
    pub exported: bool,
    /// Specifier of the library this symbol was imported from.
    pub source_library: Option<String>,
    /// Emitted JavaScript name when it differs from `name` (imported
    /// symbols carry their library-mangled name here).
    pub target: Option<String>,
}

impl Symbol {
    pub fn variable(name: &str, declared_at: Span) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            declared_at,
            reassigned: false,
            recursive: false,
            max_history_depth: 0,
            exported: false,
            source_library: None,
            target: None,
        }
    }

    pub fn function(name: &str, params: Vec<String>, declared_at: Span, exported: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Function { params },
            declared_at,
            reassigned: false,
            recursive: false,
            max_history_depth: 0,
            exported,
            source_library: None,
            target: None,
        }
    }
}

/// Module-scope symbol table. Iteration follows declaration order so
/// anything derived from it (export lists, metadata) is deterministic.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a symbol; returns false when the name is already taken.
    pub fn define(&mut self, symbol: Symbol) -> bool {
        if self.symbols.contains_key(&symbol.name) {
            return false;
        }
        self.order.push(symbol.name.clone());
        self.symbols.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.order.iter().filter_map(|name| self.symbols.get(name))
    }
}
