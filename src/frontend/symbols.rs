//! Symbol table
//!
//! Scopes live in an arena and point at their parent by index. Exiting a
//! scope only moves the cursor back to the parent, so symbols declared in a
//! closed scope stay valid for annotations that refer to them.
//!
//! Variables and functions have separate namespaces. A class name clashes
//! with either.

use std::collections::HashMap;

use crate::types::{ClassId, Type};
use crate::utils::{EntityKind, Location, LookupError};

/// Unique identifier for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Unique identifier for a declared symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub usize);

/// Where a variable lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Global,
    Local,
    Parameter(usize),
    Field { class: ClassId, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method(ClassId),
    Constructor(ClassId),
    Builtin,
}

/// A declared entity
#[derive(Debug, Clone)]
pub enum Symbol {
    Variable {
        name: String,
        ty: Type,
        site: Location,
        storage: Storage,
        /// Written to after its declaration
        mutated: bool,
    },
    Function {
        name: String,
        signature: Type,
        site: Location,
        kind: FunctionKind,
    },
    Class {
        name: String,
        ty: Type,
        site: Location,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable { name, .. } | Symbol::Function { name, .. } | Symbol::Class { name, .. } => name,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Symbol::Variable { .. } => EntityKind::Variable,
            Symbol::Function { .. } => EntityKind::Function,
            Symbol::Class { .. } => EntityKind::Class,
        }
    }

    /// Variable type, function signature or class type
    pub fn ty(&self) -> &Type {
        match self {
            Symbol::Variable { ty, .. } => ty,
            Symbol::Function { signature, .. } => signature,
            Symbol::Class { ty, .. } => ty,
        }
    }

    pub fn site(&self) -> Location {
        match self {
            Symbol::Variable { site, .. } | Symbol::Function { site, .. } | Symbol::Class { site, .. } => *site,
        }
    }
}

/// A scope containing symbols
#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    variables: HashMap<String, SymbolId>,
    functions: HashMap<String, SymbolId>,
    classes: HashMap<String, SymbolId>,
}

impl Scope {
    fn names(&self, kind: EntityKind) -> &HashMap<String, SymbolId> {
        match kind {
            EntityKind::Variable => &self.variables,
            EntityKind::Function => &self.functions,
            EntityKind::Class => &self.classes,
        }
    }

    fn names_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, SymbolId> {
        match kind {
            EntityKind::Variable => &mut self.variables,
            EntityKind::Function => &mut self.functions,
            EntityKind::Class => &mut self.classes,
        }
    }
}

/// Namespaces a new symbol of `kind` must not collide with
fn conflicts(kind: EntityKind) -> &'static [EntityKind] {
    match kind {
        EntityKind::Variable => &[EntityKind::Variable, EntityKind::Class],
        EntityKind::Function => &[EntityKind::Function, EntityKind::Class],
        EntityKind::Class => &[EntityKind::Class, EntityKind::Variable, EntityKind::Function],
    }
}

/// Symbol table with nested scopes
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    current: ScopeId,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            symbols: Vec::new(),
            current: ScopeId(0),
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn is_global(&self) -> bool {
        self.current == self.global_scope()
    }

    /// Enter a new scope
    pub fn enter_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(self.current),
            ..Scope::default()
        });
        self.current = id;
        id
    }

    /// Enter a scope created earlier, whose parent must be the current scope
    pub fn reenter_scope(&mut self, id: ScopeId) {
        debug_assert_eq!(self.scopes[id.0].parent, Some(self.current));
        self.current = id;
    }

    /// Exit the current scope
    pub fn exit_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current.0].parent {
            self.current = parent;
        }
    }

    /// Declare a symbol in the current scope
    pub fn declare(&mut self, symbol: Symbol) -> Result<SymbolId, LookupError> {
        let scope = &self.scopes[self.current.0];
        let kind = symbol.kind();
        let existing = conflicts(kind)
            .iter()
            .find_map(|&other| scope.names(other).get(symbol.name()));
        if let Some(existing) = existing {
            return Err(LookupError::Duplicated {
                name: symbol.name().to_string(),
                kind: self.symbols[existing.0].kind(),
            });
        }
        let id = SymbolId(self.symbols.len());
        let name = symbol.name().to_string();
        self.symbols.push(symbol);
        self.scopes[self.current.0].names_mut(kind).insert(name, id);
        Ok(id)
    }

    /// Register a symbol that is reachable only through its id
    pub fn declare_detached(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(symbol);
        id
    }

    /// Look up the innermost symbol of `kind` named `name`
    ///
    /// A same-named symbol of another kind does not stop the search, so a
    /// local variable never hides a function of the same name.
    pub fn resolve(&self, name: &str, kind: EntityKind) -> Result<SymbolId, LookupError> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            if let Some(found) = self.lookup_in(id, name, kind) {
                return Ok(found);
            }
            scope_id = self.scopes[id.0].parent;
        }
        Err(LookupError::NotFound { name: name.to_string(), kind })
    }

    /// Look up a symbol only in `scope`
    pub fn lookup_in(&self, scope: ScopeId, name: &str, kind: EntityKind) -> Option<SymbolId> {
        self.scopes[scope.0].names(kind).get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Flag a variable as written after its declaration
    pub fn mark_mutated(&mut self, id: SymbolId) {
        if let Symbol::Variable { mutated, .. } = &mut self.symbols[id.0] {
            *mutated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str, ty: Type) -> Symbol {
        Symbol::Variable {
            name: name.to_string(),
            ty,
            site: Location::new(1, 1),
            storage: Storage::Local,
            mutated: false,
        }
    }

    fn func(name: &str) -> Symbol {
        Symbol::Function {
            name: name.to_string(),
            signature: Type::function(Type::Void, Vec::new()),
            site: Location::new(1, 1),
            kind: FunctionKind::Free,
        }
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Type::Int)).unwrap();
        assert_eq!(
            table.declare(var("x", Type::Bool)),
            Err(LookupError::Duplicated { name: "x".to_string(), kind: EntityKind::Variable })
        );
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let mut table = SymbolTable::new();
        let outer = table.declare(var("x", Type::Int)).unwrap();

        table.enter_scope();
        let inner = table.declare(var("x", Type::String)).unwrap();
        assert_eq!(table.resolve("x", EntityKind::Variable), Ok(inner));
        assert_eq!(table.get(inner).ty(), &Type::String);
        table.exit_scope();

        assert_eq!(table.resolve("x", EntityKind::Variable), Ok(outer));
    }

    #[test]
    fn test_not_found() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        assert_eq!(
            table.resolve("y", EntityKind::Variable),
            Err(LookupError::NotFound { name: "y".to_string(), kind: EntityKind::Variable })
        );
    }

    #[test]
    fn test_exited_scope_is_unreachable_but_symbols_survive() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        let id = table.declare(var("tmp", Type::Int)).unwrap();
        table.exit_scope();

        assert!(table.resolve("tmp", EntityKind::Variable).is_err());
        assert_eq!(table.get(id).name(), "tmp");
    }

    #[test]
    fn test_resolve_by_kind_skips_other_kinds() {
        let mut table = SymbolTable::new();
        let f = table.declare(func("f")).unwrap();

        table.enter_scope();
        let local = table.declare(var("f", Type::Int)).unwrap();
        assert_eq!(table.resolve("f", EntityKind::Function), Ok(f));
        assert_eq!(table.resolve("f", EntityKind::Variable), Ok(local));
    }

    #[test]
    fn test_reenter_scope() {
        let mut table = SymbolTable::new();
        let class_scope = table.enter_scope();
        let field = table.declare(var("value", Type::Int)).unwrap();
        table.exit_scope();
        assert!(table.is_global());

        table.reenter_scope(class_scope);
        table.enter_scope();
        assert_eq!(table.resolve("value", EntityKind::Variable), Ok(field));
        table.exit_scope();
        table.exit_scope();
        assert!(table.is_global());
    }

    #[test]
    fn test_detached_symbol_is_not_resolvable() {
        let mut table = SymbolTable::new();
        let id = table.declare_detached(func("A"));
        assert_eq!(table.get(id).name(), "A");
        assert!(table.resolve("A", EntityKind::Function).is_err());
        assert!(table.declare(func("A")).is_ok());
    }

    #[test]
    fn test_variable_and_function_namespaces_are_separate() {
        let mut table = SymbolTable::new();
        let f = table.declare(func("f")).unwrap();
        let v = table.declare(var("f", Type::Int)).unwrap();
        assert_eq!(table.resolve("f", EntityKind::Function), Ok(f));
        assert_eq!(table.resolve("f", EntityKind::Variable), Ok(v));
    }

    #[test]
    fn test_class_name_clashes_with_any_kind() {
        let mut table = SymbolTable::new();
        table
            .declare(Symbol::Class { name: "A".to_string(), ty: Type::Unknown, site: Location::new(1, 1) })
            .unwrap();
        assert_eq!(
            table.declare(var("A", Type::Int)),
            Err(LookupError::Duplicated { name: "A".to_string(), kind: EntityKind::Class })
        );
        assert_eq!(
            table.declare(func("A")),
            Err(LookupError::Duplicated { name: "A".to_string(), kind: EntityKind::Class })
        );

        let mut table = SymbolTable::new();
        table.declare(func("B")).unwrap();
        assert_eq!(
            table.declare(Symbol::Class { name: "B".to_string(), ty: Type::Unknown, site: Location::new(2, 1) }),
            Err(LookupError::Duplicated { name: "B".to_string(), kind: EntityKind::Function })
        );
    }

    #[test]
    fn test_mark_mutated() {
        let mut table = SymbolTable::new();
        let id = table.declare(var("n", Type::Int)).unwrap();
        table.mark_mutated(id);
        assert!(matches!(table.get(id), Symbol::Variable { mutated: true, .. }));
    }
}
