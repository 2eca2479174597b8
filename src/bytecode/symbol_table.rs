use std::collections::HashMap;

use crate::lang::builtins::BUILTINS;

/// Where a resolved name lives at runtime. Decides which load/store opcode
/// the compiler emits for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
}

/// A named binding with its scope and its dense index within that scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Lexically nested name table.
///
/// One table exists per function body being compiled, linked to the table of
/// the enclosing scope through `outer`. Resolving a name that turns out to
/// be a local (or free variable) of an enclosing function rewrites it as a
/// free symbol of this table, which is what makes closures work.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,

    store: HashMap<String, Symbol>,
    num_definitions: usize,

    /// Originals of the symbols this scope captures, in capture order. The
    /// compiler emits one load per entry before `OpClosure`.
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// A fresh top-level table with every built-in pre-registered in
    /// registration order.
    pub fn with_builtins() -> Self {
        let mut table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }
        table
    }

    /// Wraps `outer` in a new enclosed scope.
    pub fn enclose(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Unwraps the enclosing table. Panics if called on a top-level table;
    /// the compiler only calls this when leaving a scope it entered.
    pub fn into_outer(self) -> SymbolTable {
        *self.outer.expect("cannot leave the top-level scope")
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Defines `name` in this table. Scope is `Global` in the outermost
    /// table and `Local` otherwise; the index is the next dense slot.
    /// Redefinition within one scope overwrites (the last define wins).
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Registers a built-in under a caller-assigned index. Does not count
    /// toward `num_definitions`.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Records `original` as captured by this scope and returns the free
    /// symbol that refers to it.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolves `name`, walking outward through enclosing scopes.
    ///
    /// A name found in an outer scope resolves as-is when it is global or a
    /// built-in. When it is a local (or already-free) binding of an outer
    /// function, it is converted into a free symbol of this table, so the
    /// compiler knows to capture it.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define_assigns_dense_indices() {
        let mut global = SymbolTable::new();

        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));
        assert_eq!(global.num_definitions(), 2);
    }

    #[test]
    fn test_resolve_global() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        assert_eq!(
            global.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            global.resolve("b"),
            Some(symbol("b", SymbolScope::Global, 1))
        );
        assert_eq!(global.resolve("c"), None);
    }

    #[test]
    fn test_define_in_enclosed_scope_is_local() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::enclose(global);
        assert_eq!(local.define("b"), symbol("b", SymbolScope::Local, 0));
        assert_eq!(local.define("c"), symbol("c", SymbolScope::Local, 1));
    }

    #[test]
    fn test_local_indices_reset_per_scope() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclose(global);
        first.define("b");

        let mut second = SymbolTable::enclose(first);
        assert_eq!(second.define("c"), symbol("c", SymbolScope::Local, 0));
    }

    #[test]
    fn test_resolve_walks_outward_for_globals() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::enclose(global);
        local.define("b");

        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(local.resolve("b"), Some(symbol("b", SymbolScope::Local, 0)));
    }

    #[test]
    fn test_resolve_outer_local_becomes_free() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut outer = SymbolTable::enclose(global);
        outer.define("b");

        let mut inner = SymbolTable::enclose(outer);
        inner.define("c");

        assert_eq!(inner.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(inner.resolve("c"), Some(symbol("c", SymbolScope::Local, 0)));

        // `b` is a local of the enclosing function: captured as free.
        assert_eq!(inner.resolve("b"), Some(symbol("b", SymbolScope::Free, 0)));
        assert_eq!(
            inner.free_symbols(),
            &[symbol("b", SymbolScope::Local, 0)]
        );
    }

    #[test]
    fn test_resolve_through_two_function_boundaries() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut outer = SymbolTable::enclose(global);
        outer.define("b");

        let mut inner = SymbolTable::enclose(outer);

        // `b` crosses two boundaries: the middle table captures the local,
        // the inner table captures the middle table's free symbol.
        assert_eq!(inner.resolve("b"), Some(symbol("b", SymbolScope::Free, 0)));
        assert_eq!(inner.free_symbols().len(), 1);
        assert_eq!(inner.free_symbols()[0].scope, SymbolScope::Free);

        let outer = inner.into_outer();
        assert_eq!(outer.free_symbols(), &[symbol("b", SymbolScope::Local, 0)]);
    }

    #[test]
    fn test_resolve_free_is_memoized_in_store() {
        let mut outer = SymbolTable::enclose(SymbolTable::new());
        outer.define("x");

        let mut inner = SymbolTable::enclose(outer);
        let first = inner.resolve("x");
        let second = inner.resolve("x");

        assert_eq!(first, second);
        assert_eq!(inner.free_symbols().len(), 1, "captured exactly once");
    }

    #[test]
    fn test_define_builtin_resolves_everywhere() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");

        let mut nested = SymbolTable::enclose(global);
        assert_eq!(
            nested.resolve("len"),
            Some(symbol("len", SymbolScope::Builtin, 0))
        );
        assert_eq!(nested.free_symbols().len(), 0, "builtins are not captured");
    }

    #[test]
    fn test_builtins_do_not_count_as_definitions() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define("a");

        assert_eq!(global.num_definitions(), 1);
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
    }

    #[test]
    fn test_with_builtins_registers_in_order() {
        let mut table = SymbolTable::with_builtins();

        assert_eq!(
            table.resolve("len"),
            Some(symbol("len", SymbolScope::Builtin, 0))
        );
        assert_eq!(
            table.resolve("push"),
            Some(symbol("push", SymbolScope::Builtin, 5))
        );
        assert_eq!(table.num_definitions(), 0);
    }

    #[test]
    fn test_shadowing_last_define_wins() {
        let mut global = SymbolTable::new();
        global.define("a");
        let shadowed = global.define("a");

        assert_eq!(shadowed.index, 1);
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 1)));
    }
}
