use tower_lsp::lsp_types::Range;

use crate::lexer::Token;

/// One `#define`d name (`spec.md` §3 "Macro registry").
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// `None` for an object-like macro; `Some(params)` for a function-like
    /// one, even when `params` is empty (`#define FOO() ...`).
    pub params: Option<Vec<String>>,
    pub body: Vec<Token>,
    pub def_range: Range,
    pub invoked: bool,
    pub call_sites: Vec<Range>,
}

impl MacroDef {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }
}

/// Snapshot handed to later stages so type checks can inspect macro values
/// (`spec.md` §4.2) and so the `contextMacroNames`/`evalMacros` custom
/// requests have something to read.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    pub macros: std::collections::HashMap<String, MacroDef>,
}

impl MacroRegistry {
    pub fn define(&mut self, def: MacroDef) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn record_call(&mut self, name: &str, range: Range) {
        if let Some(def) = self.macros.get_mut(name) {
            def.invoked = true;
            def.call_sites.push(range);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.macros.keys().cloned().collect();
        names.sort();
        names
    }
}
