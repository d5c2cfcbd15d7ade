//! Query/feature layer (`spec.md` §4.7): pure functions over a rebuilt
//! `Context`'s state. Each module here is unit-testable without a running
//! LSP session; `src/handlers` is the thin glue that calls into these from
//! `tower_lsp::LanguageServer` methods.

pub mod completion;
pub mod cursor;
pub mod definition;
pub mod dump;
pub mod formatting;
pub mod hover;
pub mod references;
pub mod semantic_tokens;
pub mod symbols;
