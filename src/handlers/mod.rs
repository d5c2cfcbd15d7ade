//! Thin `tower_lsp::LanguageServer` glue (`spec.md` §4.7, §6): each module
//! here is an `impl Backend` block whose methods parse LSP/custom params,
//! find the right context, and delegate to `crate::query` for the actual
//! read-only computation.

pub mod completion;
pub mod custom;
pub mod definition;
pub mod formatting;
pub mod hover;
pub mod references;
pub mod semantic_tokens;
pub mod symbols;
pub mod sync;
