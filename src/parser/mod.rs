pub mod ast;
pub mod parse;

pub use ast::{Ast, AstKind, AstNode, DeleteTarget, Label, NodeId, RefTarget};
pub use parse::{ParseOutput, Parser};
