pub mod eval;
pub mod tree;

pub use eval::{ast_range, evaluate, EvalOutput, FileAst};
pub use tree::{Frag, NodeRef, NexusMapEntry, PropertyObject, QuickValue, RuntimeNode, RuntimeTree};
