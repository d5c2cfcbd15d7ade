use tower_lsp::lsp_types::Range;

/// Index into `Ast::nodes`. Parent links are plain indices rather than
/// owning pointers, so the tree can't form ownership cycles even though the
/// reference graph it describes (labels, phandles) genuinely is cyclic.
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    ByLabel(String),
    ByPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    ByName(String),
    ByLabel(String),
    ByPath(String),
}

/// Tagged-variant AST payload (`spec.md` §3, §9 "Dynamic-dispatch
/// polymorphism on AST"). Dispatch on `kind` with a `match`, never a trait
/// object.
#[derive(Debug, Clone)]
pub enum AstKind {
    RootNodeDecl {
        body: Vec<NodeId>,
    },
    ChildNode {
        name: String,
        address: Option<String>,
        address2: Option<String>,
        body: Vec<NodeId>,
    },
    RefNode {
        target: RefTarget,
        body: Vec<NodeId>,
    },
    Property {
        name: String,
        values: Option<NodeId>,
    },
    DeleteNode {
        target: DeleteTarget,
    },
    DeleteProperty {
        name: String,
    },
    IncludeDirective {
        path: String,
    },
    ValueList {
        items: Vec<NodeId>,
    },
    ArrayValue {
        cells: Vec<NodeId>,
    },
    StringValue {
        value: String,
    },
    BytestringValue {
        bytes: Vec<u8>,
    },
    LabelRef {
        name: String,
    },
    NodePathRef {
        path: String,
    },
    /// An integer/arithmetic expression inside a cell value; `value` is the
    /// constant-folded result when it could be evaluated.
    Expression {
        text: String,
        value: Option<i64>,
    },
    CMacroCall {
        name: String,
        args: Vec<String>,
    },
    CommentBlock {
        text: String,
    },
    CommentLine {
        text: String,
    },
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub range: Range,
    pub labels: Vec<Label>,
    pub kind: AstKind,
}

/// One file's concrete-syntax tree. `statements` is the top-level, in-order
/// sequence the runtime evaluator flattens (`spec.md` §4.5 step 1).
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub nodes: Vec<AstNode>,
    pub statements: Vec<NodeId>,
}

impl Ast {
    pub fn alloc(&mut self, parent: Option<NodeId>, range: Range, labels: Vec<Label>, kind: AstKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(AstNode {
            id,
            parent,
            range,
            labels,
            kind,
        });
        id
    }

    pub fn get(&self, id: NodeId) -> &AstNode {
        &self.nodes[id]
    }

    /// Walks upward via parent indices; never follows an owning pointer, so
    /// this always terminates even though the overall reference graph has
    /// cycles elsewhere.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &AstNode> {
        let mut current = self.nodes[id].parent;
        std::iter::from_fn(move || {
            let idx = current?;
            let node = &self.nodes[idx];
            current = node.parent;
            Some(node)
        })
    }
}
