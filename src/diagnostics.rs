//! Shared diagnostic taxonomy (`spec.md` §7) produced by every pipeline
//! stage. Each stage pushes `DtsDiagnostic` values; `Into<Diagnostic>`
//! performs the final LSP rendering so severities, tags and message
//! templates stay in one place instead of being hand-formatted at each call
//! site.

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, DiagnosticTag, Location, Range,
    Url,
};

/// Closed set of diagnostic kinds. Two historical spellings
/// ("omitted"/"ommited", "deprecated"/"depricated") existed for the same
/// concepts upstream; this crate canonicalizes on the first spelling for
/// every identifier while keeping `RequiredOmitted` and `Deprecated`
/// distinct from any behaviorally different sibling (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    // Lexical
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape,
    UnknownByte,
    // Syntactic
    MissingToken,
    MisplacedToken,
    // Context
    DuplicatePropertyName,
    DuplicateNodeName,
    DeleteOfMissingTarget,
    UnableToResolveChildNode,
    UnableToResolveNodePath,
    LabelAlreadyInUse,
    MissingMandatoryNode,
    // Semantic-type (standard)
    TypeMismatch,
    CellMissMatch,
    EnumValueMismatch,
    ConstValueMismatch,
    RequiredOmitted,
    Deprecated,
    PhandleNotUnique,
    RegMismatch,
    RangesOverlap,
    MappingAddressOverflow,
    NexusMapNoMatch,
    DuplicateMapEntry,
    // Binding
    MissingBindingForCompatible,
    BusMismatch,
    SchemaValidationFailure,
    // I/O
    MissingInclude,
    MissingBindingFile,
    ReadFailure,
}

impl DiagnosticKind {
    pub fn severity(self) -> DiagnosticSeverity {
        use DiagnosticKind::*;
        match self {
            UnterminatedString | UnterminatedComment | InvalidEscape | UnknownByte
            | MissingToken | MisplacedToken | DuplicatePropertyName | DuplicateNodeName
            | DeleteOfMissingTarget | UnableToResolveChildNode | UnableToResolveNodePath
            | LabelAlreadyInUse | MissingMandatoryNode | TypeMismatch | CellMissMatch
            | EnumValueMismatch | ConstValueMismatch | RequiredOmitted | PhandleNotUnique
            | RegMismatch | RangesOverlap | MappingAddressOverflow | NexusMapNoMatch
            | DuplicateMapEntry | MissingBindingForCompatible | BusMismatch
            | SchemaValidationFailure | MissingInclude | MissingBindingFile | ReadFailure => {
                DiagnosticSeverity::ERROR
            }
            Deprecated => DiagnosticSeverity::WARNING,
        }
    }

    pub fn tags(self) -> Vec<DiagnosticTag> {
        match self {
            DiagnosticKind::Deprecated => vec![DiagnosticTag::DEPRECATED],
            _ => Vec::new(),
        }
    }

    pub fn source(self) -> &'static str {
        use DiagnosticKind::*;
        match self {
            UnterminatedString | UnterminatedComment | InvalidEscape | UnknownByte => "dts-lexer",
            MissingToken | MisplacedToken => "dts-parser",
            DuplicatePropertyName | DuplicateNodeName | DeleteOfMissingTarget
            | UnableToResolveChildNode | UnableToResolveNodePath | LabelAlreadyInUse
            | MissingMandatoryNode => "dts-context",
            TypeMismatch | CellMissMatch | EnumValueMismatch | ConstValueMismatch
            | RequiredOmitted | Deprecated | PhandleNotUnique | RegMismatch | RangesOverlap
            | MappingAddressOverflow | NexusMapNoMatch | DuplicateMapEntry => "dts-types",
            MissingBindingForCompatible | BusMismatch | SchemaValidationFailure => "dts-bindings",
            MissingInclude | MissingBindingFile | ReadFailure => "dts-io",
        }
    }
}

/// One diagnostic finding, with ordered template arguments so rendering can
/// be localized later without re-deriving the message shape.
#[derive(Debug, Clone)]
pub struct DtsDiagnostic {
    pub kind: DiagnosticKind,
    pub range: Range,
    /// Which open document this diagnostic belongs to. `None` until a
    /// pipeline stage that knows its file tags it; the context manager
    /// falls back to the context's main file when publishing so a bare
    /// diagnostic is never silently dropped.
    pub file: Option<Url>,
    pub args: Vec<String>,
    pub related: Vec<(Url, Range, String)>,
}

impl DtsDiagnostic {
    pub fn new(kind: DiagnosticKind, range: Range) -> Self {
        Self {
            kind,
            range,
            file: None,
            args: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: Url) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_related(mut self, uri: Url, range: Range, message: impl Into<String>) -> Self {
        self.related.push((uri, range, message.into()));
        self
    }

    pub fn message(&self) -> String {
        render_message(self.kind, &self.args)
    }

    pub fn into_lsp(self) -> Diagnostic {
        let message = self.message();
        let related_information = if self.related.is_empty() {
            None
        } else {
            Some(
                self.related
                    .into_iter()
                    .map(|(uri, range, message)| DiagnosticRelatedInformation {
                        location: Location { uri, range },
                        message,
                    })
                    .collect(),
            )
        };

        Diagnostic {
            range: self.range,
            severity: Some(self.kind.severity()),
            source: Some(self.kind.source().into()),
            message,
            tags: {
                let tags = self.kind.tags();
                if tags.is_empty() { None } else { Some(tags) }
            },
            related_information,
            ..Default::default()
        }
    }
}

fn render_message(kind: DiagnosticKind, args: &[String]) -> String {
    use DiagnosticKind::*;
    match kind {
        UnterminatedString => "Unterminated string literal".to_string(),
        UnterminatedComment => "Unterminated block comment".to_string(),
        InvalidEscape => format!("Invalid escape sequence '{}'", arg(args, 0)),
        UnknownByte => format!("Unexpected byte '{}'", arg(args, 0)),
        MissingToken => format!("Expected '{}'", arg(args, 0)),
        MisplacedToken => format!("Unexpected token '{}'", arg(args, 0)),
        DuplicatePropertyName => format!("Duplicate property '{}'", arg(args, 0)),
        DuplicateNodeName => format!("Duplicate node '{}'", arg(args, 0)),
        DeleteOfMissingTarget => format!("Cannot delete '{}': it does not exist here", arg(args, 0)),
        UnableToResolveChildNode => format!("Unable to resolve node '{}'", arg(args, 0)),
        UnableToResolveNodePath => format!("Unable to resolve path '{}'", arg(args, 0)),
        LabelAlreadyInUse => format!("Label '{}' is already in use", arg(args, 0)),
        MissingMandatoryNode => format!("Missing mandatory node '{}'", arg(args, 0)),
        TypeMismatch => format!(
            "Property '{}' expected type {} but found {}",
            arg(args, 0),
            arg(args, 1),
            arg(args, 2)
        ),
        CellMissMatch => format!(
            "Expected {} cells for '{}' but found {}",
            arg(args, 1),
            arg(args, 0),
            arg(args, 2)
        ),
        EnumValueMismatch => format!(
            "'{}' is not a valid value for '{}'; expected one of {}",
            arg(args, 1),
            arg(args, 0),
            arg(args, 2)
        ),
        ConstValueMismatch => format!("'{}' must be the constant {}", arg(args, 0), arg(args, 1)),
        RequiredOmitted => format!("Property '{}' is required but omitted", arg(args, 0)),
        Deprecated => format!("Property '{}' is deprecated", arg(args, 0)),
        PhandleNotUnique => format!("Phandle value {} is not unique", arg(args, 0)),
        RegMismatch => format!("'reg' entry does not match parent's address/size cells: {}", arg(args, 0)),
        RangesOverlap => format!("Overlapping ranges in {} address space", arg(args, 0)),
        MappingAddressOverflow => format!("Mapped address for '{}' overflows its cell width", arg(args, 0)),
        NexusMapNoMatch => format!("No entry in '{}' matches this specifier", arg(args, 0)),
        DuplicateMapEntry => format!("Duplicate entry in '{}'", arg(args, 0)),
        MissingBindingForCompatible => format!("No binding found for compatible '{}'", arg(args, 0)),
        BusMismatch => format!("Node is not a valid child of bus '{}'", arg(args, 0)),
        SchemaValidationFailure => arg(args, 0).to_string(),
        MissingInclude => format!("Cannot find include file '{}'", arg(args, 0)),
        MissingBindingFile => format!("Cannot find binding file '{}'", arg(args, 0)),
        ReadFailure => format!("Failed to read '{}': {}", arg(args, 0), arg(args, 1)),
    }
}

fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Position;

    fn r() -> Range {
        Range::new(Position::new(0, 0), Position::new(0, 1))
    }

    #[test]
    fn deprecated_is_warning_with_tag() {
        let diag = DtsDiagnostic::new(DiagnosticKind::Deprecated, r())
            .with_args(["device_type"])
            .into_lsp();
        assert_eq!(diag.severity, Some(DiagnosticSeverity::WARNING));
        assert!(diag.tags.unwrap().contains(&DiagnosticTag::DEPRECATED));
        assert_eq!(diag.message, "Property 'device_type' is deprecated");
    }

    #[test]
    fn dangling_ref_renders_with_node_name() {
        let diag = DtsDiagnostic::new(DiagnosticKind::UnableToResolveChildNode, r())
            .with_args(["l1"])
            .into_lsp();
        assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diag.message, "Unable to resolve node 'l1'");
    }

    #[test]
    fn ranges_overlap_carries_child_literal_argument() {
        let diag = DtsDiagnostic::new(DiagnosticKind::RangesOverlap, r())
            .with_args(["child"])
            .into_lsp();
        assert_eq!(diag.message, "Overlapping ranges in child address space");
    }
}
