//! JavaScript grammar and node classification.

use std::path::Path;

use crate::chunker::FragmentKind;

/// File extensions handled by the JavaScript grammar.
const JS_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx"];

/// How a syntax node takes part in grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeClass {
    /// Declarations and module statements; always open a new group.
    Major(FragmentKind),
    /// Statements that join a nearby group.
    Minor(FragmentKind),
}

impl NodeClass {
    pub(crate) fn kind(self) -> FragmentKind {
        match self {
            Self::Major(k) | Self::Minor(k) => k,
        }
    }

    pub(crate) fn is_major(self) -> bool {
        matches!(self, Self::Major(_))
    }
}

#[must_use]
pub(crate) fn grammar() -> tree_sitter::Language {
    tree_sitter_javascript::LANGUAGE.into()
}

/// Classify a named node kind. `None` means the node is not a grouping
/// candidate (its children are still visited).
pub(crate) fn classify(node_kind: &str) -> Option<NodeClass> {
    let class = match node_kind {
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "function"
        | "generator_function"
        | "arrow_function"
        | "method_definition" => NodeClass::Major(FragmentKind::Function),
        "class_declaration" | "class" => NodeClass::Major(FragmentKind::Class),
        "import_statement" => NodeClass::Major(FragmentKind::Import),
        "export_statement" => NodeClass::Major(FragmentKind::Export),
        "variable_declaration" | "lexical_declaration" => NodeClass::Minor(FragmentKind::Variable),
        "expression_statement"
        | "if_statement"
        | "for_statement"
        | "for_in_statement"
        | "while_statement"
        | "do_statement"
        | "switch_statement"
        | "try_statement" => NodeClass::Minor(FragmentKind::Expression),
        _ => return None,
    };
    Some(class)
}

/// Whether `path` has an extension the grammar handles.
#[must_use]
pub(crate) fn is_indexable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| JS_EXTENSIONS.contains(&ext))
}
