//! Tree-sitter helpers: language detection, syntax checks, tree walking

use std::path::Path;
use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{EngineError, Result};

/// Languages the transformer can re-parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    TypeScript,
    Tsx,
    /// Parsed with the TypeScript grammar
    JavaScript,
    Python,
    Rust,
    Go,
}

impl SourceLanguage {
    /// Detect by extension; `None` means "skip syntax checks"
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" | "jsx" => Some(Self::Tsx),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" | "pyi" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
        }
    }

    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Self::TypeScript | Self::JavaScript => tree_sitter_typescript::language_typescript(),
            Self::Tsx => tree_sitter_typescript::language_tsx(),
            Self::Python => tree_sitter_python::language(),
            Self::Rust => tree_sitter_rust::language(),
            Self::Go => tree_sitter_go::language(),
        }
    }

    /// TypeScript-family files share the same edit conventions
    pub fn is_typescript_family(&self) -> bool {
        matches!(self, Self::TypeScript | Self::Tsx | Self::JavaScript)
    }
}

/// Parse `source` with the grammar for `language`
pub fn parse(source: &str, language: SourceLanguage) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.tree_sitter_language())
        .map_err(|e| EngineError::parse(format!("{} grammar: {}", language.as_str(), e)))?;
    parser
        .parse(source, None)
        .ok_or_else(|| EngineError::parse(format!("{} parser returned no tree", language.as_str())))
}

/// Reject content that no longer parses
///
/// Unknown extensions always pass.
pub fn check_syntax(path: &Path, source: &str) -> Result<()> {
    let Some(language) = SourceLanguage::from_path(path) else {
        return Ok(());
    };

    let tree = parse(source, language)?;
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }

    let mut detail = String::from("parse error");
    walk(root, |node, _depth| {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            detail = format!(
                "{} at {}:{}",
                if node.is_missing() { "missing node" } else { "ERROR" },
                pos.row + 1,
                pos.column + 1
            );
            return WalkAction::Stop;
        }
        if node.has_error() {
            WalkAction::Continue
        } else {
            WalkAction::SkipChildren
        }
    });

    Err(EngineError::SyntaxRejected {
        file: path.to_path_buf(),
        detail,
    })
}

/// What the visitor wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    Continue,
    SkipChildren,
    Stop,
}

/// Pre-order walk with an explicit stack
///
/// Children are visited in source order. The visitor receives each node and
/// its depth (root = 0).
pub fn walk<'t, F>(root: Node<'t>, mut visitor: F)
where
    F: FnMut(Node<'t>, usize) -> WalkAction,
{
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        match visitor(node, depth) {
            WalkAction::Stop => return,
            WalkAction::SkipChildren => continue,
            WalkAction::Continue => {}
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push((child, depth + 1));
            }
        }
    }
}

/// Text covered by `node`
#[inline]
pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}
