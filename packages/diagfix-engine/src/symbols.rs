//! Project symbol index
//!
//! Top-level declarations per file, extracted with tree-sitter. Strategies use
//! it to find which file exports a name and where a type is declared; the
//! dependency graph uses it for cross-file edges.

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use tree_sitter::Node;
use walkdir::WalkDir;

use crate::syntax::{self, node_text, SourceLanguage, WalkAction};

/// Directories never scanned
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target", "dist", "build", "__pycache__", ".venv"];

/// One top-level declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    /// Relative to the project root
    pub file: PathBuf,
    /// 1-based
    pub line: u32,
    /// Interface, type alias, class, enum, struct, trait
    pub is_type: bool,
    pub exported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Type,
    Value,
    /// Holds declarations (export statements, decorated definitions, ...)
    Container,
}

fn declaration_kind(language: SourceLanguage, kind: &str) -> Option<DeclKind> {
    use DeclKind::*;
    match language {
        SourceLanguage::TypeScript | SourceLanguage::Tsx | SourceLanguage::JavaScript => match kind {
            "interface_declaration"
            | "type_alias_declaration"
            | "class_declaration"
            | "abstract_class_declaration"
            | "enum_declaration" => Some(Type),
            "function_declaration" | "generator_function_declaration" | "variable_declarator" => {
                Some(Value)
            }
            "export_statement" | "lexical_declaration" | "variable_declaration" => Some(Container),
            _ => None,
        },
        SourceLanguage::Python => match kind {
            "class_definition" => Some(Type),
            "function_definition" => Some(Value),
            "decorated_definition" => Some(Container),
            _ => None,
        },
        SourceLanguage::Rust => match kind {
            "struct_item" | "enum_item" | "trait_item" | "type_item" | "union_item" => Some(Type),
            "function_item" | "const_item" | "static_item" => Some(Value),
            _ => None,
        },
        SourceLanguage::Go => match kind {
            "type_spec" | "type_alias" => Some(Type),
            "function_declaration" => Some(Value),
            "type_declaration" => Some(Container),
            _ => None,
        },
    }
}

fn is_exported(language: SourceLanguage, node: &Node, name: &str) -> bool {
    match language {
        SourceLanguage::TypeScript | SourceLanguage::Tsx | SourceLanguage::JavaScript => {
            let mut current = node.parent();
            while let Some(parent) = current {
                match parent.kind() {
                    "export_statement" => return true,
                    "lexical_declaration" | "variable_declaration" => current = parent.parent(),
                    _ => return false,
                }
            }
            false
        }
        SourceLanguage::Python => !name.starts_with('_'),
        SourceLanguage::Rust => {
            (0..node.child_count()).any(|i| {
                node.child(i)
                    .map(|c| c.kind() == "visibility_modifier")
                    .unwrap_or(false)
            })
        }
        SourceLanguage::Go => name.chars().next().map(char::is_uppercase).unwrap_or(false),
    }
}

/// Extract top-level declarations from one file's content
pub fn extract_symbols(relative: &Path, source: &str) -> Vec<SymbolEntry> {
    let Some(language) = SourceLanguage::from_path(relative) else {
        return Vec::new();
    };
    let tree = match syntax::parse(source, language) {
        Ok(tree) => tree,
        Err(e) => {
            warn!(file = %relative.display(), error = %e, "symbol extraction skipped");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    syntax::walk(tree.root_node(), |node, depth| {
        if depth == 0 {
            return WalkAction::Continue;
        }
        match declaration_kind(language, node.kind()) {
            Some(DeclKind::Container) => WalkAction::Continue,
            Some(kind) => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(&name_node, source);
                    if !name.is_empty() {
                        entries.push(SymbolEntry {
                            name: name.to_string(),
                            file: relative.to_path_buf(),
                            line: node.start_position().row as u32 + 1,
                            is_type: kind == DeclKind::Type,
                            exported: is_exported(language, &node, name),
                        });
                    }
                }
                WalkAction::SkipChildren
            }
            None => WalkAction::SkipChildren,
        }
    });
    entries
}

/// Path of `file` relative to `root` (unchanged when outside or already relative)
pub fn relative_to_root(root: &Path, file: &Path) -> PathBuf {
    match file.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => file
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect(),
    }
}

/// Source files under `root`, filtered by include/exclude directories
///
/// Empty `include_dirs` means the whole root. Paths are absolute when `root` is.
pub fn discover_sources(root: &Path, include_dirs: &[PathBuf], exclude_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let starts: Vec<PathBuf> = if include_dirs.is_empty() {
        vec![root.to_path_buf()]
    } else {
        include_dirs.iter().map(|d| root.join(d)).collect()
    };
    let excluded: Vec<PathBuf> = exclude_dirs.iter().map(|d| root.join(d)).collect();

    let mut files: Vec<PathBuf> = starts
        .iter()
        .flat_map(|start| {
            WalkDir::new(start)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| {
                    let name = e.file_name().to_string_lossy();
                    !(e.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
                        && !excluded.iter().any(|x| e.path().starts_with(x))
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| SourceLanguage::from_path(e.path()).is_some())
                .map(|e| e.into_path())
        })
        .collect();
    files.sort();
    files.dedup();
    files
}

/// Declarations indexed by file and by name
#[derive(Debug, Default, Clone)]
pub struct SymbolIndex {
    by_file: HashMap<PathBuf, Vec<SymbolEntry>>,
    by_name: HashMap<String, Vec<SymbolEntry>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `files` in parallel; unreadable files are skipped
    pub fn build(root: &Path, files: &[PathBuf]) -> Self {
        let extracted: Vec<(PathBuf, Vec<SymbolEntry>)> = files
            .par_iter()
            .filter_map(|path| {
                let absolute = if path.is_absolute() { path.clone() } else { root.join(path) };
                match std::fs::read_to_string(&absolute) {
                    Ok(source) => {
                        let rel = relative_to_root(root, path);
                        let entries = extract_symbols(&rel, &source);
                        Some((rel, entries))
                    }
                    Err(e) => {
                        debug!(file = %absolute.display(), error = %e, "skipping unreadable file");
                        None
                    }
                }
            })
            .collect();

        let mut index = Self::new();
        for (file, entries) in extracted {
            index.insert_file(file, entries);
        }
        debug!(files = index.by_file.len(), symbols = index.len(), "symbol index built");
        index
    }

    /// Walk `root` and index every recognised source file
    pub fn scan(root: &Path) -> Self {
        let files = discover_sources(root, &[], &[]);
        Self::build(root, &files)
    }

    /// Index in-memory sources (relative path, content)
    pub fn from_sources<P: AsRef<Path>>(sources: &[(P, &str)]) -> Self {
        let mut index = Self::new();
        for (path, source) in sources {
            let rel = path.as_ref().to_path_buf();
            let entries = extract_symbols(&rel, source);
            index.insert_file(rel, entries);
        }
        index
    }

    /// Re-index one file after it was edited
    pub fn update_file(&mut self, relative: &Path, source: &str) {
        self.remove_file(relative);
        let entries = extract_symbols(relative, source);
        self.insert_file(relative.to_path_buf(), entries);
    }

    fn remove_file(&mut self, relative: &Path) {
        if let Some(old) = self.by_file.remove(relative) {
            for entry in old {
                if let Some(list) = self.by_name.get_mut(&entry.name) {
                    list.retain(|e| e.file != relative);
                    if list.is_empty() {
                        self.by_name.remove(&entry.name);
                    }
                }
            }
        }
    }

    fn insert_file(&mut self, file: PathBuf, entries: Vec<SymbolEntry>) {
        for entry in &entries {
            let list = self.by_name.entry(entry.name.clone()).or_default();
            list.push(entry.clone());
            list.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        }
        self.by_file.insert(file, entries);
    }

    /// Exported declarations of `name`, ordered by file path
    pub fn exporters(&self, name: &str) -> Vec<&SymbolEntry> {
        self.by_name
            .get(name)
            .map(|list| list.iter().filter(|e| e.exported).collect())
            .unwrap_or_default()
    }

    /// Type declarations of `name`, exported or not
    pub fn type_declarations(&self, name: &str) -> Vec<&SymbolEntry> {
        self.by_name
            .get(name)
            .map(|list| list.iter().filter(|e| e.is_type).collect())
            .unwrap_or_default()
    }

    /// Names exported by one file
    pub fn exported_in(&self, relative: &Path) -> Vec<&str> {
        self.by_file
            .get(relative)
            .map(|list| list.iter().filter(|e| e.exported).map(|e| e.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn declarations_in(&self, relative: &Path) -> &[SymbolEntry] {
        self.by_file.get(relative).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
