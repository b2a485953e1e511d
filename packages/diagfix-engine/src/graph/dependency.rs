//! Diagnostic dependency graph (petgraph)
//!
//! Directed graph where nodes are the diagnostics of one batch and an edge
//! `A → B` means "A depends on B": fixing B first is likely to fix or change A.
//! Cycles are allowed; the topological order breaks them without failing.

use lazy_static::lazy_static;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use diagfix_storage::{Diagnostic, DiagnosticCategory};

use crate::classify::{is_identifier, primary_symbol, quoted_names};
use crate::symbols::{relative_to_root, SymbolIndex};

/// Why an edge exists (first matching rule wins)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeReason {
    /// Same file, dependent on a later or equal line
    SameFile,
    /// Dependent names a symbol exported by the prerequisite's file
    ImportableSymbol,
    /// Dependent names a type declared at the prerequisite's location
    DeclaredType,
    /// Category affinity table
    CategoryAffinity,
}

lazy_static! {
    /// (dependent, prerequisite, same file only)
    static ref CATEGORY_AFFINITY: Vec<(DiagnosticCategory, DiagnosticCategory, bool)> = {
        use DiagnosticCategory::*;
        vec![
            (UsesMissingType, MissingType, false),
            (MissingType, MissingImport, false),
            (UnresolvedReference, MissingImport, false),
            (MissingProperty, MissingType, false),
            (TypeMismatch, MissingType, false),
            (TypeMismatch, UnresolvedReference, true),
            (NullSafety, TypeMismatch, true),
        ]
    };
}

/// `dependent` depends on `prerequisite` according to the affinity table
pub fn category_affinity(
    dependent: DiagnosticCategory,
    prerequisite: DiagnosticCategory,
    same_file: bool,
) -> bool {
    if prerequisite == DiagnosticCategory::Syntax && dependent != DiagnosticCategory::Syntax {
        return same_file;
    }
    CATEGORY_AFFINITY
        .iter()
        .any(|(d, p, local)| *d == dependent && *p == prerequisite && (same_file || !local))
}

struct NodeInfo {
    id: Uuid,
    file: PathBuf,
    line: u32,
    category: DiagnosticCategory,
    symbol: Option<String>,
    type_names: Vec<String>,
}

/// Dependency graph over one batch of diagnostics
pub struct DiagnosticGraph {
    graph: DiGraph<Uuid, EdgeReason>,
    index: HashMap<Uuid, NodeIndex>,
    /// Input order, used for deterministic traversal
    input: Vec<NodeIndex>,
}

impl DiagnosticGraph {
    /// Build edges between every pair of diagnostics
    pub fn build(diagnostics: &[Diagnostic], symbols: &SymbolIndex, project_root: &Path) -> Self {
        let mut graph = DiGraph::with_capacity(diagnostics.len(), diagnostics.len());
        let mut index = HashMap::with_capacity(diagnostics.len());
        let mut input = Vec::with_capacity(diagnostics.len());

        let infos: Vec<NodeInfo> = diagnostics
            .iter()
            .map(|d| NodeInfo {
                id: d.id,
                file: relative_to_root(project_root, &d.file),
                line: d.line,
                category: d.category,
                symbol: primary_symbol(&d.message),
                type_names: quoted_names(&d.message)
                    .into_iter()
                    .filter(|n| is_identifier(n))
                    .collect(),
            })
            .collect();

        for info in &infos {
            let idx = graph.add_node(info.id);
            index.insert(info.id, idx);
            input.push(idx);
        }

        for (a, dependent) in infos.iter().enumerate() {
            for (b, prerequisite) in infos.iter().enumerate() {
                if a == b {
                    continue;
                }
                if let Some(reason) = edge_reason(dependent, prerequisite, symbols) {
                    graph.add_edge(input[a], input[b], reason);
                }
            }
        }

        Self {
            graph,
            index,
            input,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Reason of the edge `dependent → prerequisite`, if any
    pub fn edge(&self, dependent: Uuid, prerequisite: Uuid) -> Option<EdgeReason> {
        let a = *self.index.get(&dependent)?;
        let b = *self.index.get(&prerequisite)?;
        self.graph.find_edge(a, b).map(|e| self.graph[e])
    }

    /// Diagnostics `id` depends on
    pub fn dependencies(&self, id: Uuid) -> Vec<Uuid> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Diagnostics that depend on `id`
    pub fn dependents(&self, id: Uuid) -> Vec<Uuid> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: Uuid, direction: Direction) -> Vec<Uuid> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| if direction == Direction::Outgoing { e.target() } else { e.source() })
            .collect();
        out.sort();
        out.dedup();
        out.into_iter().map(|n| self.graph[n]).collect()
    }

    /// Dependencies before dependents
    ///
    /// Iterative DFS with a temporary-mark set: a node reached again while it
    /// is still on the stack is treated as already ordered, so cycles never
    /// stall the walk. Always returns every node exactly once.
    pub fn topological_order(&self) -> Vec<Uuid> {
        let mut done: HashSet<NodeIndex> = HashSet::with_capacity(self.input.len());
        let mut temporary: HashSet<NodeIndex> = HashSet::new();
        let mut order = Vec::with_capacity(self.input.len());

        for &start in &self.input {
            if done.contains(&start) {
                continue;
            }
            // (node, sorted dependencies, next dependency to visit)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            temporary.insert(start);
            stack.push((start, self.sorted_targets(start), 0));

            while let Some((node, deps, next)) = stack.last_mut() {
                if *next < deps.len() {
                    let dep = deps[*next];
                    *next += 1;
                    if done.contains(&dep) || temporary.contains(&dep) {
                        continue;
                    }
                    temporary.insert(dep);
                    let dep_targets = self.sorted_targets(dep);
                    stack.push((dep, dep_targets, 0));
                } else {
                    let node = *node;
                    stack.pop();
                    temporary.remove(&node);
                    if done.insert(node) {
                        order.push(self.graph[node]);
                    }
                }
            }
        }

        order
    }

    fn sorted_targets(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut targets: Vec<NodeIndex> = self.graph.neighbors_directed(node, Direction::Outgoing).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Diagnostics with dependents but no dependencies of their own
    pub fn root_causes(&self) -> Vec<Uuid> {
        self.input
            .iter()
            .filter(|&&n| {
                self.graph.neighbors_directed(n, Direction::Outgoing).next().is_none()
                    && self.graph.neighbors_directed(n, Direction::Incoming).next().is_some()
            })
            .map(|&n| self.graph[n])
            .collect()
    }

    /// Every diagnostic that transitively depends on `id`
    pub fn cascading_from(&self, id: Uuid) -> Vec<Uuid> {
        let Some(&start) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            for source in self.graph.neighbors_directed(node, Direction::Incoming) {
                if seen.insert(source) {
                    out.push(source);
                    queue.push_back(source);
                }
            }
        }
        out.sort();
        out.into_iter().map(|n| self.graph[n]).collect()
    }

    /// Number of direct dependents (used by prioritization)
    pub fn dependent_count(&self, id: Uuid) -> usize {
        self.dependents(id).len()
    }
}

fn edge_reason(a: &NodeInfo, b: &NodeInfo, symbols: &SymbolIndex) -> Option<EdgeReason> {
    let same_file = a.file == b.file;
    if same_file && a.line >= b.line {
        return Some(EdgeReason::SameFile);
    }

    if a.category.is_reference_class() {
        if let Some(symbol) = &a.symbol {
            if symbols.exported_in(&b.file).contains(&symbol.as_str()) {
                return Some(EdgeReason::ImportableSymbol);
            }
        }
    }

    let declares_named_type = a.type_names.iter().any(|name| {
        symbols
            .type_declarations(name)
            .iter()
            .any(|decl| decl.file == b.file && decl.line == b.line)
    });
    if declares_named_type {
        return Some(EdgeReason::DeclaredType);
    }

    if category_affinity(a.category, b.category, same_file) {
        return Some(EdgeReason::CategoryAffinity);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(file: &str, line: u32, code: &str, message: &str, category: DiagnosticCategory) -> Diagnostic {
        Diagnostic::new(code, message, file, line, 1).with_category(category)
    }

    #[test]
    fn test_same_file_orders_by_line() {
        let d20 = diag("a.ts", 20, "TS2322", "x", DiagnosticCategory::TypeMismatch);
        let d5 = diag("a.ts", 5, "TS2307", "Cannot find module './m'.", DiagnosticCategory::MissingImport);
        let d12 = diag("a.ts", 12, "TS2339", "y", DiagnosticCategory::MissingProperty);
        let batch = vec![d20.clone(), d5.clone(), d12.clone()];

        let graph = DiagnosticGraph::build(&batch, &SymbolIndex::new(), Path::new(""));
        assert_eq!(graph.edge(d12.id, d5.id), Some(EdgeReason::SameFile));
        assert_eq!(graph.edge(d5.id, d12.id), None);

        let order = graph.topological_order();
        assert_eq!(order, vec![d5.id, d12.id, d20.id]);
        assert_eq!(graph.root_causes(), vec![d5.id]);
        assert_eq!(graph.cascading_from(d5.id).len(), 2);
    }

    #[test]
    fn test_cross_file_importable_symbol() {
        let symbols = SymbolIndex::from_sources(&[("models.ts", "export interface User {}\n")]);
        let user_err = diag("models.ts", 3, "TS1005", "';' expected.", DiagnosticCategory::Syntax);
        let missing = diag("app.ts", 1, "TS2304", "Cannot find name 'User'.", DiagnosticCategory::MissingType);
        let batch = vec![missing.clone(), user_err.clone()];

        let graph = DiagnosticGraph::build(&batch, &symbols, Path::new(""));
        assert_eq!(graph.edge(missing.id, user_err.id), Some(EdgeReason::ImportableSymbol));
        assert_eq!(graph.topological_order(), vec![user_err.id, missing.id]);
    }

    #[test]
    fn test_declared_type_edge() {
        let symbols = SymbolIndex::from_sources(&[("types.ts", "const a = 1;\ninterface Shape { x: number }\n")]);
        let decl = diag("types.ts", 2, "TS2300", "Duplicate identifier.", DiagnosticCategory::Other);
        let user = diag("draw.ts", 9, "TS2345", "Argument of type 'Shape' is not assignable.", DiagnosticCategory::TypeMismatch);

        let graph = DiagnosticGraph::build(&[user.clone(), decl.clone()], &symbols, Path::new(""));
        assert_eq!(graph.edge(user.id, decl.id), Some(EdgeReason::DeclaredType));
    }

    #[test]
    fn test_category_affinity() {
        assert!(category_affinity(DiagnosticCategory::UsesMissingType, DiagnosticCategory::MissingType, false));
        assert!(!category_affinity(DiagnosticCategory::MissingType, DiagnosticCategory::UsesMissingType, false));
        assert!(category_affinity(DiagnosticCategory::NullSafety, DiagnosticCategory::Syntax, true));
        assert!(!category_affinity(DiagnosticCategory::NullSafety, DiagnosticCategory::Syntax, false));
        assert!(!category_affinity(DiagnosticCategory::NullSafety, DiagnosticCategory::TypeMismatch, false));
    }

    #[test]
    fn test_cycle_terminates_with_permutation() {
        // Same line in the same file: edges both ways
        let a = diag("a.ts", 4, "E1", "a", DiagnosticCategory::Other);
        let b = diag("a.ts", 4, "E2", "b", DiagnosticCategory::Other);
        let c = diag("b.ts", 1, "E3", "c", DiagnosticCategory::Other);
        let batch = vec![a.clone(), b.clone(), c.clone()];

        let graph = DiagnosticGraph::build(&batch, &SymbolIndex::new(), Path::new(""));
        assert!(graph.edge(a.id, b.id).is_some());
        assert!(graph.edge(b.id, a.id).is_some());

        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        let unique: HashSet<Uuid> = order.iter().copied().collect();
        assert_eq!(unique.len(), 3);
    }
}
