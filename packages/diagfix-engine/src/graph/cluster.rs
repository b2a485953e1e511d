//! Diagnostic clustering
//!
//! Pass 1 groups diagnostics sharing (file, category, code). Pass 2 takes the
//! leftovers and chains those in the same file and category whose lines are
//! within the proximity window. Whatever remains becomes a single-member
//! cluster, so every diagnostic belongs to exactly one cluster.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use diagfix_storage::{Diagnostic, DiagnosticCategory};

use crate::classify::primary_symbol;
use crate::symbols::relative_to_root;

/// How a cluster was formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    SameCode,
    Proximity,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCluster {
    /// Members ordered by line
    pub diagnostic_ids: Vec<Uuid>,
    pub file: PathBuf,
    pub category: DiagnosticCategory,
    /// Shared code (None for proximity clusters with mixed codes)
    pub code: Option<String>,
    pub kind: ClusterKind,
    pub root_cause: String,
    pub suggested_fix: String,
    pub priority: f64,
}

impl DiagnosticCluster {
    pub fn len(&self) -> usize {
        self.diagnostic_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostic_ids.is_empty()
    }
}

/// Static category priority (higher first)
pub fn category_priority(category: DiagnosticCategory) -> f64 {
    match category {
        DiagnosticCategory::Syntax => 10.0,
        DiagnosticCategory::MissingImport => 9.0,
        DiagnosticCategory::MissingType => 9.0,
        DiagnosticCategory::UsesMissingType => 8.0,
        DiagnosticCategory::UnresolvedReference => 8.0,
        DiagnosticCategory::TypeMismatch => 6.0,
        DiagnosticCategory::MissingProperty => 6.0,
        DiagnosticCategory::NullSafety => 5.0,
        DiagnosticCategory::ImplicitAny => 4.0,
        DiagnosticCategory::UnusedSymbol => 2.0,
        DiagnosticCategory::Other => 1.0,
    }
}

fn size_bonus(size: usize) -> f64 {
    (0.5 * size.saturating_sub(1) as f64).min(5.0)
}

fn root_cause_text(category: DiagnosticCategory, representative: &Diagnostic, size: usize) -> String {
    let subject = primary_symbol(&representative.message)
        .map(|s| format!("'{}'", s))
        .unwrap_or_else(|| "a symbol".to_string());
    let cause = match category {
        DiagnosticCategory::Syntax => "source does not parse".to_string(),
        DiagnosticCategory::MissingImport => format!("module or export for {} cannot be resolved", subject),
        DiagnosticCategory::MissingType => format!("type {} is not declared or imported", subject),
        DiagnosticCategory::UsesMissingType => format!("exported API refers to non-exported type {}", subject),
        DiagnosticCategory::UnresolvedReference => format!("{} is not in scope", subject),
        DiagnosticCategory::TypeMismatch => "value types disagree with their declarations".to_string(),
        DiagnosticCategory::MissingProperty => format!("member {} is missing from its declared type", subject),
        DiagnosticCategory::NullSafety => "possibly null or undefined values are dereferenced".to_string(),
        DiagnosticCategory::UnusedSymbol => "declarations are never used".to_string(),
        DiagnosticCategory::ImplicitAny => "bindings lack type annotations".to_string(),
        DiagnosticCategory::Other => representative.code.clone(),
    };
    if size > 1 {
        format!("{} ({} occurrences)", cause, size)
    } else {
        cause
    }
}

fn suggested_fix_text(category: DiagnosticCategory) -> &'static str {
    match category {
        DiagnosticCategory::Syntax => "repair the syntax error before anything else",
        DiagnosticCategory::MissingImport => "add or correct the import statement",
        DiagnosticCategory::MissingType => "import the type or declare a placeholder",
        DiagnosticCategory::UsesMissingType => "export the referenced type",
        DiagnosticCategory::UnresolvedReference => "import or declare the missing name",
        DiagnosticCategory::TypeMismatch => "coerce the value to the expected type",
        DiagnosticCategory::MissingProperty => "add the member to the declared type",
        DiagnosticCategory::NullSafety => "use optional chaining or a non-null guard",
        DiagnosticCategory::UnusedSymbol => "remove the declaration or prefix it with '_'",
        DiagnosticCategory::ImplicitAny => "annotate the binding",
        DiagnosticCategory::Other => "inspect manually",
    }
}

/// Cluster a batch; result is ordered by descending priority
pub fn cluster_diagnostics(
    diagnostics: &[Diagnostic],
    project_root: &Path,
    proximity_window: u32,
) -> Vec<DiagnosticCluster> {
    let files: Vec<PathBuf> = diagnostics
        .iter()
        .map(|d| relative_to_root(project_root, &d.file))
        .collect();

    // Pass 1: (file, category, code)
    let mut by_code: BTreeMap<(PathBuf, DiagnosticCategory, String), Vec<usize>> = BTreeMap::new();
    for (i, d) in diagnostics.iter().enumerate() {
        by_code
            .entry((files[i].clone(), d.category, d.code.clone()))
            .or_default()
            .push(i);
    }

    let mut clusters = Vec::new();
    let mut leftovers: BTreeMap<(PathBuf, DiagnosticCategory), Vec<usize>> = BTreeMap::new();
    for ((file, category, code), members) in by_code {
        if members.len() > 1 {
            clusters.push(make_cluster(diagnostics, members, file, category, Some(code), ClusterKind::SameCode));
        } else {
            leftovers.entry((file, category)).or_default().extend(members);
        }
    }

    // Pass 2: line proximity among leftovers
    for ((file, category), mut members) in leftovers {
        members.sort_by_key(|&i| diagnostics[i].line);
        let mut run: Vec<usize> = Vec::new();
        for i in members {
            let close = run
                .last()
                .map(|&prev| diagnostics[i].line.saturating_sub(diagnostics[prev].line) <= proximity_window)
                .unwrap_or(true);
            if !close {
                clusters.push(finish_run(diagnostics, std::mem::take(&mut run), &file, category));
            }
            run.push(i);
        }
        if !run.is_empty() {
            clusters.push(finish_run(diagnostics, run, &file, category));
        }
    }

    clusters.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file.cmp(&b.file))
    });
    clusters
}

fn finish_run(
    diagnostics: &[Diagnostic],
    run: Vec<usize>,
    file: &Path,
    category: DiagnosticCategory,
) -> DiagnosticCluster {
    let kind = if run.len() > 1 { ClusterKind::Proximity } else { ClusterKind::Single };
    let code = if run.len() == 1 {
        Some(diagnostics[run[0]].code.clone())
    } else {
        None
    };
    make_cluster(diagnostics, run, file.to_path_buf(), category, code, kind)
}

fn make_cluster(
    diagnostics: &[Diagnostic],
    mut members: Vec<usize>,
    file: PathBuf,
    category: DiagnosticCategory,
    code: Option<String>,
    kind: ClusterKind,
) -> DiagnosticCluster {
    members.sort_by_key(|&i| (diagnostics[i].line, diagnostics[i].column));
    let representative = &diagnostics[members[0]];
    let size = members.len();
    DiagnosticCluster {
        diagnostic_ids: members.iter().map(|&i| diagnostics[i].id).collect(),
        file,
        category,
        code,
        kind,
        root_cause: root_cause_text(category, representative, size),
        suggested_fix: suggested_fix_text(category).to_string(),
        priority: category_priority(category) + size_bonus(size),
    }
}

/// Highest-priority cluster first, topological order inside each cluster
pub fn clustered_order(topological: &[Uuid], clusters: &[DiagnosticCluster]) -> Vec<Uuid> {
    let position: HashMap<Uuid, usize> = topological
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut order = Vec::with_capacity(topological.len());
    for cluster in clusters {
        let mut members = cluster.diagnostic_ids.clone();
        members.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        order.extend(members);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(file: &str, line: u32, code: &str, category: DiagnosticCategory) -> Diagnostic {
        Diagnostic::new(code, "Cannot find name 'Foo'.", file, line, 1).with_category(category)
    }

    #[test]
    fn test_same_code_then_proximity() {
        let batch = vec![
            diag("a.ts", 10, "TS2304", DiagnosticCategory::MissingType),
            diag("a.ts", 40, "TS2304", DiagnosticCategory::MissingType),
            diag("a.ts", 12, "TS2322", DiagnosticCategory::TypeMismatch),
            diag("a.ts", 15, "TS2345", DiagnosticCategory::TypeMismatch),
            diag("a.ts", 30, "TS2367", DiagnosticCategory::TypeMismatch),
        ];
        let clusters = cluster_diagnostics(&batch, Path::new(""), 5);

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].kind, ClusterKind::SameCode);
        assert_eq!(clusters[0].category, DiagnosticCategory::MissingType);
        assert_eq!(clusters[0].diagnostic_ids, vec![batch[0].id, batch[1].id]);
        assert!(clusters[0].root_cause.contains("'Foo'"));
        assert_eq!(clusters[0].priority, 9.5);

        let proximity = clusters.iter().find(|c| c.kind == ClusterKind::Proximity).unwrap();
        assert_eq!(proximity.diagnostic_ids, vec![batch[2].id, batch[3].id]);
        assert_eq!(proximity.code, None);

        let single = clusters.iter().find(|c| c.kind == ClusterKind::Single).unwrap();
        assert_eq!(single.diagnostic_ids, vec![batch[4].id]);

        let total: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, batch.len());
    }

    #[test]
    fn test_files_never_share_a_cluster() {
        let batch = vec![
            diag("a.ts", 1, "TS2304", DiagnosticCategory::MissingType),
            diag("b.ts", 1, "TS2304", DiagnosticCategory::MissingType),
        ];
        let clusters = cluster_diagnostics(&batch, Path::new(""), 5);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.kind == ClusterKind::Single));
    }

    #[test]
    fn test_clustered_order_respects_topology_inside_cluster() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let clusters = vec![
            DiagnosticCluster {
                diagnostic_ids: vec![c],
                file: PathBuf::from("x.ts"),
                category: DiagnosticCategory::Syntax,
                code: None,
                kind: ClusterKind::Single,
                root_cause: String::new(),
                suggested_fix: String::new(),
                priority: 10.0,
            },
            DiagnosticCluster {
                diagnostic_ids: vec![a, b],
                file: PathBuf::from("y.ts"),
                category: DiagnosticCategory::Other,
                code: None,
                kind: ClusterKind::Proximity,
                root_cause: String::new(),
                suggested_fix: String::new(),
                priority: 1.5,
            },
        ];
        assert_eq!(clustered_order(&[b, a, c], &clusters), vec![c, b, a]);
    }
}
