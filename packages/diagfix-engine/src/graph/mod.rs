//! Ordering and grouping of a diagnostic batch

mod cluster;
mod dependency;

pub use cluster::{
    category_priority, cluster_diagnostics, clustered_order, ClusterKind, DiagnosticCluster,
};
pub use dependency::{category_affinity, DiagnosticGraph, EdgeReason};
