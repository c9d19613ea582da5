//! Per-storage reclaim results

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db::schemas::StorageKind;

/// What happened to one orphan candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReclaimOutcome {
    /// Would have been reclaimed; dry run
    DryRun,
    /// Data cleared and descriptor deleted
    Reclaimed,
    /// Excluded by the storage filter
    Filtered,
    /// Descriptor already gone when the sweep reached it
    Missing,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    pub namespace: String,
    pub storage_id: String,
    pub kind: Option<StorageKind>,
    #[serde(flatten)]
    pub outcome: ReclaimOutcome,
}

impl ReclaimReport {
    pub fn is_reclaimed(&self) -> bool {
        self.outcome == ReclaimOutcome::Reclaimed
    }
}

/// A library naming a credentials namespace that was not part of the run.
///
/// Its storages are protected in the namespace that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrackedReference {
    pub namespace: String,
    pub library: String,
    pub referenced_namespace: String,
}

/// Counts over a sweep's reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimSummary {
    pub candidates: usize,
    pub dry_run: usize,
    pub reclaimed: usize,
    pub filtered: usize,
    pub missing: usize,
    pub failed: usize,
    /// Namespaces referenced by libraries but missing from the run
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub untracked_namespaces: BTreeSet<String>,
}

impl ReclaimSummary {
    pub fn from_reports(reports: &[ReclaimReport]) -> Self {
        reports.iter().fold(
            Self {
                candidates: reports.len(),
                ..Default::default()
            },
            |mut acc, r| {
                match r.outcome {
                    ReclaimOutcome::DryRun => acc.dry_run += 1,
                    ReclaimOutcome::Reclaimed => acc.reclaimed += 1,
                    ReclaimOutcome::Filtered => acc.filtered += 1,
                    ReclaimOutcome::Missing => acc.missing += 1,
                    ReclaimOutcome::Failed { .. } => acc.failed += 1,
                }
                acc
            },
        )
    }

    pub fn with_untracked(mut self, untracked: &[UntrackedReference]) -> Self {
        self.untracked_namespaces
            .extend(untracked.iter().map(|u| u.referenced_namespace.clone()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: ReclaimOutcome) -> ReclaimReport {
        ReclaimReport {
            namespace: "default".into(),
            storage_id: "s1".into(),
            kind: Some(StorageKind::Lmdb),
            outcome,
        }
    }

    #[test]
    fn test_summary_counts_each_outcome() {
        let reports = vec![
            report(ReclaimOutcome::Reclaimed),
            report(ReclaimOutcome::Reclaimed),
            report(ReclaimOutcome::Filtered),
            report(ReclaimOutcome::Failed {
                reason: "permission denied".into(),
            }),
        ];
        let summary = ReclaimSummary::from_reports(&reports);
        assert_eq!(summary.candidates, 4);
        assert_eq!(summary.reclaimed, 2);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.dry_run, 0);
    }

    #[test]
    fn test_summary_lists_untracked_namespaces_once() {
        let untracked = |library: &str, referenced: &str| UntrackedReference {
            namespace: "default".into(),
            library: library.into(),
            referenced_namespace: referenced.into(),
        };
        let summary = ReclaimSummary::from_reports(&[]).with_untracked(&[
            untracked("c", "ns2"),
            untracked("d", "ns2"),
            untracked("e", "ns3"),
        ]);
        assert_eq!(
            summary.untracked_namespaces.iter().collect::<Vec<_>>(),
            vec!["ns2", "ns3"]
        );

        let json = serde_json::to_value(ReclaimSummary::default()).unwrap();
        assert!(json.get("untracked_namespaces").is_none());
    }

    #[test]
    fn test_report_json_is_flat() {
        let json = serde_json::to_value(report(ReclaimOutcome::Failed {
            reason: "boom".into(),
        }))
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "boom");
        assert_eq!(json["kind"], "lmdb");
        assert_eq!(json["storage_id"], "s1");
    }
}
