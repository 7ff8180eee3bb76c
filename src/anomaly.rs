//! Anomaly reports built from search results
//!
//! An anomaly is one `ANOMALOUS_SUBSUMED` hit tied to a concrete method in a
//! concrete pull request, with the patch prose and pattern pseudocode
//! already rendered. Persistence is behind the narrow [`AnomalyStore`] seam;
//! [`MemoryStore`] serves tests and single-process use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::ClusterResults;

/// A source repository
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    /// Owning user or organization
    pub user: String,
    /// Repository name
    pub name: String,
}

/// A commit in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// The repository
    pub repo: RepoRef,
    /// Commit hash
    pub hash: String,
}

/// A pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// The repository
    pub repo: RepoRef,
    /// Pull request number
    pub number: u64,
}

/// A method at a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    /// The commit the method was extracted at
    pub commit: CommitRef,
    /// Fully qualified class name
    pub class_name: String,
    /// Simple method name
    pub method_name: String,
    /// First source line of the method
    pub start_line: u32,
}

/// A mined cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    /// Cluster id from the descriptor
    pub id: u32,
}

/// A pattern bin within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRef {
    /// The cluster the bin belongs to
    pub cluster: ClusterRef,
    /// Bin id within the cluster lattice
    pub bin_id: u32,
    /// Verdict label the bin was hit with
    pub kind: String,
    /// Bin popularity
    pub frequency: u64,
    /// Direct member count
    pub cardinality: u64,
}

/// Lifecycle of a reported anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyStatus {
    /// Reported, not yet addressed
    New,
    /// Marked resolved
    Solved,
}

/// One anomalous-usage report for a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Progressive id within the pull request, starting at 1
    pub numeric_id: u32,
    /// The offending method
    pub method_ref: MethodRef,
    /// The pull request the report belongs to
    pub pull_request: PullRequestRef,
    /// Short human-readable summary
    pub description: String,
    /// Prose patch recommendation (may be empty when no diff was
    /// computable)
    pub patch_text: String,
    /// Pseudocode of the violated pattern
    pub pattern_text: String,
    /// The pattern the method deviates from
    pub pattern_ref: PatternRef,
    /// Repository-relative path of the offending file
    pub git_path: String,
    /// Lifecycle state
    pub status: AnomalyStatus,
}

/// Narrow persistence seam for anomalies
pub trait AnomalyStore {
    /// Insert or replace an anomaly
    ///
    /// # Errors
    ///
    /// Backend-specific write failure.
    fn put(&mut self, anomaly: Anomaly) -> Result<()>;

    /// Fetch one anomaly of a pull request
    fn get(&self, pull_request: &PullRequestRef, numeric_id: u32) -> Option<Anomaly>;

    /// All anomalies of a pull request, in numeric-id order
    fn list_for_pr(&self, pull_request: &PullRequestRef) -> Vec<Anomaly>;

    /// Update the lifecycle state of one anomaly
    ///
    /// # Errors
    ///
    /// [`crate::Error::MissingMapping`] when the anomaly does not exist.
    fn set_status(
        &mut self,
        pull_request: &PullRequestRef,
        numeric_id: u32,
        status: AnomalyStatus,
    ) -> Result<()>;
}

type PrKey = (String, String, u64);

fn pr_key(pr: &PullRequestRef) -> PrKey {
    (pr.repo.user.clone(), pr.repo.name.clone(), pr.number)
}

/// In-memory [`AnomalyStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    by_pr: BTreeMap<PrKey, BTreeMap<u32, Anomaly>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnomalyStore for MemoryStore {
    fn put(&mut self, anomaly: Anomaly) -> Result<()> {
        self.by_pr
            .entry(pr_key(&anomaly.pull_request))
            .or_default()
            .insert(anomaly.numeric_id, anomaly);
        Ok(())
    }

    fn get(&self, pull_request: &PullRequestRef, numeric_id: u32) -> Option<Anomaly> {
        self.by_pr
            .get(&pr_key(pull_request))
            .and_then(|m| m.get(&numeric_id))
            .cloned()
    }

    fn list_for_pr(&self, pull_request: &PullRequestRef) -> Vec<Anomaly> {
        self.by_pr
            .get(&pr_key(pull_request))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn set_status(
        &mut self,
        pull_request: &PullRequestRef,
        numeric_id: u32,
        status: AnomalyStatus,
    ) -> Result<()> {
        let anomaly = self
            .by_pr
            .get_mut(&pr_key(pull_request))
            .and_then(|m| m.get_mut(&numeric_id))
            .ok_or_else(|| {
                crate::Error::MissingMapping(format!(
                    "anomaly {numeric_id} not found for pull request {}",
                    pull_request.number
                ))
            })?;
        anomaly.status = status;
        Ok(())
    }
}

/// Build anomaly reports from search results
///
/// Every `ANOMALOUS_SUBSUMED` hit becomes one report. Reports are ordered
/// by pattern frequency descending (cluster id, then bin id, break ties)
/// and numbered 1..n in that order.
#[must_use]
pub fn build_anomalies(
    method_ref: &MethodRef,
    pull_request: &PullRequestRef,
    git_path: &str,
    results: &[ClusterResults],
) -> Vec<Anomaly> {
    let mut hits: Vec<(u32, &crate::search::SearchHit)> = Vec::new();
    for cluster in results {
        for hit in &cluster.hits {
            if hit.label == "ANOMALOUS_SUBSUMED" {
                hits.push((cluster.cluster_id, hit));
            }
        }
    }
    hits.sort_by(|(ca, a), (cb, b)| {
        b.popularity
            .cmp(&a.popularity)
            .then(ca.cmp(cb))
            .then(a.reference.id.cmp(&b.reference.id))
    });

    hits.into_iter()
        .enumerate()
        .map(|(i, (cluster_id, hit))| {
            #[allow(clippy::cast_possible_truncation)] // counts per PR
            let numeric_id = (i + 1) as u32;
            Anomaly {
                numeric_id,
                method_ref: method_ref.clone(),
                pull_request: pull_request.clone(),
                description: format!(
                    "Anomalous usage in method {}.{}",
                    method_ref.class_name, method_ref.method_name
                ),
                patch_text: hit.reference.diffs.join("\n"),
                pattern_text: hit.reference.pattern_code.clone(),
                pattern_ref: PatternRef {
                    cluster: ClusterRef { id: cluster_id },
                    bin_id: hit.reference.id,
                    kind: hit.label.clone(),
                    frequency: hit.reference.frequency,
                    cardinality: hit.reference.cardinality,
                },
                git_path: git_path.to_owned(),
                status: AnomalyStatus::New,
            }
        })
        .collect()
}
