//! Search orchestration: query graph in, ranked pattern hits out
//!
//! A search fans out over the clusters sharing enough method names with the
//! query, runs the external isomorphism solver against each cluster's
//! lattice, and interprets the verdicts into [`SearchHit`]s. Per-cluster and
//! per-result failures are logged and skipped; only a malformed query is
//! fatal.
//!
//! # Example
//!
//! ```no_run
//! use groum_search::search::{SearchConfig, Searcher};
//!
//! # async fn run() -> groum_search::Result<()> {
//! let config = SearchConfig::new("/data/clusters", "/usr/bin/groum-solver");
//! let searcher = Searcher::new(config)?;
//! let results = searcher.search_file("query.acdfg.bin".as_ref()).await?;
//! for cluster in &results {
//!     println!("cluster {}: {} hits", cluster.cluster_id, cluster.hits.len());
//! }
//! # Ok(())
//! # }
//! ```

mod interpret;
mod solver;

pub use interpret::{classify, Classification};

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::Acdfg;
use crate::index::ClusterIndex;

/// Tunables for a [`Searcher`]
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Directory holding `clusters.txt` and the per-cluster lattices
    pub cluster_dir: PathBuf,
    /// Path to the isomorphism solver binary
    pub solver_path: PathBuf,
    /// Wall-clock budget per solver run
    pub timeout: Duration,
    /// Minimum method names a cluster must share with the query
    pub min_methods_in_common: usize,
}

impl SearchConfig {
    /// Config with the reference defaults: 10s solver budget, two methods in
    /// common
    pub fn new(cluster_dir: impl Into<PathBuf>, solver_path: impl Into<PathBuf>) -> Self {
        Self {
            cluster_dir: cluster_dir.into(),
            solver_path: solver_path.into(),
            timeout: Duration::from_secs(10),
            min_methods_in_common: 2,
        }
    }

    fn lattice_path(&self, cluster_id: u32) -> PathBuf {
        self.cluster_dir
            .join("all_clusters")
            .join(format!("cluster_{cluster_id}"))
            .join(format!("cluster_{cluster_id}_lattice.bin"))
    }
}

/// Line-level correspondence between the query and one cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMatch {
    /// Fully qualified member method name
    pub method_name: String,
    /// `(query line, member line)` pairs for matched calls
    pub matched_lines: Vec<(u32, u32)>,
    /// Member lines with no query counterpart
    pub added_lines: Vec<u32>,
    /// Query lines with no member counterpart
    pub removed_lines: Vec<u32>,
}

/// One pattern bin as seen from the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRef {
    /// Bin id within its cluster lattice
    pub id: u32,
    /// Popularity: members of this bin and every bin subsuming it
    pub frequency: u64,
    /// Direct member count
    pub cardinality: u64,
    /// Per-member line correspondences
    pub members: Vec<MemberMatch>,
    /// Prose recommendations from the structural residues
    pub diffs: Vec<String>,
    /// Pseudocode rendering of the bin's pattern
    pub pattern_code: String,
}

/// One interpreted solver verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Verdict label (`CORRECT`, `ANOMALOUS_SUBSUMED`, ...)
    pub label: String,
    /// Frequency of the reference bin, the ranking key
    pub popularity: u64,
    /// The reference pattern bin
    pub reference: BinRef,
    /// The anomalous bin, for anomaly verdicts
    pub anomalous: Option<BinRef>,
}

/// All hits one cluster contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterResults {
    /// Cluster id from the descriptor
    pub cluster_id: u32,
    /// Hits, most popular first
    pub hits: Vec<SearchHit>,
}

/// Pattern search engine over a mined cluster directory
///
/// The cluster index is built once at construction and only read
/// afterwards, so a `Searcher` can serve concurrent searches.
#[derive(Debug)]
pub struct Searcher {
    config: SearchConfig,
    index: ClusterIndex,
}

impl Searcher {
    /// Build the engine, loading `clusters.txt` from the cluster directory
    ///
    /// # Errors
    ///
    /// I/O or descriptor parse failure.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let index = ClusterIndex::from_file(&config.cluster_dir.join("clusters.txt"))?;
        Ok(Self { config, index })
    }

    /// Decode a query graph file and search it
    ///
    /// # Errors
    ///
    /// Only query decode and I/O failures; matching failures are isolated
    /// per cluster.
    pub async fn search_file(&self, path: &Path) -> Result<Vec<ClusterResults>> {
        let bytes = tokio::fs::read(path).await?;
        let query = Acdfg::from_bytes(&bytes)?;
        self.search(&query).await
    }

    /// Search every candidate cluster for the query
    ///
    /// Clusters are processed sequentially; a solver timeout, nonzero exit,
    /// or undecodable output drops that cluster's contribution and the
    /// search continues. Returned clusters are ordered by their best hit's
    /// popularity descending, hits within a cluster likewise (bin id breaks
    /// ties).
    ///
    /// # Errors
    ///
    /// I/O failure writing the query scratch file.
    pub async fn search(&self, query: &Acdfg) -> Result<Vec<ClusterResults>> {
        let names = query.method_names();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let candidates = self
            .index
            .clusters_for(&name_refs, self.config.min_methods_in_common);
        debug!(candidates = candidates.len(), "clusters selected for query");

        // The solver reads the query from disk
        let mut query_file = tempfile::NamedTempFile::new()?;
        query_file.write_all(&query.to_bytes())?;
        query_file.flush()?;

        let mut clusters: Vec<ClusterResults> = Vec::new();
        for candidate in candidates {
            let lattice_path = self.config.lattice_path(candidate.id);
            let outcome =
                solver::run_solver(&self.config, query_file.path(), &lattice_path).await;
            let file = match outcome {
                Ok(file) => file,
                Err(err) => {
                    warn!(cluster = candidate.id, %err, "cluster skipped");
                    continue;
                }
            };

            let mut hits: Vec<SearchHit> = Vec::new();
            for result in &file.results {
                match interpret::interpret_result(query, &file.lattice, result) {
                    Ok(hit) => hits.push(hit),
                    Err(err) => {
                        warn!(cluster = candidate.id, %err, "result skipped");
                    }
                }
            }
            if hits.is_empty() {
                continue;
            }
            hits.sort_by(|a, b| {
                b.popularity
                    .cmp(&a.popularity)
                    .then(a.reference.id.cmp(&b.reference.id))
            });
            clusters.push(ClusterResults {
                cluster_id: candidate.id,
                hits,
            });
        }

        clusters.sort_by(|a, b| {
            let pa = a.hits.first().map_or(0, |h| h.popularity);
            let pb = b.hits.first().map_or(0, |h| h.popularity);
            pb.cmp(&pa).then(a.cluster_id.cmp(&b.cluster_id))
        });
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SearchConfig::new("/data/clusters", "/bin/solver");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.min_methods_in_common, 2);
    }

    #[test]
    fn test_lattice_path_layout() {
        let config = SearchConfig::new("/data/clusters", "/bin/solver");
        assert_eq!(
            config.lattice_path(12),
            PathBuf::from("/data/clusters/all_clusters/cluster_12/cluster_12_lattice.bin")
        );
    }

    #[test]
    fn test_result_shapes_serialize() {
        let hit = SearchHit {
            label: "CORRECT".to_owned(),
            popularity: 5,
            reference: BinRef {
                id: 1,
                frequency: 5,
                cardinality: 2,
                members: vec![MemberMatch {
                    method_name: "com.example.App.run".to_owned(),
                    matched_lines: vec![(5, 30)],
                    added_lines: vec![],
                    removed_lines: vec![6],
                }],
                diffs: vec![],
                pattern_code: String::new(),
            },
            anomalous: None,
        };
        let cluster = ClusterResults {
            cluster_id: 3,
            hits: vec![hit],
        };
        let json = serde_json::to_string(&cluster).unwrap();
        let back: ClusterResults = serde_json::from_str(&json).unwrap();
        assert_eq!(cluster, back);
    }
}
