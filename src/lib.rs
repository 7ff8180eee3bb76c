//! groum-search: pattern search and structural diff over mined API-usage
//! graphs
//!
//! # Overview
//!
//! groum-search matches a query method, represented as an ACDFG (an
//! annotated control/data-flow graph), against clusters of mined usage
//! patterns. It selects candidate clusters by shared method names, delegates
//! the subgraph-isomorphism work to an external solver with a wall-clock
//! budget, and turns the solver's verdicts into ranked hits with line
//! mappings, structural diffs, and pseudocode of the violated pattern.
//!
//! # Quick Start
//!
//! ```no_run
//! use groum_search::{SearchConfig, Searcher};
//!
//! # async fn example() -> groum_search::Result<()> {
//! let config = SearchConfig::new("/data/clusters", "/usr/bin/groum-solver");
//! let searcher = Searcher::new(config)?;
//!
//! // Decode and search a query graph; failures inside individual clusters
//! // are logged and skipped
//! let results = searcher.search_file("query.acdfg.bin".as_ref()).await?;
//! for cluster in &results {
//!     for hit in &cluster.hits {
//!         println!("{} (popularity {})", hit.label, hit.popularity);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **graph**: the ACDFG arena, binary decode, slicing, CFG analyses
//! - **index**: set-trie superset queries mapping method bags to clusters
//! - **lattice**: mined pattern bins, solver result decode, popularity
//! - **diff**: partial correspondences and structural residues
//! - **codegen**: pattern pseudocode and prose patch recommendations
//! - **search**: the async orchestrator around the external solver
//! - **anomaly**: per-pull-request anomaly reports and their store seam

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod anomaly;
pub mod codegen;
pub mod diff;
pub mod error;
pub mod graph;
pub mod index;
pub mod lattice;
pub mod search;

// Re-export core types
pub use anomaly::{Anomaly, AnomalyStatus, AnomalyStore, MemoryStore};
pub use codegen::{CodeGenerator, PatternAst};
pub use diff::{DiffKind, GraphDiff, Mapping};
pub use graph::{Acdfg, CfgView, Dominators, EdgeId, EdgeKind, GraphBuilder, NodeId};
pub use index::{ClusterIndex, SetTrie};
pub use lattice::{Lattice, PatternBin, SearchResultsFile};
pub use search::{ClusterResults, SearchConfig, SearchHit, Searcher};

// Error type
pub use error::{Error, Result};
