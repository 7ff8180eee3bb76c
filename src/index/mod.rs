//! Cluster index: which mined clusters are worth running the solver on
//!
//! A cluster groups methods that co-occur in mined patterns. Given the bag of
//! method names a query graph calls, the index returns every cluster sharing
//! at least `min_common` of them, using a set-trie for superset queries over
//! the clusters' method sets.
//!
//! # Example
//!
//! ```
//! use groum_search::index::ClusterIndex;
//!
//! let descriptor = "\
//! ## id: methods
//! 1: android.media.MediaPlayer.start, android.media.MediaPlayer.release
//! 2: android.media.MediaPlayer.start, android.media.MediaPlayer.pause
//! ";
//! let index = ClusterIndex::from_reader(descriptor.as_bytes()).unwrap();
//! let hits = index.clusters_for(
//!     &["android.media.MediaPlayer.start", "android.media.MediaPlayer.release"],
//!     2,
//! );
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].id, 1);
//! ```

mod cluster;
mod set_trie;

pub use cluster::{ClusterIndex, ClusterInfo};
pub use set_trie::SetTrie;
