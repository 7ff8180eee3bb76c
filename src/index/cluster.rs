//! Cluster descriptors and the method-name index over them

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::index::set_trie::SetTrie;

/// One mined cluster: an id and the method names its patterns use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster id from the descriptor file
    pub id: u32,
    /// Method names, sorted and deduplicated
    pub methods: Vec<String>,
}

/// Index from method-name bags to candidate clusters
///
/// Built once from a descriptor file, then queried read-only for every
/// search. Method names get dense integer codes so cluster method sets
/// become small sorted `u32` sets in a [`SetTrie`].
#[derive(Debug)]
pub struct ClusterIndex {
    vocabulary: BTreeMap<String, u32>,
    trie: SetTrie<usize>,
    clusters: Vec<ClusterInfo>,
}

impl ClusterIndex {
    /// Parse a descriptor file (`clusters.txt`)
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the file cannot be read, [`Error::Decode`] on a
    /// malformed record.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let index = Self::from_reader(BufReader::new(file))?;
        info!(
            clusters = index.clusters.len(),
            methods = index.vocabulary.len(),
            path = %path.display(),
            "cluster index built"
        );
        Ok(index)
    }

    /// Parse a descriptor from any reader
    ///
    /// One record per line, `<id>: <method>, <method>, ...`; blank lines and
    /// `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] names the offending line on a malformed record or a
    /// duplicate cluster id.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut vocabulary: BTreeMap<String, u32> = BTreeMap::new();
        let mut clusters: Vec<ClusterInfo> = Vec::new();
        let mut seen_ids: BTreeSet<u32> = BTreeSet::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = lineno + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (id_part, methods_part) = trimmed.split_once(':').ok_or_else(|| {
                Error::decode(format!("cluster descriptor line {lineno}: missing ':'"))
            })?;
            let id: u32 = id_part.trim().parse().map_err(|_| {
                Error::decode(format!(
                    "cluster descriptor line {lineno}: bad cluster id {:?}",
                    id_part.trim()
                ))
            })?;
            if !seen_ids.insert(id) {
                return Err(Error::decode(format!(
                    "cluster descriptor line {lineno}: duplicate cluster id {id}"
                )));
            }

            let mut methods: Vec<String> = methods_part
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect();
            if methods.is_empty() {
                return Err(Error::decode(format!(
                    "cluster descriptor line {lineno}: cluster {id} lists no methods"
                )));
            }
            methods.sort_unstable();
            methods.dedup();

            for method in &methods {
                if !vocabulary.contains_key(method) {
                    #[allow(clippy::cast_possible_truncation)] // dense codes
                    let code = vocabulary.len() as u32;
                    vocabulary.insert(method.clone(), code);
                }
            }

            clusters.push(ClusterInfo { id, methods });
        }

        let mut trie = SetTrie::new();
        for (slot, cluster) in clusters.iter().enumerate() {
            let key: Vec<u32> = cluster
                .methods
                .iter()
                .map(|m| vocabulary[m])
                .collect();
            trie.insert(&key, slot);
        }

        Ok(Self {
            vocabulary,
            trie,
            clusters,
        })
    }

    /// All indexed clusters, in descriptor order
    #[must_use]
    pub fn clusters(&self) -> &[ClusterInfo] {
        &self.clusters
    }

    /// Clusters sharing at least `min_common` of `methods` with the query
    ///
    /// Unknown method names are dropped up front; `min_common == 0` returns
    /// every cluster. Results are deduplicated and ordered by cluster id.
    #[must_use]
    pub fn clusters_for(&self, methods: &[&str], min_common: usize) -> Vec<&ClusterInfo> {
        if min_common == 0 {
            let mut all: Vec<&ClusterInfo> = self.clusters.iter().collect();
            all.sort_by_key(|c| c.id);
            return all;
        }

        let mut codes: Vec<u32> = methods
            .iter()
            .filter_map(|m| self.vocabulary.get(*m).copied())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() < min_common {
            return Vec::new();
        }

        let mut slots: BTreeSet<usize> = BTreeSet::new();
        let mut combo: Vec<u32> = Vec::with_capacity(min_common);
        self.collect_combinations(&codes, min_common, 0, &mut combo, &mut slots);

        let mut hits: Vec<&ClusterInfo> = slots.into_iter().map(|s| &self.clusters[s]).collect();
        hits.sort_by_key(|c| c.id);
        hits
    }

    /// Superset-query every size-`remaining`+|combo| combination of `codes`
    fn collect_combinations(
        &self,
        codes: &[u32],
        size: usize,
        start: usize,
        combo: &mut Vec<u32>,
        slots: &mut BTreeSet<usize>,
    ) {
        if combo.len() == size {
            slots.extend(self.trie.supersets(combo).into_iter().copied());
            return;
        }
        let still_needed = size - combo.len();
        for i in start..codes.len() {
            if codes.len() - i < still_needed {
                break;
            }
            combo.push(codes[i]);
            self.collect_combinations(codes, size, i + 1, combo, slots);
            combo.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "\
# mined 2026-08
1: android.widget.BaseAdapter.notifyDataSetChanged, android.widget.ListView.getAdapter
2: android.widget.ListView.getAdapter, android.view.View.findViewById
3: android.view.View.findViewById, java.util.List.add, java.util.List.size

4: java.util.Iterator.hasNext, java.util.Iterator.next
";

    fn index() -> ClusterIndex {
        ClusterIndex::from_reader(DESCRIPTOR.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let idx = index();
        assert_eq!(idx.clusters().len(), 4);
        assert_eq!(idx.clusters()[3].id, 4);
    }

    #[test]
    fn test_two_common_methods() {
        let idx = index();
        let hits = idx.clusters_for(
            &[
                "android.widget.ListView.getAdapter",
                "android.view.View.findViewById",
                "com.example.Unknown.method",
            ],
            2,
        );
        assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_one_common_method_reaches_more_clusters() {
        let idx = index();
        let hits = idx.clusters_for(&["android.view.View.findViewById"], 1);
        assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_min_common_zero_returns_everything() {
        let idx = index();
        let hits = idx.clusters_for(&[], 0);
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn test_not_enough_known_methods() {
        let idx = index();
        assert!(idx
            .clusters_for(&["com.example.Unknown.method"], 1)
            .is_empty());
        assert!(idx
            .clusters_for(&["java.util.Iterator.hasNext"], 2)
            .is_empty());
    }

    #[test]
    fn test_results_deduplicated_across_combinations() {
        let idx = index();
        // Both 2-combinations of cluster 3's methods hit cluster 3 once
        let hits = idx.clusters_for(
            &[
                "android.view.View.findViewById",
                "java.util.List.add",
                "java.util.List.size",
            ],
            2,
        );
        assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_malformed_line_names_the_line() {
        let err = ClusterIndex::from_reader("1: a.b\nnot a record\n".as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "got: {msg}");
    }

    #[test]
    fn test_bad_id_rejected() {
        assert!(ClusterIndex::from_reader("x: a.b\n".as_bytes()).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        assert!(ClusterIndex::from_reader("1: a.b\n1: c.d\n".as_bytes()).is_err());
    }

    #[test]
    fn test_empty_method_list_rejected() {
        assert!(ClusterIndex::from_reader("1:   \n".as_bytes()).is_err());
    }
}
