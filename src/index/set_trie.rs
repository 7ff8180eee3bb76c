//! Set-trie over sorted integer sets
//!
//! A trie whose paths are strictly increasing element sequences, supporting
//! the superset query: find every stored set that contains all elements of
//! the query. Children are kept sorted, so a walk prunes the moment a child
//! label exceeds the next needed element.

/// Trie over sorted `u32` sets, each carrying values of type `V`
#[derive(Debug, Default)]
pub struct SetTrie<V> {
    root: TrieNode<V>,
    len: usize,
}

#[derive(Debug)]
struct TrieNode<V> {
    /// Sorted by label; binary-searchable
    children: Vec<(u32, TrieNode<V>)>,
    /// Values of sets ending exactly here
    values: Vec<V>,
}

impl<V> Default for TrieNode<V> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<V> SetTrie<V> {
    /// Empty trie
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
            len: 0,
        }
    }

    /// Number of inserted values
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the trie holds no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `value` under `set`
    ///
    /// The set is normalized (sorted, deduplicated) internally, so callers
    /// may pass elements in any order. The empty set is a valid key.
    pub fn insert(&mut self, set: &[u32], value: V) {
        let mut key: Vec<u32> = set.to_vec();
        key.sort_unstable();
        key.dedup();

        let mut node = &mut self.root;
        for element in key {
            let idx = match node.children.binary_search_by_key(&element, |(l, _)| *l) {
                Ok(idx) => idx,
                Err(idx) => {
                    node.children.insert(idx, (element, TrieNode::default()));
                    idx
                }
            };
            node = &mut node.children[idx].1;
        }
        node.values.push(value);
        self.len += 1;
    }

    /// Every value whose set is a superset of `query`
    ///
    /// The empty query matches every stored set. Results come out in trie
    /// order, which is deterministic for a given insertion history.
    #[must_use]
    pub fn supersets(&self, query: &[u32]) -> Vec<&V> {
        let mut needed: Vec<u32> = query.to_vec();
        needed.sort_unstable();
        needed.dedup();

        let mut out = Vec::new();
        walk(&self.root, &needed, &mut out);
        out
    }
}

fn walk<'a, V>(node: &'a TrieNode<V>, needed: &[u32], out: &mut Vec<&'a V>) {
    match needed.first() {
        None => collect_all(node, out),
        Some(&next) => {
            for (label, child) in &node.children {
                if *label < next {
                    // A smaller element may still lead to a path containing
                    // everything we need
                    walk(child, needed, out);
                } else if *label == next {
                    walk(child, &needed[1..], out);
                } else {
                    // Children are sorted; nothing further can match
                    break;
                }
            }
        }
    }
}

fn collect_all<'a, V>(node: &'a TrieNode<V>, out: &mut Vec<&'a V>) {
    out.extend(node.values.iter());
    for (_, child) in &node.children {
        collect_all(child, out);
    }
}
