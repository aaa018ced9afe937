//! Hierarchical categorical store of benchmark reports.
//!
//! Reports are filed under a [`GroupKey`], one label per axis, e.g.
//! `["reports", "new-version", "run", "2"]`. Every axis keeps the sorted set of
//! labels ever inserted at its depth, and enumeration walks the cartesian
//! product of those sets, skipping combinations that were never inserted.
//!
//! All reshaping operations return a new store and leave `self` untouched:
//!
//! ```text
//! [reports] -> [old-version] -> [run-1]
//!          \                 \-> [run-2]
//!           \-> [new-version] -> [run-1]
//!                            \-> [run-2]
//!
//! build_subtree([-, -, run-1], compress)   [old-version]
//!                                          [new-version]
//!
//! make_flat_subtree(2)                     [run-1] -> [reports/old-version]
//!                                                 \-> [reports/new-version]
//!                                          [run-2] -> ...
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;
use crate::record::ReportRecord;

/// Ordered labels, one per axis, identifying one leaf.
pub type GroupKey = Vec<String>;

/// Joins the labels of the flattened axes in [`GroupedStore::make_flat_subtree`].
pub const KEY_SEPARATOR: &str = "/";

#[derive(Debug, Clone)]
enum Node {
    Leaf(Arc<ReportRecord>),
    Branch(BTreeMap<String, Node>),
}

#[derive(Debug, Clone, Default)]
enum Layout {
    #[default]
    Empty,
    Flat(Vec<Arc<ReportRecord>>),
    Tree(BTreeMap<String, Node>),
}

impl Layout {
    fn name(&self) -> &'static str {
        match self {
            Layout::Empty => "empty",
            Layout::Flat(_) => "flat",
            Layout::Tree(_) => "tree",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupedStore {
    layout: Layout,
    axes: Vec<BTreeSet<String>>,
}

impl GroupedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `record` under `key`.
    ///
    /// An empty key appends to the flat list; any other key inserts at the
    /// nested path, creating branches as needed, and registers each label on
    /// its axis. The first call fixes the store's mode.
    ///
    /// Takes `&mut self`: label registration has a single writer.
    pub fn add(
        &mut self,
        key: GroupKey,
        record: impl Into<Arc<ReportRecord>>,
    ) -> Result<(), StoreError> {
        let record = record.into();

        if key.is_empty() {
            match self.layout {
                Layout::Tree(_) => {
                    return Err(StoreError::ModeMismatch {
                        attempted: "flat",
                        actual: self.layout.name(),
                    });
                }
                Layout::Empty => self.layout = Layout::Flat(Vec::new()),
                Layout::Flat(_) => {}
            }
            if let Layout::Flat(records) = &mut self.layout {
                records.push(record);
            }
            return Ok(());
        }

        match self.layout {
            Layout::Flat(_) => {
                return Err(StoreError::ModeMismatch {
                    attempted: "keyed",
                    actual: self.layout.name(),
                });
            }
            Layout::Empty => self.layout = Layout::Tree(BTreeMap::new()),
            Layout::Tree(_) => {}
        }

        self.register_labels(&key);
        if let Layout::Tree(root) = &mut self.layout {
            Self::insert(root, &key, record);
        }

        Ok(())
    }

    fn register_labels(&mut self, key: &[String]) {
        for (depth, label) in key.iter().enumerate() {
            if self.axes.len() <= depth {
                self.axes.push(BTreeSet::new());
            }
            if !self.axes[depth].contains(label) {
                self.axes[depth].insert(label.clone());
            }
        }
    }

    fn insert(branch: &mut BTreeMap<String, Node>, key: &[String], record: Arc<ReportRecord>) {
        let Some((head, rest)) = key.split_first() else {
            return;
        };

        if rest.is_empty() {
            if let Some(Node::Branch(_)) = branch.insert(head.clone(), Node::Leaf(record)) {
                debug!(label = %head, "Leaf replaced a branch");
            }
            return;
        }

        let child = branch
            .entry(head.clone())
            .or_insert_with(|| Node::Branch(BTreeMap::new()));
        if matches!(child, Node::Leaf(_)) {
            debug!(label = %head, "Branch replaced a leaf");
            *child = Node::Branch(BTreeMap::new());
        }
        if let Node::Branch(children) = child {
            Self::insert(children, rest, record);
        }
    }

    /// Returns the record filed under exactly `key`, or `None`.
    pub fn lookup(&self, key: &[String]) -> Option<&Arc<ReportRecord>> {
        let Layout::Tree(root) = &self.layout else {
            return None;
        };
        let (last, path) = key.split_last()?;

        let mut branch = root;
        for label in path {
            match branch.get(label)? {
                Node::Branch(children) => branch = children,
                Node::Leaf(_) => return None,
            }
        }

        match branch.get(last)? {
            Node::Leaf(record) => Some(record),
            Node::Branch(_) => None,
        }
    }

    /// Number of axes, i.e. the longest key ever inserted.
    pub fn depth(&self) -> usize {
        self.axes.len()
    }

    /// Labels registered per axis, sorted.
    pub fn axes(&self) -> &[BTreeSet<String>] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&BTreeSet<String>> {
        self.axes.get(index)
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.layout, Layout::Flat(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.layout, Layout::Empty)
    }

    /// Records of a flat store; empty for a tree store.
    pub fn flat_records(&self) -> &[Arc<ReportRecord>] {
        match &self.layout {
            Layout::Flat(records) => records,
            _ => &[],
        }
    }

    /// Number of stored leaves, counted by walking the tree.
    pub fn leaf_count(&self) -> usize {
        fn count(branch: &BTreeMap<String, Node>) -> usize {
            branch
                .values()
                .map(|node| match node {
                    Node::Leaf(_) => 1,
                    Node::Branch(children) => count(children),
                })
                .sum()
        }

        match &self.layout {
            Layout::Empty => 0,
            Layout::Flat(records) => records.len(),
            Layout::Tree(root) => count(root),
        }
    }

    /// Lazily yields every `(key, record)` pair.
    ///
    /// Walks the full cartesian product of the per-axis label sets (last axis
    /// fastest) and looks each combination up; combinations without a leaf
    /// are skipped. Cost is the size of the product, not the leaf count.
    /// A flat store yields its records with an empty key.
    pub fn iterate(&self) -> Iter<'_> {
        let inner = match &self.layout {
            Layout::Empty => IterInner::Done,
            Layout::Flat(records) => IterInner::Flat(records.iter()),
            Layout::Tree(_) => {
                let labels: Vec<Vec<&str>> = self
                    .axes
                    .iter()
                    .map(|axis| axis.iter().map(String::as_str).collect())
                    .collect();
                let cursor = if labels.iter().any(Vec::is_empty) {
                    None
                } else {
                    Some(vec![0; labels.len()])
                };
                IterInner::Product {
                    labels,
                    cursor,
                }
            }
        };

        Iter { store: self, inner }
    }

    /// Prunes the store to the leaves matching `selector`.
    ///
    /// `selector` has one entry per axis: `Some(label)` keeps only leaves with
    /// that label, `None` keeps every label. With `compress`, an axis is
    /// dropped from the resulting keys when it was constrained or has a single
    /// label in this store; wildcard axes with two or more labels stay.
    pub fn build_subtree(
        &self,
        selector: &[Option<String>],
        compress: bool,
    ) -> Result<GroupedStore, StoreError> {
        if selector.len() != self.depth() {
            return Err(StoreError::SelectorLength {
                expected: self.depth(),
                actual: selector.len(),
            });
        }

        let keep: Vec<bool> = self
            .axes
            .iter()
            .zip(selector)
            .map(|(labels, selected)| !compress || (selected.is_none() && labels.len() > 1))
            .collect();

        let mut subtree = GroupedStore::new();
        for (key, record) in self.iterate() {
            let matches = key
                .iter()
                .zip(selector)
                .all(|(label, selected)| selected.as_ref().is_none_or(|s| s == label));
            if !matches {
                continue;
            }

            let kept = key
                .into_iter()
                .zip(&keep)
                .filter_map(|(label, keep)| keep.then_some(label))
                .collect();
            subtree.add(kept, Arc::clone(record))?;
        }

        Ok(subtree)
    }

    /// Re-roots the store to depth 2, grouping by the labels of `axis`.
    ///
    /// The second level is the remaining labels, in their original order,
    /// joined with [`KEY_SEPARATOR`].
    pub fn make_flat_subtree(&self, axis: usize) -> Result<GroupedStore, StoreError> {
        if axis >= self.depth() {
            return Err(StoreError::AxisOutOfRange {
                axis,
                depth: self.depth(),
            });
        }

        let mut subtree = GroupedStore::new();
        for (mut key, record) in self.iterate() {
            let preserved = key.remove(axis);
            subtree.add(vec![preserved, key.join(KEY_SEPARATOR)], Arc::clone(record))?;
        }

        Ok(subtree)
    }

    /// Reorders every key: new axis `i` takes the label of old axis `map[i]`.
    ///
    /// `map` must be a permutation of `0..depth`.
    pub fn transpose_groups(&self, map: &[usize]) -> Result<GroupedStore, StoreError> {
        let depth = self.depth();
        let mut seen = vec![false; depth];
        let valid = map.len() == depth
            && map
                .iter()
                .all(|&axis| axis < depth && !std::mem::replace(&mut seen[axis], true));
        if !valid {
            return Err(StoreError::InvalidPermutation {
                map: map.to_vec(),
                depth,
            });
        }

        let mut transposed = GroupedStore::new();
        for (key, record) in self.iterate() {
            let key = map.iter().map(|&axis| key[axis].clone()).collect();
            transposed.add(key, Arc::clone(record))?;
        }

        Ok(transposed)
    }

    /// Wraps every leaf under a new first axis holding only `label`.
    pub fn prepend_group(&self, label: &str) -> Result<GroupedStore, StoreError> {
        let mut wrapped = GroupedStore::new();
        for (mut key, record) in self.iterate() {
            key.insert(0, label.to_string());
            wrapped.add(key, Arc::clone(record))?;
        }

        Ok(wrapped)
    }

    /// Whether `other` has the same depth and the same labels on every axis
    /// below the root, so the two can be merged into one store.
    pub fn is_compatible_with(&self, other: &GroupedStore) -> bool {
        self.depth() == other.depth() && self.axes.get(1..) == other.axes.get(1..)
    }

    /// Adds every leaf of `other` to this store.
    pub fn merge(&mut self, other: &GroupedStore) -> Result<(), StoreError> {
        for (key, record) in other.iterate() {
            self.add(key, Arc::clone(record))?;
        }
        Ok(())
    }
}

/// Iterator returned by [`GroupedStore::iterate`].
pub struct Iter<'a> {
    store: &'a GroupedStore,
    inner: IterInner<'a>,
}

enum IterInner<'a> {
    Done,
    Flat(std::slice::Iter<'a, Arc<ReportRecord>>),
    Product {
        labels: Vec<Vec<&'a str>>,
        cursor: Option<Vec<usize>>,
    },
}

impl<'a> Iterator for Iter<'a> {
    type Item = (GroupKey, &'a Arc<ReportRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        match &mut self.inner {
            IterInner::Done => None,
            IterInner::Flat(records) => records.next().map(|record| (Vec::new(), record)),
            IterInner::Product { labels, cursor } => loop {
                let position = cursor.as_mut()?;
                let key: GroupKey = position
                    .iter()
                    .zip(labels.iter())
                    .map(|(&i, axis)| axis[i].to_string())
                    .collect();

                // odometer step, last axis fastest
                let mut exhausted = true;
                for depth in (0..position.len()).rev() {
                    position[depth] += 1;
                    if position[depth] < labels[depth].len() {
                        exhausted = false;
                        break;
                    }
                    position[depth] = 0;
                }
                if exhausted {
                    *cursor = None;
                }

                if let Some(record) = store.lookup(&key) {
                    return Some((key, record));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterate_skips_missing_combinations() {
        let store = sample_store(&[&["A", "1"], &["A", "2"], &["B", "1"]]);

        let keys: Vec<GroupKey> = store.iterate().map(|(key, _)| key).collect();

        assert_eq!(store.depth(), 2);
        assert_eq!(store.axes()[0].len(), 2);
        assert_eq!(store.axes()[1].len(), 2);
        assert_eq!(keys, vec![key(&["A", "1"]), key(&["A", "2"]), key(&["B", "1"])]);
        assert!(store.lookup(&key(&["B", "2"])).is_none());
    }

    #[test]
    fn test_lookup_returns_inserted_record() {
        let mut store = GroupedStore::new();
        store
            .add(key(&["dev", "v1"]), ReportRecord::new(vec![1.0, 2.0], "x.json"))
            .unwrap();

        let found: Vec<_> = store
            .iterate()
            .filter(|(k, _)| *k == key(&["dev", "v1"]))
            .collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.timings, vec![1.0, 2.0]);
        assert_eq!(store.lookup(&key(&["dev", "v1"])).unwrap().source, "x.json");
    }

    #[test]
    fn test_lookup_missing_paths() {
        let store = sample_store(&[&["A", "1"]]);
        assert!(store.lookup(&key(&["A"])).is_none());
        assert!(store.lookup(&key(&["A", "1", "x"])).is_none());
        assert!(store.lookup(&key(&["Z", "1"])).is_none());
        assert!(store.lookup(&[]).is_none());
    }

    #[test]
    fn test_labels_are_sorted_and_unique() {
        let store = sample_store(&[&["b", "1"], &["a", "1"], &["b", "2"]]);
        let labels: Vec<&String> = store.axes()[0].iter().collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn test_flat_store() {
        let mut store = GroupedStore::new();
        store.add(vec![], ReportRecord::new(vec![1.0], "a.json")).unwrap();
        store.add(vec![], ReportRecord::new(vec![2.0], "b.json")).unwrap();

        assert!(store.is_flat());
        assert_eq!(store.depth(), 0);
        assert_eq!(store.flat_records().len(), 2);
        assert_eq!(store.iterate().count(), 2);
        assert!(store.iterate().all(|(k, _)| k.is_empty()));
    }

    #[test]
    fn test_mode_mismatch_is_rejected() {
        let mut flat = GroupedStore::new();
        flat.add(vec![], ReportRecord::default()).unwrap();
        assert_eq!(
            flat.add(key(&["a"]), ReportRecord::default()),
            Err(StoreError::ModeMismatch {
                attempted: "keyed",
                actual: "flat"
            })
        );
        assert_eq!(flat.depth(), 0);

        let mut tree = sample_store(&[&["a"]]);
        assert!(tree.add(vec![], ReportRecord::default()).is_err());
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_empty_store() {
        let store = GroupedStore::new();
        assert!(store.is_empty());
        assert_eq!(store.iterate().count(), 0);
        assert_eq!(store.leaf_count(), 0);
    }

    #[test]
    fn test_build_subtree_wildcards_without_compress_is_isomorphic() {
        let store = versions_store();
        let subtree = store.build_subtree(&[None, None, None], false).unwrap();

        assert_eq!(subtree.depth(), store.depth());
        assert_eq!(subtree.leaf_count(), store.leaf_count());
        let original: Vec<GroupKey> = store.iterate().map(|(k, _)| k).collect();
        let rebuilt: Vec<GroupKey> = subtree.iterate().map(|(k, _)| k).collect();
        assert_eq!(original, rebuilt);
    }

    #[test]
    fn test_build_subtree_compress_drops_singleton_axis() {
        let store = versions_store();
        let subtree = store.build_subtree(&[None, None, None], true).unwrap();

        assert_eq!(subtree.depth(), 2);
        assert_eq!(subtree.leaf_count(), 4);
        assert!(subtree.lookup(&key(&["old-version", "run-1"])).is_some());
    }

    #[test]
    fn test_build_subtree_constraint() {
        let store = versions_store();
        let selector = [None, None, Some("run-1".to_string())];

        let uncompressed = store.build_subtree(&selector, false).unwrap();
        assert_eq!(uncompressed.depth(), 3);
        assert_eq!(uncompressed.leaf_count(), 2);
        assert_eq!(uncompressed.axes()[2].len(), 1);

        let compressed = store.build_subtree(&selector, true).unwrap();
        assert_eq!(compressed.depth(), 1);
        let keys: Vec<GroupKey> = compressed.iterate().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(&["new-version"]), key(&["old-version"])]);
    }

    #[test]
    fn test_build_subtree_fully_constrained_becomes_flat() {
        let store = versions_store();
        let selector = [
            None,
            Some("old-version".to_string()),
            Some("run-2".to_string()),
        ];
        let subtree = store.build_subtree(&selector, true).unwrap();

        assert!(subtree.is_flat());
        assert_eq!(subtree.flat_records().len(), 1);
        assert_eq!(subtree.flat_records()[0].source, "reports/old-version/run-2");
    }

    #[test]
    fn test_build_subtree_selector_length() {
        let store = versions_store();
        assert_eq!(
            store.build_subtree(&[None], false).unwrap_err(),
            StoreError::SelectorLength {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn test_make_flat_subtree() {
        let store = versions_store();
        let flat = store.make_flat_subtree(2).unwrap();

        assert_eq!(flat.depth(), 2);
        assert_eq!(flat.leaf_count(), 4);
        let labels: Vec<&String> = flat.axes()[1].iter().collect();
        assert_eq!(labels, vec!["reports/new-version", "reports/old-version"]);
        assert!(flat.lookup(&key(&["run-2", "reports/old-version"])).is_some());
    }

    #[test]
    fn test_make_flat_subtree_depth_one_input() {
        let store = sample_store(&[&["a"], &["b"]]);
        let flat = store.make_flat_subtree(0).unwrap();
        assert_eq!(flat.depth(), 2);
        assert!(flat.lookup(&key(&["a", ""])).is_some());
    }

    #[test]
    fn test_make_flat_subtree_out_of_range() {
        let store = versions_store();
        assert!(matches!(
            store.make_flat_subtree(3),
            Err(StoreError::AxisOutOfRange { axis: 3, depth: 3 })
        ));
    }

    #[test]
    fn test_transpose_identity_and_inverse() {
        let store = versions_store();

        let identity = store.transpose_groups(&[0, 1, 2]).unwrap();
        let original: Vec<GroupKey> = store.iterate().map(|(k, _)| k).collect();
        let same: Vec<GroupKey> = identity.iterate().map(|(k, _)| k).collect();
        assert_eq!(original, same);

        let map = [2, 0, 1];
        let inverse = [1, 2, 0];
        let swapped = store.transpose_groups(&map).unwrap();
        assert!(swapped.lookup(&key(&["run-1", "reports", "new-version"])).is_some());
        let restored = swapped.transpose_groups(&inverse).unwrap();
        let round: Vec<GroupKey> = restored.iterate().map(|(k, _)| k).collect();
        assert_eq!(original, round);
    }

    #[test]
    fn test_transpose_rejects_non_bijection() {
        let store = versions_store();
        for map in [&[0, 0, 1][..], &[0, 1, 3], &[0, 1], &[0, 1, 2, 3]] {
            assert!(matches!(
                store.transpose_groups(map),
                Err(StoreError::InvalidPermutation { .. })
            ));
        }
        assert_eq!(store.depth(), 3);
    }

    #[test]
    fn test_prepend_group() {
        let store = sample_store(&[&["A", "1"], &["B", "2"]]);
        let wrapped = store.prepend_group("all").unwrap();

        assert_eq!(wrapped.depth(), 3);
        assert_eq!(wrapped.axes()[0].len(), 1);
        assert!(wrapped.lookup(&key(&["all", "B", "2"])).is_some());
        assert_eq!(store.depth(), 2);
    }

    #[test]
    fn test_prepend_group_on_flat_store() {
        let mut store = GroupedStore::new();
        store.add(vec![], ReportRecord::default()).unwrap();
        let wrapped = store.prepend_group("only").unwrap();
        assert_eq!(wrapped.depth(), 1);
        assert_eq!(wrapped.leaf_count(), 1);
    }

    #[test]
    fn test_compatibility_and_merge() {
        let mut first = sample_store(&[&["dir-a", "run", "1"], &["dir-a", "run", "2"]]);
        let second = sample_store(&[&["dir-b", "run", "1"], &["dir-b", "run", "2"]]);
        let other = sample_store(&[&["dir-c", "bench", "1"]]);

        assert!(first.is_compatible_with(&second));
        assert!(!first.is_compatible_with(&other));

        first.merge(&second).unwrap();
        assert_eq!(first.leaf_count(), 4);
        assert_eq!(first.axes()[0].len(), 2);
    }

    // Helper functions for tests
    fn key(labels: &[&str]) -> GroupKey {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn sample_store(keys: &[&[&str]]) -> GroupedStore {
        let mut store = GroupedStore::new();
        for labels in keys {
            let record = ReportRecord::new(vec![1.0], &labels.join("/"));
            store.add(key(labels), record).unwrap();
        }
        store
    }

    fn versions_store() -> GroupedStore {
        sample_store(&[
            &["reports", "old-version", "run-1"],
            &["reports", "old-version", "run-2"],
            &["reports", "new-version", "run-1"],
            &["reports", "new-version", "run-2"],
        ])
    }
}
