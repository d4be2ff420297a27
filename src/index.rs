//! R-tree spatial index over axis-aligned bounding boxes.
//!
//! The index stores keys, not values: the controller's thread registry owns
//! every [`crate::thread::DrawingThread`] and the index only remembers each
//! thread's id alongside the box it was inserted with. Queries return keys
//! that the caller resolves against its own registry.
//!
//! Layout follows the classic R-tree: leaves hold entries, branches hold
//! child nodes, and every leaf sits at the same depth. Insertion descends by
//! least enlargement (ties by least area) and splits an overflowing node
//! along the axis with the smallest total margin, at the distribution with
//! the least overlap (ties by least area). Removal drops empty nodes on the
//! way back up and collapses a root left with a single child.

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::debug;

use crate::consts::{DEFAULT_NODE_CAPACITY, MIN_FILL_RATIO, MIN_NODE_CAPACITY};
use crate::geom::BoundingBox;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("entry {0} is not indexable: it has no location or has been deleted")]
    NotIndexable(String),
}

/// Something the index can store: a stable key plus the box to file it under.
pub trait Indexable {
    type Key: Copy + Eq + Hash + Debug;

    fn index_key(&self) -> Self::Key;

    /// Box to index under, or `None` when the item must stay out of the index.
    fn index_bounds(&self) -> Option<BoundingBox>;
}

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    bbox: BoundingBox,
}

#[derive(Debug, Clone)]
enum Children<K> {
    Leaf(Vec<Entry<K>>),
    Branch(Vec<Node<K>>),
}

#[derive(Debug, Clone)]
struct Node<K> {
    bbox: BoundingBox,
    children: Children<K>,
}

trait Bounded {
    fn bbox(&self) -> BoundingBox;
}

impl<K> Bounded for Entry<K> {
    fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

impl<K> Bounded for Node<K> {
    fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

fn enclose<T: Bounded>(items: &[T]) -> BoundingBox {
    items
        .iter()
        .fold(BoundingBox::empty(), |acc, item| acc.union(&item.bbox()))
}

impl<K> Node<K> {
    fn leaf(entries: Vec<Entry<K>>) -> Self {
        let bbox = enclose(&entries);
        Self { bbox, children: Children::Leaf(entries) }
    }

    fn branch(nodes: Vec<Node<K>>) -> Self {
        let bbox = enclose(&nodes);
        Self { bbox, children: Children::Branch(nodes) }
    }

    fn len(&self) -> usize {
        match &self.children {
            Children::Leaf(entries) => entries.len(),
            Children::Branch(nodes) => nodes.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn height(&self) -> usize {
        match &self.children {
            Children::Leaf(_) => 1,
            Children::Branch(nodes) => 1 + nodes.first().map_or(0, Node::height),
        }
    }

    fn refresh(&mut self) {
        self.bbox = match &self.children {
            Children::Leaf(entries) => enclose(entries),
            Children::Branch(nodes) => enclose(nodes),
        };
    }
}

// =============================================================================
// INDEX
// =============================================================================

/// Key-addressed R-tree.
#[derive(Debug, Clone)]
pub struct SpatialIndex<K> {
    root: Node<K>,
    entries: HashMap<K, BoundingBox>,
    max_entries: usize,
    min_entries: usize,
}

impl<K: Copy + Eq + Hash + Debug> SpatialIndex<K> {
    /// Create an empty index with the default node capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_node_capacity(DEFAULT_NODE_CAPACITY)
    }

    /// Create an empty index whose nodes hold at most `capacity` children.
    ///
    /// Capacities below [`MIN_NODE_CAPACITY`] are raised to it.
    #[must_use]
    pub fn with_node_capacity(capacity: usize) -> Self {
        let max_entries = capacity.max(MIN_NODE_CAPACITY);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let min_entries = ((max_entries as f64 * MIN_FILL_RATIO).ceil() as usize).max(2);
        Self { root: Node::leaf(Vec::new()), entries: HashMap::new(), max_entries, min_entries }
    }

    // --- Mutation ---

    /// Index `item` under its current bounds.
    ///
    /// # Errors
    ///
    /// Returns `NotIndexable` and leaves the index untouched when the item
    /// reports no bounds.
    pub fn insert<T: Indexable<Key = K>>(&mut self, item: &T) -> Result<(), IndexError> {
        let key = item.index_key();
        let Some(bbox) = item.index_bounds() else {
            return Err(IndexError::NotIndexable(format!("{key:?}")));
        };
        self.insert_entry(key, bbox)
    }

    /// Index `key` under `bbox`. A key that is already present is re-filed.
    ///
    /// # Errors
    ///
    /// Returns `NotIndexable` for an empty box.
    pub fn insert_entry(&mut self, key: K, bbox: BoundingBox) -> Result<(), IndexError> {
        if bbox.is_empty() {
            return Err(IndexError::NotIndexable(format!("{key:?}")));
        }
        if self.entries.contains_key(&key) {
            self.remove_key(&key);
        }
        self.entries.insert(key, bbox);

        let entry = Entry { key, bbox };
        if let Some(sibling) = insert_into(&mut self.root, entry, self.max_entries, self.min_entries) {
            let old_root = std::mem::replace(&mut self.root, Node::leaf(Vec::new()));
            self.root = Node::branch(vec![old_root, sibling]);
        }
        Ok(())
    }

    /// Bulk insert. Items without bounds are skipped; returns how many were indexed.
    pub fn load<'a, T>(&mut self, items: impl IntoIterator<Item = &'a T>) -> usize
    where
        T: Indexable<Key = K> + 'a,
    {
        let mut loaded = 0;
        for item in items {
            match self.insert(item) {
                Ok(()) => loaded += 1,
                Err(e) => debug!(error = %e, "skipping item during bulk load"),
            }
        }
        loaded
    }

    /// Remove `item` by key. Never fails; returns whether anything was removed.
    pub fn remove<T: Indexable<Key = K>>(&mut self, item: &T) -> bool {
        self.remove_key(&item.index_key())
    }

    /// Remove `key` if present.
    pub fn remove_key(&mut self, key: &K) -> bool {
        let Some(bbox) = self.entries.remove(key) else {
            return false;
        };
        let removed = remove_from(&mut self.root, key, &bbox);
        self.condense_root();
        removed
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.root = Node::leaf(Vec::new());
        self.entries.clear();
    }

    fn condense_root(&mut self) {
        loop {
            let collapse = match &mut self.root.children {
                Children::Branch(nodes) if nodes.len() <= 1 => Some(nodes.pop()),
                _ => None,
            };
            match collapse {
                Some(Some(only)) => self.root = only,
                Some(None) => self.root = Node::leaf(Vec::new()),
                None => break,
            }
        }
    }

    // --- Queries ---

    /// Keys of every entry whose box intersects `bbox`, in no particular order.
    #[must_use]
    pub fn search(&self, bbox: &BoundingBox) -> Vec<K> {
        let mut out = Vec::new();
        if !self.root.bbox.intersects(bbox) {
            return out;
        }
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match &node.children {
                Children::Leaf(entries) => {
                    out.extend(entries.iter().filter(|e| bbox.intersects(&e.bbox)).map(|e| e.key));
                }
                Children::Branch(nodes) => {
                    stack.extend(nodes.iter().filter(|n| bbox.intersects(&n.bbox)));
                }
            }
        }
        out
    }

    /// Whether any entry intersects `bbox`. Stops at the first hit.
    #[must_use]
    pub fn collides(&self, bbox: &BoundingBox) -> bool {
        if !self.root.bbox.intersects(bbox) {
            return false;
        }
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match &node.children {
                Children::Leaf(entries) => {
                    if entries.iter().any(|e| bbox.intersects(&e.bbox)) {
                        return true;
                    }
                }
                Children::Branch(nodes) => {
                    stack.extend(nodes.iter().filter(|n| bbox.intersects(&n.bbox)));
                }
            }
        }
        false
    }

    /// Every indexed key.
    #[must_use]
    pub fn all(&self) -> Vec<K> {
        self.entries.keys().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// The box `key` was filed under.
    #[must_use]
    pub fn bounds_of(&self, key: &K) -> Option<BoundingBox> {
        self.entries.get(key).copied()
    }

    /// Box enclosing every entry; empty when the index is empty.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.root.bbox
    }

    /// Number of node levels, 1 for a lone leaf.
    #[must_use]
    pub fn height(&self) -> usize {
        self.root.height()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy + Eq + Hash + Debug> Default for SpatialIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// INSERT
// =============================================================================

/// Insert below `node`, returning a new sibling when `node` had to split.
fn insert_into<K>(node: &mut Node<K>, entry: Entry<K>, max: usize, min: usize) -> Option<Node<K>> {
    node.bbox = node.bbox.union(&entry.bbox);
    let overflow = match &mut node.children {
        Children::Leaf(entries) => {
            entries.push(entry);
            entries.len() > max
        }
        Children::Branch(nodes) => {
            let i = choose_subtree(nodes, &entry.bbox);
            if let Some(sibling) = insert_into(&mut nodes[i], entry, max, min) {
                nodes.push(sibling);
            }
            nodes.len() > max
        }
    };
    if overflow { Some(split(node, min)) } else { None }
}

fn choose_subtree<K>(nodes: &[Node<K>], bbox: &BoundingBox) -> usize {
    let mut best = 0;
    let mut best_enlargement = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    for (i, node) in nodes.iter().enumerate() {
        let area = node.bbox.area();
        let enlargement = node.bbox.enlargement(bbox);
        if enlargement < best_enlargement || (enlargement <= best_enlargement && area < best_area) {
            best = i;
            best_enlargement = enlargement;
            best_area = area;
        }
    }
    best
}

// =============================================================================
// SPLIT
// =============================================================================

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

fn split<K>(node: &mut Node<K>, min: usize) -> Node<K> {
    let sibling = match &mut node.children {
        Children::Leaf(entries) => Node::leaf(split_items(entries, min)),
        Children::Branch(nodes) => Node::branch(split_items(nodes, min)),
    };
    node.refresh();
    sibling
}

/// Partition `items` in place, returning the half that moves to a new node.
fn split_items<T: Bounded>(items: &mut Vec<T>, min: usize) -> Vec<T> {
    let x_margin = sort_and_margin(items, min, Axis::X);
    let y_margin = sort_and_margin(items, min, Axis::Y);
    if x_margin < y_margin {
        sort_by_axis(items, Axis::X);
    }
    let at = choose_split_index(items, min);
    items.split_off(at)
}

fn sort_by_axis<T: Bounded>(items: &mut [T], axis: Axis) {
    items.sort_by(|a, b| {
        let (a, b) = (a.bbox(), b.bbox());
        match axis {
            Axis::X => a.min_x.total_cmp(&b.min_x).then(a.max_x.total_cmp(&b.max_x)),
            Axis::Y => a.min_y.total_cmp(&b.min_y).then(a.max_y.total_cmp(&b.max_y)),
        }
    });
}

/// Sort along `axis` and sum the margins of every legal distribution.
fn sort_and_margin<T: Bounded>(items: &mut [T], min: usize, axis: Axis) -> f64 {
    sort_by_axis(items, axis);
    let len = items.len();
    (min..=len - min)
        .map(|k| enclose(&items[..k]).margin() + enclose(&items[k..]).margin())
        .sum()
}

fn choose_split_index<T: Bounded>(items: &[T], min: usize) -> usize {
    let len = items.len();
    let mut best = len - min;
    let mut best_overlap = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    for k in min..=len - min {
        let left = enclose(&items[..k]);
        let right = enclose(&items[k..]);
        let overlap = left.intersection(&right).area();
        let area = left.area() + right.area();
        if overlap < best_overlap || (overlap <= best_overlap && area < best_area) {
            best = k;
            best_overlap = overlap;
            best_area = area;
        }
    }
    best
}

// =============================================================================
// REMOVE
// =============================================================================

fn remove_from<K: Eq>(node: &mut Node<K>, key: &K, bbox: &BoundingBox) -> bool {
    if !node.bbox.contains(bbox) {
        return false;
    }
    let removed = match &mut node.children {
        Children::Leaf(entries) => match entries.iter().position(|e| e.key == *key) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        },
        Children::Branch(nodes) => match nodes.iter_mut().position(|n| remove_from(n, key, bbox)) {
            Some(i) => {
                if nodes[i].is_empty() {
                    nodes.remove(i);
                }
                true
            }
            None => false,
        },
    };
    if removed {
        node.refresh();
    }
    removed
}
