//! The layer tree and its flattened-index bookkeeping.
//!
//! Grounded on the attach/detach/remove shape of `scene::scene::Scene`
//! (owned `SlotMap` of nodes, parent back-references updated on both
//! sides, recursive subtree collection before removal), generalized from
//! a 3D scene graph to the two-slots-per-group flattening this format
//! requires.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::layer::{Layer, LayerId, LayerKind};

/// Owns every [`Layer`] in a document and the root group.
pub struct DocumentTree {
    layers: SlotMap<LayerId, Layer>,
    root: LayerId,
}

impl DocumentTree {
    #[must_use]
    pub fn new() -> Self {
        let mut layers = SlotMap::with_key();
        let root = layers.insert_with_key(|id| Layer::new(id, LayerKind::Group, "root"));
        Self { layers, root }
    }

    #[must_use]
    pub fn root(&self) -> LayerId {
        self.root
    }

    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(id)
    }

    /// `size(leaf) = 1`; `size(group) = 2 + Σ size(children)`.
    #[must_use]
    pub fn size(&self, id: LayerId) -> usize {
        let Some(layer) = self.layers.get(id) else { return 0 };
        if layer.kind.is_group() {
            2 + layer.children.iter().map(|&c| self.size(c)).sum::<usize>()
        } else {
            1
        }
    }

    /// Creates a detached layer not yet attached to any parent.
    pub fn create_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> LayerId {
        self.layers.insert_with_key(|id| Layer::new(id, kind, name))
    }

    /// Flattened slot index of every layer's *opening* slot (the only
    /// slot for a non-group), computed by a fresh depth-first walk. The
    /// root itself consumes no slot; its children start at index 0.
    ///
    /// This is used only for post-apply validation — production code
    /// trusts the host-supplied `index` it was told to insert at,
    /// recomputing independently only to catch an internal bug rather
    /// than to drive normal operation.
    #[must_use]
    pub fn compute_indices(&self) -> FxHashMap<LayerId, usize> {
        let mut map = FxHashMap::default();
        let mut counter = 0usize;
        let root_children = self.layers[self.root].children.clone();
        for child in root_children {
            self.assign_indices(child, &mut counter, &mut map);
        }
        map
    }

    fn assign_indices(&self, id: LayerId, counter: &mut usize, map: &mut FxHashMap<LayerId, usize>) {
        map.insert(id, *counter);
        let layer = &self.layers[id];
        if layer.kind.is_group() {
            *counter += 1;
            let children = layer.children.clone();
            for child in children {
                self.assign_indices(child, counter, map);
            }
            *counter += 1;
        } else {
            *counter += 1;
        }
    }

    /// Detaches `id` from its current parent without deleting it, so it
    /// can be re-attached elsewhere in the same change. No-op if `id` is
    /// the root or already detached.
    pub fn detach(&mut self, id: LayerId) {
        if id == self.root {
            return;
        }
        let Some(parent) = self.layers.get(id).and_then(|l| l.parent) else { return };
        if let Some(parent_layer) = self.layers.get_mut(parent) {
            parent_layer.children.retain(|&c| c != id);
        }
        if let Some(layer) = self.layers.get_mut(id) {
            layer.parent = None;
        }
    }

    /// Inserts `new_child` (already detached) so that its *own* flattened
    /// index, once `compute_indices` is run again, equals `target`.
    ///
    /// Walks the tree from the top tracking `current_index`, advancing
    /// past each sibling's `size`; when the target falls inside a
    /// group's span, descends with `target - (current_index + 1)`; when
    /// the running index reaches `target` exactly, splices the child in
    /// at that array position.
    pub fn insert_at_index(&mut self, new_child: LayerId, target: usize) {
        self.insert_into(self.root, new_child, target);
    }

    fn insert_into(&mut self, parent: LayerId, new_child: LayerId, target: usize) {
        let children = self.layers[parent].children.clone();
        let mut current_index = 0usize;
        for (pos, &child) in children.iter().enumerate() {
            if current_index == target {
                self.splice_child(parent, new_child, pos);
                return;
            }
            let child_size = self.size(child);
            let next_index = current_index + child_size;
            if target < next_index {
                if self.layers[child].kind.is_group() {
                    self.insert_into(child, new_child, target - (current_index + 1));
                } else {
                    // A leaf has a single slot; target < next_index and
                    // target != current_index cannot happen for a leaf,
                    // but fall back to "insert before" defensively.
                    self.splice_child(parent, new_child, pos);
                }
                return;
            }
            current_index = next_index;
        }
        let end = self.layers[parent].children.len();
        self.splice_child(parent, new_child, end);
    }

    fn splice_child(&mut self, parent: LayerId, child: LayerId, pos: usize) {
        let layer = &mut self.layers[parent];
        let pos = pos.min(layer.children.len());
        layer.children.insert(pos, child);
        if let Some(child_layer) = self.layers.get_mut(child) {
            child_layer.parent = Some(parent);
        }
    }

    /// Removes `id` and its entire subtree. Returns the collected ids in
    /// depth-first order (caller uses this to clean up side tables keyed
    /// by layer id, e.g. the component registry's `by_layer` index).
    pub fn remove_subtree(&mut self, id: LayerId) -> Vec<LayerId> {
        let mut collected = Vec::new();
        self.collect_subtree(id, &mut collected);
        self.detach(id);
        for &collected_id in &collected {
            self.layers.remove(collected_id);
        }
        collected
    }

    fn collect_subtree(&self, id: LayerId, out: &mut Vec<LayerId>) {
        out.push(id);
        if let Some(layer) = self.layers.get(id) {
            for &child in &layer.children {
                self.collect_subtree(child, out);
            }
        }
    }

    /// Ancestors of `id`, nearest first, excluding the root.
    #[must_use]
    pub fn ancestors(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        let mut current = self.layers.get(id).and_then(|l| l.parent);
        while let Some(p) = current {
            if p == self.root {
                break;
            }
            out.push(p);
            current = self.layers.get(p).and_then(|l| l.parent);
        }
        out
    }

    /// Layers stacked immediately above `id` within the same parent that
    /// are clipped to it: every consecutive sibling with `clipped = true`
    /// starting right after `id`, stopping at the first sibling that
    /// isn't (which starts its own clip group, or clips to nothing).
    /// A pixel-affecting change to `id` invalidates these too, since
    /// their rendered output is composited through `id`'s own pixels.
    #[must_use]
    pub fn clipped_dependents(&self, id: LayerId) -> Vec<LayerId> {
        let Some(parent_id) = self.layers.get(id).and_then(|l| l.parent) else { return Vec::new() };
        let Some(siblings) = self.layers.get(parent_id).map(|l| l.children.as_slice()) else { return Vec::new() };
        let Some(position) = siblings.iter().position(|&s| s == id) else { return Vec::new() };

        siblings[position + 1..].iter().copied().take_while(|&sibling| self.layers.get(sibling).is_some_and(|l| l.clipped)).collect()
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut DocumentTree, name: &str) -> LayerId {
        tree.create_layer(LayerKind::Raster, name)
    }

    fn group(tree: &mut DocumentTree, name: &str) -> LayerId {
        tree.create_layer(LayerKind::Group, name)
    }

    #[test]
    fn size_formula_holds() {
        let mut tree = DocumentTree::new();
        let a = leaf(&mut tree, "A");
        let g = group(&mut tree, "G");
        let b = leaf(&mut tree, "B");
        let c = leaf(&mut tree, "C");
        tree.insert_at_index(a, 0);
        tree.insert_at_index(g, 1);
        tree.insert_at_index(b, 2);
        tree.insert_at_index(c, 3);

        assert_eq!(tree.size(a), 1);
        assert_eq!(tree.size(b), 1);
        assert_eq!(tree.size(c), 1);
        assert_eq!(tree.size(g), 4); // 2 + size(b) + size(c)
    }

    /// A layer moving out of a group and above a former sibling leaves
    /// every layer's computed index internally consistent with its
    /// actual tree position, both before and after the move.
    #[test]
    fn moving_a_layer_out_of_a_group_keeps_indices_consistent() {
        let mut tree = DocumentTree::new();
        let a = leaf(&mut tree, "A");
        let g = group(&mut tree, "G");
        let b = leaf(&mut tree, "B");
        let c = leaf(&mut tree, "C");
        tree.insert_at_index(a, 0);
        tree.insert_at_index(g, 1);
        tree.insert_at_index(b, 2);
        tree.insert_at_index(c, 3);

        let before = tree.compute_indices();
        assert_eq!(before[&a], 0);
        assert_eq!(before[&g], 1);
        assert_eq!(before[&b], 2);
        assert_eq!(before[&c], 3);

        // Move B to root, above A, at absolute index 0.
        tree.detach(b);
        tree.insert_at_index(b, 0);

        assert_eq!(tree.get(tree.root()).unwrap().children, vec![b, a, g]);
        assert_eq!(tree.get(g).unwrap().children, vec![c]);

        let after = tree.compute_indices();
        assert_eq!(after[&b], 0);
        assert_eq!(after[&a], 1);
        assert_eq!(after[&g], 2);
        assert_eq!(after[&c], 3);
        assert_eq!(tree.size(g), 3); // 2 + size(c)
    }

    #[test]
    fn remove_subtree_removes_descendants() {
        let mut tree = DocumentTree::new();
        let g = group(&mut tree, "G");
        let b = leaf(&mut tree, "B");
        let c = leaf(&mut tree, "C");
        tree.insert_at_index(g, 0);
        tree.insert_at_index(b, 1);
        tree.insert_at_index(c, 2);

        let removed = tree.remove_subtree(g);
        assert_eq!(removed.len(), 3);
        assert!(!tree.contains(g));
        assert!(!tree.contains(b));
        assert!(!tree.contains(c));
        assert!(tree.get(tree.root()).unwrap().children.is_empty());
    }

    #[test]
    fn ancestors_excludes_root() {
        let mut tree = DocumentTree::new();
        let g = group(&mut tree, "G");
        let b = leaf(&mut tree, "B");
        tree.insert_at_index(g, 0);
        tree.insert_at_index(b, 1);
        assert_eq!(tree.ancestors(b), vec![g]);
        assert_eq!(tree.ancestors(g), Vec::<LayerId>::new());
    }

    #[test]
    fn clipped_dependents_stop_at_the_first_unclipped_sibling() {
        let mut tree = DocumentTree::new();
        let base = leaf(&mut tree, "base");
        let clip_a = leaf(&mut tree, "clip-a");
        let clip_b = leaf(&mut tree, "clip-b");
        let other = leaf(&mut tree, "other");
        tree.insert_at_index(base, 0);
        tree.insert_at_index(clip_a, 1);
        tree.insert_at_index(clip_b, 2);
        tree.insert_at_index(other, 3);
        tree.get_mut(clip_a).unwrap().clipped = true;
        tree.get_mut(clip_b).unwrap().clipped = true;

        assert_eq!(tree.clipped_dependents(base), vec![clip_a, clip_b]);
        assert_eq!(tree.clipped_dependents(clip_b), Vec::<LayerId>::new());
    }
}
