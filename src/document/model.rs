//! `DocumentModel`: owns the layer tree and applies host-supplied change
//! records.
//!
//! The mutation shape (detach, mutate, re-attach) is grounded on
//! `scene::scene::Scene::attach`/`remove_node`, generalized from a single
//! reparent call into the three-phase batch algorithm a change record
//! requires.

use rustc_hash::FxHashMap;

use super::change::{ChangeRecord, ChangeSequence, CompChange, LayerChange, PropertyChange};
use super::layer::{LayerEffect, LayerId, Mask, Rect};
use super::tree::DocumentTree;

const DEFAULT_PPI: f64 = 72.0;

#[derive(Debug, Clone, Default)]
pub struct LayerComp {
    pub id: u64,
    pub name: String,
    pub selected: bool,
}

/// Everything downstream consumers (the component registry, the error
/// sink) need out of one applied change, without re-reading the whole
/// tree.
#[derive(Debug, Default)]
pub struct ChangeSummary {
    pub count: u64,
    pub timestamp: u64,
    pub file: Option<PropertyChange<Option<String>>>,
    pub bounds: Option<PropertyChange<Rect>>,
    pub resolution: Option<PropertyChange<f64>>,
    pub layers_added: Vec<LayerId>,
    pub layers_removed: Vec<LayerId>,
    pub layers_moved: Vec<LayerId>,
    /// Every non-removed `LayerChange` from the source record, passed
    /// through so the registry can tell which properties actually moved
    /// without re-deriving them from tree state.
    pub layer_changes: Vec<LayerChange>,
    pub comps: Vec<CompChange>,
    pub closed: bool,
    pub merged: bool,
}

impl ChangeSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file.is_none()
            && self.bounds.is_none()
            && self.resolution.is_none()
            && self.layers_added.is_empty()
            && self.layers_removed.is_empty()
            && self.layers_moved.is_empty()
            && self.comps.is_empty()
            && !self.closed
            && !self.merged
    }
}

pub struct DocumentModel {
    tree: DocumentTree,
    count: u64,
    timestamp: u64,
    file: Option<String>,
    bounds: Rect,
    resolution: f64,
    comps: FxHashMap<u64, LayerComp>,
}

impl DocumentModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: DocumentTree::new(),
            count: 0,
            timestamp: 0,
            file: None,
            bounds: Rect::default(),
            resolution: DEFAULT_PPI,
            comps: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DocumentTree {
        &mut self.tree
    }

    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    #[must_use]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    #[must_use]
    pub fn comp(&self, id: u64) -> Option<&LayerComp> {
        self.comps.get(&id)
    }

    /// Applies one change record, or drops it with a logged warning if
    /// it arrived out of `(timestamp, count)` order. Returns `None` when
    /// the record was dropped.
    pub fn apply_change(&mut self, record: ChangeRecord) -> Option<ChangeSummary> {
        if let Some(ChangeSequence { timestamp, count }) = record.sequence {
            let in_order = timestamp > self.timestamp || (timestamp == self.timestamp && count > self.count);
            if !in_order {
                log::warn!("dropping out-of-order change (count={count}, timestamp={timestamp})");
                return None;
            }
            self.timestamp = timestamp;
            self.count = count;
        }

        let mut summary = ChangeSummary { count: self.count, timestamp: self.timestamp, closed: record.closed, merged: record.merged, ..ChangeSummary::default() };

        if record.file_changed {
            let previous = self.file.clone();
            self.file = record.file_path.clone();
            summary.file = Some(PropertyChange { previous, current: self.file.clone() });
        }
        if let Some(new_bounds) = record.bounds {
            let previous = self.bounds;
            self.bounds = new_bounds;
            summary.bounds = Some(PropertyChange { previous, current: new_bounds });
        }
        if let Some(text) = &record.resolution_text {
            let previous = self.resolution;
            let parsed = text.trim().parse::<f64>().unwrap_or_else(|_| {
                log::debug!("non-numeric resolution {text:?}, falling back to {DEFAULT_PPI} ppi");
                DEFAULT_PPI
            });
            self.resolution = parsed;
            summary.resolution = Some(PropertyChange { previous, current: parsed });
        }

        // Phase 2: detach. Moved and removed layers are spliced out of
        // their current parent before anything is re-attached, so the
        // re-attach pass always works against a tree with no dangling
        // double-parentage.
        for change in &record.layers {
            if change.removed {
                if self.tree.contains(change.id) {
                    self.tree.remove_subtree(change.id);
                }
            } else if change.index.is_some() && !change.added {
                self.tree.detach(change.id);
            }
        }

        // Phase 3: re-attach, walking added/moved layers in increasing
        // target-index order so each insertion sees a tree already
        // consistent with everything inserted before it at a lower index.
        let mut to_place: Vec<&LayerChange> = record.layers.iter().filter(|c| !c.removed && c.index.is_some()).collect();
        to_place.sort_by_key(|c| c.index.unwrap());
        for change in &to_place {
            self.tree.insert_at_index(change.id, change.index.unwrap());
        }

        // Apply scalar property updates to every non-removed layer,
        // whether or not it also moved this round.
        for change in &record.layers {
            if change.removed {
                continue;
            }
            if let Some(layer) = self.tree.get_mut(change.id) {
                if let Some(PropertyChange { current, .. }) = &change.name {
                    layer.name.clone_from(current);
                }
                if let Some(PropertyChange { current, .. }) = &change.bounds {
                    layer.bounds = *current;
                }
                if let Some(PropertyChange { current, .. }) = &change.bounds_with_effects {
                    layer.bounds_with_effects = *current;
                }
                if let Some(PropertyChange { current, .. }) = &change.visible {
                    layer.visible = *current;
                }
                if let Some(PropertyChange { current, .. }) = &change.clipped {
                    layer.clipped = *current;
                }
                if let Some(settings) = &change.generator_settings {
                    layer.generator_settings = Some(settings.clone());
                }
                if let Some(PropertyChange { current, .. }) = &change.mask_enabled {
                    match &mut layer.mask {
                        Some(mask) => mask.enabled = *current,
                        None => layer.mask = Some(Mask { bounds: layer.bounds, enabled: *current }),
                    }
                }
                if let Some(PropertyChange { current, .. }) = &change.effects_enabled {
                    if layer.layer_effects.is_empty() {
                        layer.layer_effects.push(LayerEffect { name: "effects".to_string(), enabled: *current });
                    } else {
                        for effect in &mut layer.layer_effects {
                            effect.enabled = *current;
                        }
                    }
                }
            }
        }

        // Validate: every id the change record referenced must now sit
        // at exactly the index it claimed. Losing this invariant means
        // the tree bookkeeping has a bug with no local recovery — the
        // caller must re-init from a fresh snapshot — so this panics
        // rather than returning a `Result`.
        let indices = self.tree.compute_indices();
        for change in &record.layers {
            if change.removed {
                assert!(!self.tree.contains(change.id), "layer {:?} marked removed but still present after apply_change", change.id);
                continue;
            }
            if let Some(expected) = change.index {
                let actual = indices.get(&change.id).copied();
                assert_eq!(
                    actual,
                    Some(expected),
                    "index invariant violated for layer {:?}: host claimed {expected}, tree computed {actual:?}",
                    change.id
                );
            }
        }

        for change in &record.layers {
            if change.added {
                summary.layers_added.push(change.id);
            } else if change.removed {
                summary.layers_removed.push(change.id);
            } else if change.index.is_some() {
                summary.layers_moved.push(change.id);
            }
        }
        summary.layer_changes = record.layers.iter().filter(|c| !c.removed).cloned().collect();

        for comp_change in &record.comps {
            if comp_change.removed {
                self.comps.remove(&comp_change.id);
            } else {
                let entry = self.comps.entry(comp_change.id).or_insert_with(|| LayerComp { id: comp_change.id, ..LayerComp::default() });
                if let Some(PropertyChange { current, .. }) = &comp_change.name {
                    entry.name.clone_from(current);
                }
                if let Some(PropertyChange { current, .. }) = &comp_change.selected {
                    entry.selected = *current;
                }
            }
        }
        summary.comps = record.comps.clone();

        Some(summary)
    }
}

impl Default for DocumentModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::layer::LayerKind;

    #[test]
    fn empty_change_is_a_no_op_with_empty_summary() {
        let mut model = DocumentModel::new();
        let summary = model.apply_change(ChangeRecord::default()).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn out_of_order_change_is_dropped() {
        let mut model = DocumentModel::new();
        model.apply_change(ChangeRecord { sequence: Some(ChangeSequence { timestamp: 10, count: 5 }), ..ChangeRecord::default() }).unwrap();
        let dropped = model.apply_change(ChangeRecord { sequence: Some(ChangeSequence { timestamp: 10, count: 4 }), ..ChangeRecord::default() });
        assert!(dropped.is_none());
    }

    #[test]
    fn added_layer_lands_at_its_target_index() {
        let mut model = DocumentModel::new();
        let id = model.tree_mut().create_layer(LayerKind::Raster, "logo.png");
        let record = ChangeRecord { layers: vec![LayerChange::added(id, 0, LayerKind::Raster, "logo.png".to_string())], ..ChangeRecord::default() };
        let summary = model.apply_change(record).unwrap();
        assert_eq!(summary.layers_added, vec![id]);
        assert_eq!(model.tree().compute_indices()[&id], 0);
    }

    #[test]
    fn moving_a_layer_out_of_a_group_updates_indices_and_validates() {
        let mut model = DocumentModel::new();
        let a = model.tree_mut().create_layer(LayerKind::Raster, "A");
        let g = model.tree_mut().create_layer(LayerKind::Group, "G");
        let b = model.tree_mut().create_layer(LayerKind::Raster, "B");
        let c = model.tree_mut().create_layer(LayerKind::Raster, "C");
        model.apply_change(ChangeRecord {
            layers: vec![
                LayerChange::added(a, 0, LayerKind::Raster, "A".into()),
                LayerChange::added(g, 1, LayerKind::Group, "G".into()),
                LayerChange::added(b, 2, LayerKind::Raster, "B".into()),
                LayerChange::added(c, 3, LayerKind::Raster, "C".into()),
            ],
            ..ChangeRecord::default()
        })
        .unwrap();

        let summary = model.apply_change(ChangeRecord { layers: vec![LayerChange::moved(b, 0)], ..ChangeRecord::default() }).unwrap();
        assert_eq!(summary.layers_moved, vec![b]);
        assert_eq!(model.tree().get(model.tree().root()).unwrap().children(), &[b, a, g]);
        assert_eq!(model.tree().get(g).unwrap().children(), &[c]);
    }

    #[test]
    fn removed_layer_leaves_the_tree() {
        let mut model = DocumentModel::new();
        let a = model.tree_mut().create_layer(LayerKind::Raster, "A");
        model.apply_change(ChangeRecord { layers: vec![LayerChange::added(a, 0, LayerKind::Raster, "A".into())], ..ChangeRecord::default() }).unwrap();
        let summary = model.apply_change(ChangeRecord { layers: vec![LayerChange::removed(a)], ..ChangeRecord::default() }).unwrap();
        assert_eq!(summary.layers_removed, vec![a]);
        assert!(!model.tree().contains(a));
    }

    #[test]
    fn scalar_property_change_records_previous_and_current() {
        let mut model = DocumentModel::new();
        let summary = model
            .apply_change(ChangeRecord { file_changed: true, file_path: Some("doc.psd".to_string()), ..ChangeRecord::default() })
            .unwrap();
        let file = summary.file.unwrap();
        assert_eq!(file.previous, None);
        assert_eq!(file.current.as_deref(), Some("doc.psd"));
    }

    #[test]
    fn mask_and_effects_flags_are_applied_to_the_layer() {
        let mut model = DocumentModel::new();
        let id = model.tree_mut().create_layer(LayerKind::Raster, "logo.png");
        model.apply_change(ChangeRecord { layers: vec![LayerChange::added(id, 0, LayerKind::Raster, "logo.png".to_string())], ..ChangeRecord::default() }).unwrap();

        let mut change = LayerChange::moved(id, 0);
        change.mask_enabled = Some(PropertyChange { previous: false, current: true });
        change.effects_enabled = Some(PropertyChange { previous: false, current: true });
        model.apply_change(ChangeRecord { layers: vec![change], ..ChangeRecord::default() }).unwrap();

        let layer = model.tree().get(id).unwrap();
        assert!(layer.has_enabled_mask());
        assert!(layer.has_enabled_effects());

        let mut disable = LayerChange::moved(id, 0);
        disable.mask_enabled = Some(PropertyChange { previous: true, current: false });
        disable.effects_enabled = Some(PropertyChange { previous: true, current: false });
        model.apply_change(ChangeRecord { layers: vec![disable], ..ChangeRecord::default() }).unwrap();

        let layer = model.tree().get(id).unwrap();
        assert!(!layer.has_enabled_mask());
        assert!(!layer.has_enabled_effects());
    }

    #[test]
    fn non_numeric_resolution_falls_back_to_72_ppi() {
        let mut model = DocumentModel::new();
        let summary = model.apply_change(ChangeRecord { resolution_text: Some("not-a-number".to_string()), ..ChangeRecord::default() }).unwrap();
        assert_eq!(summary.resolution.unwrap().current, 72.0);
        assert_eq!(model.resolution(), 72.0);
    }
}
