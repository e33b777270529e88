//! Change records: the host's description of one edit to a document.
//!
//! A `ChangeRecord` batches every layer, layer-comp, and document-level
//! mutation the host observed since the previous record; `DocumentModel`
//! applies one record at a time, in the order the host emits them.

use super::layer::{LayerId, LayerKind, Rect};

/// Per-record sequencing fields. Records must be applied in strictly
/// increasing `(timestamp, count)` order; anything else is dropped
/// rather than applied out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSequence {
    pub timestamp: u64,
    pub count: u64,
}

/// A scalar property change, carrying both the previous and current
/// value so a consumer (the registry's dependency-closure diff) can
/// decide whether the change is render-affecting without re-reading the
/// whole layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange<T> {
    pub previous: T,
    pub current: T,
}

/// What changed about one layer in this record. `added` and `removed`
/// are mutually exclusive; a layer present in neither is a plain
/// in-place or positional update.
#[derive(Debug, Clone, Default)]
pub struct LayerChange {
    pub id: LayerId,
    /// New in this record; `kind`/`name` are populated, `index` is where
    /// it was inserted.
    pub added: bool,
    /// Removed from the tree in this record; every other field is
    /// irrelevant when this is set.
    pub removed: bool,
    /// Present when the layer moved (added, or moved within the tree).
    pub index: Option<usize>,
    pub kind: Option<LayerKind>,
    pub name: Option<PropertyChange<String>>,
    pub bounds: Option<PropertyChange<Rect>>,
    pub bounds_with_effects: Option<PropertyChange<Rect>>,
    pub visible: Option<PropertyChange<bool>>,
    pub clipped: Option<PropertyChange<bool>>,
    pub mask_enabled: Option<PropertyChange<bool>>,
    pub effects_enabled: Option<PropertyChange<bool>>,
    pub generator_settings: Option<serde_json::Value>,
}

impl LayerChange {
    #[must_use]
    pub fn added(id: LayerId, index: usize, kind: LayerKind, name: String) -> Self {
        Self { id, added: true, index: Some(index), kind: Some(kind), name: Some(PropertyChange { previous: String::new(), current: name }), ..Self::with_id(id) }
    }

    #[must_use]
    pub fn removed(id: LayerId) -> Self {
        Self { id, removed: true, ..Self::with_id(id) }
    }

    #[must_use]
    pub fn moved(id: LayerId, index: usize) -> Self {
        Self { id, index: Some(index), ..Self::with_id(id) }
    }

    fn with_id(id: LayerId) -> Self {
        Self { id, ..Default::default() }
    }

    /// True when this change could plausibly affect what's on screen
    /// (as opposed to a scalar update unrelated to appearance, of which
    /// there are none modeled here, but kept as a seam for future
    /// properties that don't need re-render, e.g. a layer comment).
    #[must_use]
    pub fn is_render_affecting(&self) -> bool {
        self.added
            || self.removed
            || self.index.is_some()
            || self.bounds.is_some()
            || self.bounds_with_effects.is_some()
            || self.visible.is_some()
            || self.clipped.is_some()
            || self.mask_enabled.is_some()
            || self.effects_enabled.is_some()
            || self.generator_settings.is_some()
    }
}

/// What changed about one layer comp (a named, savable visibility/
/// position snapshot of the layer tree).
#[derive(Debug, Clone)]
pub struct CompChange {
    pub id: u64,
    pub added: bool,
    pub removed: bool,
    pub name: Option<PropertyChange<String>>,
    pub selected: Option<PropertyChange<bool>>,
}

/// One batch of document mutations, as the host reports them.
///
/// Layers here are already *identified*: an `added` entry's `id` must be
/// a fresh [`LayerId`] the caller minted via `DocumentTree::create_layer`
/// (and populated with `kind`/`name`/initial properties) before building
/// this record, not yet attached anywhere. Translating a host's own
/// layer identifiers into stable [`LayerId`]s is the manager layer's
/// job, not `DocumentModel`'s; this keeps the model focused purely on
/// structural bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ChangeRecord {
    pub sequence: Option<ChangeSequence>,
    pub file_changed: bool,
    pub file_path: Option<String>,
    pub bounds: Option<Rect>,
    pub resolution_text: Option<String>,
    pub closed: bool,
    pub merged: bool,
    pub layers: Vec<LayerChange>,
    pub comps: Vec<CompChange>,
}

impl ChangeRecord {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.file_changed && !self.closed && !self.merged && self.layers.is_empty() && self.comps.is_empty()
    }
}
