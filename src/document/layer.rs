//! Layer node types.
//!
//! Mirrors the hot/cold field split the engine uses for scene nodes
//! (`scene::node::Node`): a small common block every layer carries,
//! plus a kind-specific payload that dispatches on the tag.

use slotmap::new_key_type;

new_key_type! {
    /// Stable per-document layer identity. Unlike the flattened slot
    /// index, a `LayerId` never changes across the life of a layer even
    /// as siblings are added, removed, or reordered.
    pub struct LayerId;
}

/// A rectangle in document space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// A rectangle is degenerate when it has non-positive width or
    /// height; rendering such bounds is refused upstream.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
        }
    }
}

/// A layer mask.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mask {
    pub bounds: Rect,
    pub enabled: bool,
}

/// One named layer effect (shadow, frame, pattern fill, ...); only the
/// `enabled` flag is load-bearing for render invalidation, so
/// effect-specific payloads are opaque here.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEffect {
    pub name: String,
    pub enabled: bool,
}

/// Document-tree node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Group,
    Raster,
    Background,
    Shape,
    Text,
    Adjustment,
    SmartObject,
}

impl LayerKind {
    #[must_use]
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group)
    }
}

/// A node in the document tree.
///
/// # Hierarchy
///
/// `parent` is a non-owning back-reference kept in sync by
/// [`super::tree`]; layers are owned by their parent group's `children`
/// vector, never by the child, which avoids an ownership cycle between a
/// layer and its parent group.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    pub name: String,
    pub bounds: Rect,
    pub bounds_with_effects: Rect,
    pub visible: bool,
    pub clipped: bool,
    pub mask: Option<Mask>,
    pub layer_effects: Vec<LayerEffect>,
    pub generator_settings: Option<serde_json::Value>,

    pub(crate) parent: Option<LayerId>,
    pub(crate) children: Vec<LayerId>,
}

impl Layer {
    #[must_use]
    pub fn new(id: LayerId, kind: LayerKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            bounds: Rect::default(),
            bounds_with_effects: Rect::default(),
            visible: true,
            clipped: false,
            mask: None,
            layer_effects: Vec::new(),
            generator_settings: None,
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    /// `size(leaf) = 1`; the caller adds the children's sizes and the
    /// closing slot for groups.
    #[must_use]
    pub fn own_slot_count(&self) -> usize {
        if self.kind.is_group() { 2 } else { 1 }
    }

    #[must_use]
    pub fn has_enabled_mask(&self) -> bool {
        self.mask.is_some_and(|m| m.enabled)
    }

    #[must_use]
    pub fn has_enabled_effects(&self) -> bool {
        self.layer_effects.iter().any(|e| e.enabled)
    }
}
