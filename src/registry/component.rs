//! Component value types.

use slotmap::new_key_type;

use crate::document::LayerId;
use crate::parser::Specification;

new_key_type! {
    /// Stable identity for one materialized (or about-to-be-materialized)
    /// asset binding. Monotonic per document in spirit, though backed by
    /// a `SlotMap` key rather than a counter so removed ids can never be
    /// reused.
    pub struct ComponentId;
}

/// What a component's spec came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Layer(LayerId),
    Comp(u64),
    Document,
}

/// A specification bound to a source and given a stable identity.
#[derive(Debug, Clone)]
pub struct Component {
    pub id: ComponentId,
    pub source: SourceRef,
    pub spec: Specification,
    pub asset_path: String,
    pub default: bool,
    /// Set when this component was fabricated from a basic peer plus a
    /// document-level default spec, rather than parsed directly.
    pub basic_component_id: Option<ComponentId>,
}
