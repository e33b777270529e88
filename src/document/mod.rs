//! The layer tree and the algorithm that mutates it in response to
//! host-reported changes.

mod change;
mod layer;
mod model;
mod tree;

pub use change::{ChangeRecord, ChangeSequence, CompChange, LayerChange, PropertyChange};
pub use layer::{Layer, LayerEffect, LayerId, LayerKind, Mask, Rect};
pub use model::{ChangeSummary, DocumentModel, LayerComp};
pub use tree::DocumentTree;
