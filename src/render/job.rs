//! Render job bookkeeping types.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::oneshot;

use crate::document::Layer;
use crate::errors::AssetForgeError;
use crate::parser::Specification;

use super::pixmap::PixmapSettings;

/// How a render job resolved.
#[derive(Debug)]
pub enum RenderOutcome {
    /// The host wrote (or returned, for SVG) renderable content; the
    /// caller is responsible for placing it via the file dispatcher.
    Written { tmp_path: std::path::PathBuf },
    Cancelled,
    Failed(AssetForgeError),
}

pub(super) struct Job {
    pub document_id: u64,
    pub layer: Layer,
    pub spec: Specification,
    pub resolution: f64,
    pub config: crate::config::Config,
    pub reply: oneshot::Sender<RenderOutcome>,
    pub cancel: Arc<AtomicBool>,
}

/// What a render invocation needs to pick a renderer and, for pixmaps,
/// the settings to pass the host.
pub(super) enum RenderPlan {
    Svg,
    Pixmap(PixmapSettings),
}

impl Job {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(std::sync::atomic::Ordering::Relaxed)
    }
}
