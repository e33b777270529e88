//! The host boundary this crate renders through.
//!
//! Grounded on `assets::io::AssetReader`: an async trait object sitting
//! between the pipeline and an external collaborator it cannot call
//! directly, returning `anyhow::Result` because host RPC failures are
//! opaque and reported, not pattern-matched on.

use async_trait::async_trait;

use crate::document::LayerId;

use super::pixmap::PixmapSettings;

/// One resolved render result from the host.
pub enum HostRender {
    Pixmap { bytes: Vec<u8>, width: u32, height: u32 },
    Svg(String),
}

/// The operations this crate needs from the document's host application.
/// A production host implements this over whatever RPC channel it uses
/// to talk to the document process; tests implement it in-memory.
#[async_trait]
pub trait HostHandle: Send + Sync {
    /// Rasterizes `layer` per `settings`. When `settings.exact_bounds_required`
    /// is set, the host resolves mask/effect-aware bounds itself rather
    /// than trusting the approximate crop this crate would otherwise use.
    async fn get_pixmap(&self, layer: LayerId, settings: &PixmapSettings) -> anyhow::Result<HostRender>;

    /// Produces an SVG document for a vector-eligible layer (shape layers
    /// without raster-only effects).
    async fn get_svg(&self, layer: LayerId) -> anyhow::Result<String>;

    /// Current document metadata: on-disk path, name, and bounds, used to
    /// recompute the asset base path after a save-as or rename.
    async fn get_document_info(&self) -> anyhow::Result<DocumentInfo>;

    /// Reads the host-side settings blob this process configures from.
    async fn read_settings(&self) -> anyhow::Result<serde_json::Value>;

    /// Toggles a host menu item reflecting whether asset generation is
    /// currently enabled for the active document.
    async fn set_menu_checked(&self, enabled: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub path: Option<String>,
    pub name: String,
}
