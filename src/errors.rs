//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! The main error type [`AssetForgeError`] covers every failure mode named
//! in the error taxonomy: parse failures, duplicate or over-long asset
//! paths, degenerate render bounds, host RPC and filesystem failures, and
//! defaults misuse.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, AssetForgeError>`.
//!
//! Two failure modes are deliberately *not* variants here. A validation
//! assertion failing after a structural tree change is a fatal bug (the
//! index invariant is lost) and is recovered only by a full re-init from a
//! fresh document snapshot, never by matching on a `Result`. That path
//! panics instead of returning an error; see `document::model::DocumentModel::apply_change`.
//! And malformed generator-settings metadata is logged at debug level and
//! ignored rather than surfaced as a user error; see
//! `manager::AssetManager::handle_generator_settings`.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for the asset pipeline.
#[derive(Error, Debug)]
pub enum AssetForgeError {
    // ========================================================================
    // Name-parsing errors
    // ========================================================================
    /// A name segment failed to parse; other segments in the same name may
    /// still have succeeded.
    #[error("could not parse \"{segment}\": {reason}")]
    ParseError { segment: String, reason: String },

    /// A layer produced a defaults spec while not being the single
    /// top-level document-defaults source.
    #[error("Default spec in layer comp names are unsupported.")]
    DefaultsInLayerComp,

    /// A filename segment begins with whitespace.
    #[error("Filename begins with whitespace")]
    FilenameBeginsWithWhitespace,

    /// A second defaults-bearing layer was discovered in the document.
    #[error("only one defaults layer is supported per document; found a second: \"{name}\"")]
    MultipleDefaultsLayers { name: String },

    // ========================================================================
    // Component / registry errors
    // ========================================================================
    /// A second component with the same asset path was added under one source.
    #[error("Component already exists for layer/comp with asset path \"{0}\"")]
    DuplicateSpecification(String),

    /// `base-path + asset-path` would meet or exceed `MAX_PATH`.
    #[error("Asset path is too long: {0}")]
    PathTooLong(String),

    // ========================================================================
    // Render errors
    // ========================================================================
    /// The computed render rectangle (input or output) is degenerate.
    #[error("refusing to render degenerate bounds for component {0:?}")]
    DegenerateBounds(crate::registry::ComponentId),

    /// The render job for this component was already pending.
    #[error("component {0:?} already has a pending render")]
    DuplicateRender(crate::registry::ComponentId),

    /// The host RPC used to produce a rendering failed.
    #[error("host render RPC failed: {0}")]
    HostRpcError(String),

    // ========================================================================
    // I/O errors
    // ========================================================================
    /// Filesystem operation failed.
    #[error("filesystem error at {path}: {source}")]
    FileSystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bare I/O error without a known path (e.g. `HOME` resolution).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ========================================================================
    // Document-model errors
    // ========================================================================
    /// A change record arrived out of `(timestamp, count)` order and was dropped.
    #[error("dropped out-of-order change (count={count}, timestamp={timestamp})")]
    OutOfOrderChange { count: u64, timestamp: u64 },

    /// Referenced a layer id that does not exist in the tree.
    #[error("unknown layer id {0}")]
    UnknownLayer(u64),
}

/// Alias for `Result<T, AssetForgeError>`.
pub type Result<T> = std::result::Result<T, AssetForgeError>;
