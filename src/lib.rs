#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Watches a host document's layer tree, parses per-layer asset
//! specifications out of layer/comp names, and keeps a folder of
//! rendered assets in sync with whatever the host reports changed.
//!
//! The pipeline is a strict pipe from host events to files on disk:
//! [`manager::AssetManager`] translates a host-reported
//! [`manager::HostChangeRecord`] into a [`document::ChangeRecord`],
//! applies it to a [`document::DocumentModel`], reconciles the
//! [`registry::ComponentRegistry`] against whatever names changed, and
//! schedules renders on a [`render::RenderOrchestrator`] whose output is
//! placed into the document's asset folder by a
//! [`dispatch::FileDispatcher`]. Anything that fails along the way is
//! recorded by an [`error_sink::ErrorSink`] instead of aborting the rest
//! of the batch.

pub mod config;
pub mod dispatch;
pub mod document;
pub mod error_sink;
pub mod errors;
pub mod manager;
pub mod parser;
pub mod registry;
pub mod render;
pub mod utils;

pub use config::Config;
pub use dispatch::FileDispatcher;
pub use document::{ChangeRecord, DocumentModel};
pub use error_sink::ErrorSink;
pub use errors::{AssetForgeError, Result};
pub use manager::{AssetManager, HostChangeRecord, ManagerState};
pub use parser::{ParseOutput, Specification};
pub use registry::{Component, ComponentRegistry};
pub use render::{HostHandle, RenderOrchestrator};
