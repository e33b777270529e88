//! `AssetManager`: per-document coordination.
//!
//! Grounded on `app::App`, which owns a `Scene` + `AssetServer` +
//! `Renderer` and drives them from one `update()` call; reshaped from a
//! per-frame loop into an event-driven task that reconciles one
//! host-reported change at a time instead of one rendered frame at a time.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::dispatch::{compute_base_path, path_budget, FileDispatcher};
use crate::document::{ChangeRecord, ChangeSequence, CompChange, DocumentModel, Layer, LayerChange, LayerId, LayerKind, PropertyChange, Rect};
use crate::error_sink::{ErrorKey, ErrorSink};
use crate::errors::{AssetForgeError, Result};
use crate::parser;
use crate::registry::{ComponentId, ComponentRegistry, SourceRef};
use crate::render::{HostHandle, RenderOrchestrator, RenderOutcome};

/// One entry in a host-reported layer diff, before translation into a
/// stable [`LayerId`]. `host_id` is whatever identifier the host's own
/// document model uses (a PSD layer index, a scene-graph handle, etc).
#[derive(Debug, Clone, Default)]
pub struct HostLayerChange {
    pub host_id: u64,
    pub added: bool,
    pub removed: bool,
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

/// A `ChangeRecord` in the host's own layer-identifier space. The
/// manager's job is translating this into the [`LayerId`]-addressed
/// [`ChangeRecord`] `DocumentModel` expects.
#[derive(Debug, Clone, Default)]
pub struct HostChangeRecord {
    pub sequence: Option<ChangeSequence>,
    pub file_changed: bool,
    pub file_path: Option<String>,
    pub bounds: Option<Rect>,
    pub resolution_text: Option<String>,
    pub closed: bool,
    pub merged: bool,
    pub layers: Vec<HostLayerChange>,
    pub comps: Vec<CompChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Inactive,
    Starting,
    Running,
    Stopping,
}

/// Coordinates one open document: translates host change records,
/// mutates the document tree, reconciles the component registry, and
/// schedules renders for whatever components became stale.
pub struct AssetManager {
    document_id: u64,
    host: Arc<dyn HostHandle>,
    orchestrator: RenderOrchestrator,
    config: Config,
    state: ManagerState,
    model: DocumentModel,
    registry: ComponentRegistry,
    dispatcher: Option<FileDispatcher>,
    base_path: std::path::PathBuf,
    errors: Arc<Mutex<ErrorSink>>,
    host_layer_ids: FxHashMap<u64, LayerId>,
    idle_rx: Option<mpsc::UnboundedReceiver<()>>,
}

impl AssetManager {
    #[must_use]
    pub fn new(document_id: u64, host: Arc<dyn HostHandle>, orchestrator: RenderOrchestrator, config: Config) -> Self {
        Self {
            document_id,
            host,
            orchestrator,
            config,
            state: ManagerState::Inactive,
            model: DocumentModel::new(),
            registry: ComponentRegistry::new(),
            dispatcher: None,
            base_path: std::path::PathBuf::new(),
            errors: Arc::new(Mutex::new(ErrorSink::new(Path::new("")))),
            host_layer_ids: FxHashMap::default(),
            idle_rx: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// The channel that fires once every pending and in-flight render for
    /// this document has drained. `None` until [`Self::start`] has run.
    pub fn idle_rx(&mut self) -> Option<&mut mpsc::UnboundedReceiver<()>> {
        self.idle_rx.as_mut()
    }

    /// Resets all per-document state and prepares the file dispatcher.
    /// The layer tree itself is populated by the first [`Self::change`]
    /// call the host sends afterward, the same way every later edit
    /// arrives: as a diff, here one that happens to add every layer.
    pub async fn start(&mut self) -> Result<()> {
        self.state = ManagerState::Starting;
        self.model = DocumentModel::new();
        self.registry = ComponentRegistry::new();
        self.host_layer_ids.clear();
        self.orchestrator.cancel_all(self.document_id);

        match self.host.read_settings().await {
            Ok(settings) => self.config = Config::from_json(&settings),
            Err(err) => log::warn!("failed to read host settings, keeping existing configuration: {err}"),
        }

        let info = self.host.get_document_info().await.map_err(|err| AssetForgeError::HostRpcError(err.to_string()))?;
        self.base_path = compute_base_path(info.path.as_deref().map(Path::new), &info.name);
        let (dispatcher, mut error_rx) = FileDispatcher::spawn(self.base_path.clone());
        dispatcher.create_base().await?;
        self.dispatcher = Some(dispatcher);

        *self.errors.lock().await = ErrorSink::new(&self.base_path);

        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        self.orchestrator.register_document(self.document_id, idle_tx);
        self.idle_rx = Some(idle_rx);

        let errors = Arc::clone(&self.errors);
        tokio::spawn(async move {
            while let Some(err) = error_rx.recv().await {
                log::warn!("file dispatcher reported a background error: {err}");
                let mut sink = errors.lock().await;
                let _ = sink.record(ErrorKey::Document, "dispatcher", err.to_string()).await;
            }
        });

        self.state = ManagerState::Running;
        Ok(())
    }

    /// Applies one host-reported change: translates layer ids, runs the
    /// structural update, then reconciles the component registry and
    /// schedules renders, in order: base path (file changed), comp
    /// changes, layer changes, error reporting.
    pub async fn change(&mut self, record: HostChangeRecord) -> Result<()> {
        let mut timer = crate::utils::Timer::new();

        let internal = self.translate(record);
        let Some(summary) = self.model.apply_change(internal) else {
            return Ok(());
        };

        if let Some(file) = &summary.file {
            self.handle_file_changed(file.current.as_deref()).await?;
        }

        for comp_change in &summary.comps {
            self.reconcile_comp(comp_change).await;
        }

        for layer_change in &summary.layer_changes {
            self.reconcile_layer(layer_change).await;
        }
        for removed in &summary.layers_removed {
            self.forget_layer(*removed).await;
        }

        timer.tick();
        log::debug!("reconciled change for document {} in {:.2}ms", self.document_id, timer.delta_ms());
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.state = ManagerState::Stopping;
        self.orchestrator.cancel_all(self.document_id);
        self.dispatcher = None;
        self.state = ManagerState::Inactive;
    }

    fn translate(&mut self, record: HostChangeRecord) -> ChangeRecord {
        let mut layers = Vec::with_capacity(record.layers.len());
        for host_change in record.layers {
            let id = if host_change.added {
                let kind = host_change.kind.unwrap_or(LayerKind::Raster);
                let name = host_change.name.as_ref().map(|p| p.current.clone()).unwrap_or_default();
                let id = self.model.tree_mut().create_layer(kind, name);
                self.host_layer_ids.insert(host_change.host_id, id);
                id
            } else if let Some(&id) = self.host_layer_ids.get(&host_change.host_id) {
                id
            } else {
                log::warn!("change referenced unknown host layer id {}", host_change.host_id);
                continue;
            };

            if host_change.removed {
                self.host_layer_ids.remove(&host_change.host_id);
            }

            layers.push(LayerChange {
                id,
                added: host_change.added,
                removed: host_change.removed,
                index: host_change.index,
                kind: host_change.kind,
                name: host_change.name,
                bounds: host_change.bounds,
                bounds_with_effects: host_change.bounds_with_effects,
                visible: host_change.visible,
                clipped: host_change.clipped,
                mask_enabled: host_change.mask_enabled,
                effects_enabled: host_change.effects_enabled,
                generator_settings: host_change.generator_settings,
            });
        }

        ChangeRecord {
            sequence: record.sequence,
            file_changed: record.file_changed,
            file_path: record.file_path,
            bounds: record.bounds,
            resolution_text: record.resolution_text,
            closed: record.closed,
            merged: record.merged,
            layers,
            comps: record.comps,
        }
    }

    async fn handle_file_changed(&mut self, file_path: Option<&str>) -> Result<()> {
        let info_name = file_path.and_then(|p| Path::new(p).file_name()).map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "Untitled".to_string());
        let new_base = compute_base_path(file_path.map(Path::new), &info_name);
        if new_base == self.base_path {
            return Ok(());
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.move_base(new_base.clone()).await?;
        }
        self.base_path = new_base;
        *self.errors.lock().await = ErrorSink::new(&self.base_path);
        Ok(())
    }

    async fn reconcile_comp(&mut self, change: &CompChange) {
        if change.removed {
            for component_id in self.registry.get_components_by_comp(change.id) {
                self.drop_component(component_id).await;
            }
            let _ = self.errors.lock().await.clear(ErrorKey::Comp(change.id)).await;
            return;
        }
        let Some(PropertyChange { current, .. }) = &change.name else { return };
        for component_id in self.registry.get_components_by_comp(change.id) {
            self.drop_component(component_id).await;
        }
        self.parse_and_register(SourceRef::Comp(change.id), current, current.clone(), false).await;
    }

    async fn reconcile_layer(&mut self, change: &LayerChange) {
        let Some(layer) = self.model.tree().get(change.id).cloned() else { return };

        if let Some(settings) = &change.generator_settings {
            self.handle_generator_settings(settings);
            self.regenerate_defaults().await;
        }

        if change.name.is_some() || change.added {
            // Diffed against the layer's previously-registered components
            // rather than dropped wholesale: an append to the name that
            // leaves an existing spec untouched must not cancel or
            // re-render the component that spec already owns.
            let is_defaults_candidate = self.model.tree().ancestors(change.id).is_empty();
            self.parse_and_register(SourceRef::Layer(change.id), &layer.name, layer.name.clone(), is_defaults_candidate).await;
        }

        if change.is_render_affecting() {
            for component_id in self.registry.get_components_by_layer(change.id) {
                self.schedule_render(component_id, &layer);
            }
            // A clipped layer composites through the base layer's pixels,
            // so a pixel-affecting change to the base also invalidates
            // every component clipped to it, even though their own specs
            // didn't change.
            for dependent_id in self.model.tree().clipped_dependents(change.id) {
                let Some(dependent_layer) = self.model.tree().get(dependent_id).cloned() else { continue };
                for component_id in self.registry.get_components_by_layer(dependent_id) {
                    self.schedule_render(component_id, &dependent_layer);
                }
            }
        }
    }

    /// Re-derives the document-wide, generator-metadata-sourced defaults
    /// (as opposed to the single named defaults layer) from one layer's
    /// `generator-settings` blob. A missing or unparsable entry under
    /// `config.meta-data-root` is logged and otherwise ignored, never
    /// raised as a user-visible error. The caller is responsible for
    /// following this with `regenerate_defaults` so existing basic
    /// components pick up the new set.
    fn handle_generator_settings(&mut self, value: &serde_json::Value) {
        self.registry.reset_default_meta_components();
        let Some(text) = value.get(&self.config.meta_data_root).and_then(serde_json::Value::as_str) else {
            log::debug!("generator-settings has no usable \"{}\" entry", self.config.meta_data_root);
            return;
        };
        let output = parser::parse_name(text, true);
        if output.has_errors() {
            log::debug!("ignoring invalid generator-settings defaults text {text:?}: {:?}", output.errors);
            return;
        }
        for spec in output.specs {
            if spec.default {
                self.registry.add_default_meta_component(spec);
            }
        }
    }

    async fn forget_layer(&mut self, id: LayerId) {
        for component_id in self.registry.get_components_by_layer(id) {
            self.drop_component(component_id).await;
        }
        if self.registry.is_defaults_layer(id) {
            self.registry.clear_layer_defaults();
            self.regenerate_defaults().await;
        }
    }

    async fn parse_and_register(&mut self, source: SourceRef, raw_name: &str, source_name: String, allow_defaults: bool) {
        let output = parser::parse_name(raw_name, allow_defaults);
        let key = match source {
            SourceRef::Layer(id) => ErrorKey::Layer(id),
            SourceRef::Comp(id) => ErrorKey::Comp(id),
            SourceRef::Document => ErrorKey::Document,
        };

        if let Some(err) = output.errors.first() {
            let _ = self.errors.lock().await.record(key, source_name.clone(), err.to_string()).await;
        } else {
            let _ = self.errors.lock().await.clear(key).await;
        }

        let budget = path_budget(&self.base_path);
        let mut defaults = Vec::new();
        let mut fresh_specs = Vec::new();
        for spec in output.specs {
            if spec.default {
                defaults.push(spec);
            } else if spec.is_actionable() {
                fresh_specs.push(spec);
            }
        }

        // Diff the freshly-parsed spec set against whatever's already
        // registered for this source: a spec that already has a
        // component with an identical `Specification` is left alone
        // (no cancel, no re-render); only genuinely new or genuinely
        // gone specs touch the registry or the orchestrator.
        let mut stale = self.registry.directly_specified_for_source(source);
        let registry = &self.registry;
        fresh_specs.retain(|spec| match stale.iter().position(|&id| registry.get(id).is_some_and(|c| &c.spec == spec)) {
            Some(pos) => {
                stale.remove(pos);
                false
            }
            None => true,
        });
        for component_id in stale {
            self.drop_component(component_id).await;
        }

        for spec in fresh_specs {
            match self.registry.add_component(source, spec, budget) {
                Ok(component_id) => {
                    if let Some(layer) = self.layer_for(source) {
                        self.schedule_render(component_id, &layer);
                    }
                }
                Err(err) => {
                    let _ = self.errors.lock().await.record(key, source_name.clone(), err.to_string()).await;
                }
            }
        }

        if allow_defaults && !defaults.is_empty() {
            if let SourceRef::Layer(id) = source {
                match self.registry.set_layer_defaults(id, source_name.clone(), defaults) {
                    Ok(()) => self.regenerate_defaults().await,
                    Err(err) => {
                        let _ = self.errors.lock().await.record(key, source_name, err.to_string()).await;
                    }
                }
            }
        }
    }

    fn layer_for(&self, source: SourceRef) -> Option<Layer> {
        match source {
            SourceRef::Layer(id) => self.model.tree().get(id).cloned(),
            _ => None,
        }
    }

    fn schedule_render(&self, component_id: ComponentId, layer: &Layer) {
        let Some(component) = self.registry.get(component_id) else { return };
        let Some(dispatcher) = self.dispatcher.clone() else { return };
        let resolution = self.model.resolution();
        let asset_path = component.asset_path.clone();
        let source_name = component.spec.name.clone();
        let key = match component.source {
            SourceRef::Layer(id) => ErrorKey::Layer(id),
            SourceRef::Comp(id) => ErrorKey::Comp(id),
            SourceRef::Document => ErrorKey::Document,
        };

        match self.orchestrator.render(self.document_id, component_id, layer.clone(), component.spec.clone(), resolution, self.config.clone()) {
            Ok(rx) => {
                let errors = Arc::clone(&self.errors);
                tokio::spawn(place_render_result(dispatcher, errors, key, source_name, asset_path, rx));
            }
            Err(err) => log::debug!("skipped render for component {component_id:?}: {err}"),
        }
    }

    async fn drop_component(&mut self, component_id: ComponentId) {
        self.orchestrator.cancel(component_id);
        // Asset paths must be read before removal: `remove_component` drops
        // every derived component too, so looking them up afterward would
        // find nothing left to read the path from.
        let asset_paths: Vec<String> = std::iter::once(component_id)
            .chain(self.registry.get_derived(component_id))
            .filter_map(|id| self.registry.get(id).map(|c| c.asset_path.clone()))
            .collect();
        self.registry.remove_component(component_id);
        if let Some(dispatcher) = &self.dispatcher {
            for asset_path in asset_paths {
                let _ = dispatcher.remove_within(asset_path).await;
            }
        }
    }

    /// Re-derives every basic component's default-scaled children against
    /// the registry's current default set, deletes the files of whichever
    /// children no longer apply, and schedules renders for whichever are
    /// newly added. Called whenever the active default spec set changes.
    async fn regenerate_defaults(&mut self) {
        let budget = path_budget(&self.base_path);
        let (removed_paths, added) = self.registry.regenerate_defaults(budget);

        if let Some(dispatcher) = &self.dispatcher {
            for asset_path in removed_paths {
                let _ = dispatcher.remove_within(asset_path).await;
            }
        }

        for component_id in added {
            let Some(component) = self.registry.get(component_id) else { continue };
            if let Some(layer) = self.layer_for(component.source) {
                self.schedule_render(component_id, &layer);
            }
        }
    }
}

/// Awaits one render's outcome and places the result at its asset path,
/// or records the failure. Spawned once per completed render rather than
/// polled, so placement happens as soon as the host responds.
async fn place_render_result(dispatcher: FileDispatcher, errors: Arc<Mutex<ErrorSink>>, key: ErrorKey, source_name: String, asset_path: String, rx: tokio::sync::oneshot::Receiver<RenderOutcome>) {
    match rx.await {
        Ok(RenderOutcome::Written { tmp_path }) => match dispatcher.move_into_base(tmp_path, asset_path).await {
            Ok(()) => {
                let _ = errors.lock().await.clear(key).await;
            }
            Err(err) => {
                let _ = errors.lock().await.record(key, source_name, err.to_string()).await;
            }
        },
        Ok(RenderOutcome::Cancelled) => {}
        Ok(RenderOutcome::Failed(err)) => {
            let _ = errors.lock().await.record(key, source_name, err.to_string()).await;
        }
        Err(_) => {}
    }
}
