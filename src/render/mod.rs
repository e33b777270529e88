//! Bounded-concurrency render scheduling.
//!
//! No teacher precedent for a job queue exists in this codebase; the
//! fan-out shape borrows the spawn-then-rejoin pattern of
//! `scene::scene::Scene` mutation, gated by a `tokio::sync::Semaphore`
//! instead of a frame loop, and restructured to be keyed by
//! [`ComponentId`] so a render already in flight or already queued for
//! the same component is recognized rather than duplicated.

mod host;
mod job;
mod pixmap;

pub use host::{DocumentInfo, HostHandle, HostRender};
pub use job::RenderOutcome;
pub use pixmap::{compute_pixmap_settings, PixmapSettings};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::config::Config;
use crate::document::Layer;
use crate::errors::{AssetForgeError, Result};
use crate::parser::Specification;
use crate::registry::ComponentId;

use job::{Job, RenderPlan};

const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Default)]
struct State {
    pending: FxHashMap<ComponentId, Job>,
    working: FxHashSet<ComponentId>,
    cancel_flags: FxHashMap<ComponentId, Arc<std::sync::atomic::AtomicBool>>,
    by_document: FxHashMap<u64, FxHashSet<ComponentId>>,
    idle_tx: FxHashMap<u64, mpsc::UnboundedSender<()>>,
    debounce_active: bool,
}

/// Schedules renders across every open document, capping the number
/// running at once to the host machine's available parallelism and
/// coalescing bursts of changes behind a short debounce window before
/// draining the queue.
#[derive(Clone)]
pub struct RenderOrchestrator {
    semaphore: Arc<Semaphore>,
    host: Arc<dyn HostHandle>,
    state: Arc<Mutex<State>>,
}

impl RenderOrchestrator {
    #[must_use]
    pub fn new(host: Arc<dyn HostHandle>) -> Self {
        let workers = std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1);
        Self { semaphore: Arc::new(Semaphore::new(workers)), host, state: Arc::new(Mutex::new(State::default())) }
    }

    /// Registers the channel this orchestrator notifies when `document_id`
    /// has no pending or in-flight renders left. Call once per document
    /// before its first [`Self::render`].
    pub fn register_document(&self, document_id: u64, idle_tx: mpsc::UnboundedSender<()>) {
        self.state.lock().idle_tx.insert(document_id, idle_tx);
    }

    /// Enqueues a render for `component_id`. Errors if that component
    /// already has a pending or in-flight render; the caller is expected
    /// to have cancelled the old one first if a fresher spec supersedes it.
    pub fn render(&self, document_id: u64, component_id: ComponentId, layer: Layer, spec: Specification, resolution: f64, config: Config) -> Result<oneshot::Receiver<RenderOutcome>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.pending.contains_key(&component_id) || state.working.contains(&component_id) {
                return Err(AssetForgeError::DuplicateRender(component_id));
            }
            let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
            state.pending.insert(component_id, Job { document_id, layer, spec, resolution, config, reply: tx, cancel });
            state.by_document.entry(document_id).or_default().insert(component_id);
        }
        self.kick_debounce();
        Ok(rx)
    }

    /// Cancels a pending or in-flight render. A pending render is dropped
    /// immediately with [`RenderOutcome::Cancelled`]; an in-flight one is
    /// flagged and resolves as cancelled once the host RPC returns.
    pub fn cancel(&self, component_id: ComponentId) {
        let mut state = self.state.lock();
        if let Some(job) = state.pending.remove(&component_id) {
            let document_id = job.document_id;
            let _ = job.reply.send(RenderOutcome::Cancelled);
            if let Some(set) = state.by_document.get_mut(&document_id) {
                set.remove(&component_id);
            }
            Self::emit_idle_locked(&mut state, document_id);
            return;
        }
        if let Some(flag) = state.cancel_flags.get(&component_id) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Cancels every pending or in-flight render belonging to `document_id`.
    pub fn cancel_all(&self, document_id: u64) {
        let ids: Vec<ComponentId> = self.state.lock().by_document.get(&document_id).map(|s| s.iter().copied().collect()).unwrap_or_default();
        for id in ids {
            self.cancel(id);
        }
    }

    #[must_use]
    pub fn has_outstanding_work(&self, document_id: u64) -> bool {
        self.state.lock().by_document.get(&document_id).is_some_and(|s| !s.is_empty())
    }

    fn kick_debounce(&self) {
        let mut state = self.state.lock();
        if state.debounce_active {
            return;
        }
        state.debounce_active = true;
        drop(state);

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            this.state.lock().debounce_active = false;
            this.drain();
        });
    }

    /// Pulls as many pending jobs as there are free semaphore permits and
    /// spawns each on its own task. Called again by every finishing job
    /// so a permit freed by one render immediately picks up the next.
    fn drain(&self) {
        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else { return };
            let next = {
                let mut state = self.state.lock();
                let Some(&id) = state.pending.keys().next() else { return };
                let job = state.pending.remove(&id).unwrap();
                state.working.insert(id);
                state.cancel_flags.insert(id, Arc::clone(&job.cancel));
                (id, job)
            };
            let this = self.clone();
            tokio::spawn(async move {
                let (component_id, job) = next;
                let document_id = job.document_id;
                let outcome = this.run_job(component_id, &job).await;
                {
                    let mut state = this.state.lock();
                    state.working.remove(&component_id);
                    state.cancel_flags.remove(&component_id);
                    if let Some(set) = state.by_document.get_mut(&document_id) {
                        set.remove(&component_id);
                    }
                    Self::emit_idle_locked(&mut state, document_id);
                }
                let _ = job.reply.send(outcome);
                drop(permit);
                this.drain();
            });
        }
    }

    fn emit_idle_locked(state: &mut State, document_id: u64) {
        let outstanding = state.by_document.get(&document_id).is_some_and(|s| !s.is_empty());
        if !outstanding {
            if let Some(tx) = state.idle_tx.get(&document_id) {
                let _ = tx.send(());
            }
        }
    }

    async fn run_job(&self, component_id: ComponentId, job: &Job) -> RenderOutcome {
        let plan = match plan_for(&job.layer, &job.spec, job.resolution, &job.config) {
            Some(plan) => plan,
            None => return RenderOutcome::Failed(AssetForgeError::DegenerateBounds(component_id)),
        };

        let result = match plan {
            RenderPlan::Svg => self.host.get_svg(job.layer.id).await.map(HostRender::Svg),
            RenderPlan::Pixmap(settings) => self.host.get_pixmap(job.layer.id, &settings).await,
        };

        if job.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        match result {
            Ok(HostRender::Svg(text)) => match write_temp(job.spec.extension.as_deref().unwrap_or("svg"), text.as_bytes()).await {
                Ok(tmp_path) => RenderOutcome::Written { tmp_path },
                Err(err) => RenderOutcome::Failed(err),
            },
            Ok(HostRender::Pixmap { bytes, .. }) => {
                match write_temp(job.spec.extension.as_deref().unwrap_or("png"), &bytes).await {
                    Ok(tmp_path) => RenderOutcome::Written { tmp_path },
                    Err(err) => RenderOutcome::Failed(err),
                }
            }
            Err(err) => RenderOutcome::Failed(AssetForgeError::HostRpcError(err.to_string())),
        }
    }
}

fn plan_for(layer: &Layer, spec: &Specification, resolution: f64, config: &Config) -> Option<RenderPlan> {
    if spec.extension.as_deref() == Some("svg") {
        return Some(RenderPlan::Svg);
    }
    compute_pixmap_settings(layer, spec, resolution, config).map(RenderPlan::Pixmap)
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn write_temp(extension: &str, bytes: &[u8]) -> Result<std::path::PathBuf> {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("assetforge-render-{n}.{extension}"));
    tokio::fs::write(&path, bytes).await.map_err(|source| AssetForgeError::FileSystemError { path: path.clone(), source })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{LayerId, LayerKind, Rect};
    use slotmap::SlotMap;

    struct FakeHost;

    #[async_trait::async_trait]
    impl HostHandle for FakeHost {
        async fn get_pixmap(&self, _layer: LayerId, _settings: &PixmapSettings) -> anyhow::Result<HostRender> {
            Ok(HostRender::Pixmap { bytes: vec![1, 2, 3], width: 10, height: 10 })
        }
        async fn get_svg(&self, _layer: LayerId) -> anyhow::Result<String> {
            Ok("<svg/>".to_string())
        }
        async fn get_document_info(&self) -> anyhow::Result<DocumentInfo> {
            Ok(DocumentInfo::default())
        }
        async fn read_settings(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn set_menu_checked(&self, _enabled: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn layer_with_bounds(bounds: Rect) -> Layer {
        let mut map: SlotMap<LayerId, ()> = SlotMap::with_key();
        let id = map.insert(());
        let mut layer = Layer::new(id, LayerKind::Raster, "logo");
        layer.bounds = bounds;
        layer
    }

    fn full_bounds() -> Rect {
        Rect { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_render_eventually_produces_a_written_outcome() {
        let orchestrator = RenderOrchestrator::new(Arc::new(FakeHost));
        let layer = layer_with_bounds(full_bounds());
        let spec = Specification { file: Some("logo.png".into()), extension: Some("png".into()), ..Default::default() };
        let mut registry: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let component_id = registry.insert(());

        let rx = orchestrator.render(1, component_id, layer, spec, 72.0, Config::default()).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert!(matches!(outcome, RenderOutcome::Written { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_pending_render_is_rejected() {
        let orchestrator = RenderOrchestrator::new(Arc::new(FakeHost));
        let layer = layer_with_bounds(full_bounds());
        let spec = Specification { file: Some("logo.png".into()), extension: Some("png".into()), ..Default::default() };
        let mut registry: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let component_id = registry.insert(());

        let _rx = orchestrator.render(1, component_id, layer.clone(), spec.clone(), 72.0, Config::default()).unwrap();
        let err = orchestrator.render(1, component_id, layer, spec, 72.0, Config::default()).unwrap_err();
        assert!(matches!(err, AssetForgeError::DuplicateRender(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelling_a_pending_render_resolves_it_as_cancelled() {
        let orchestrator = RenderOrchestrator::new(Arc::new(FakeHost));
        let layer = layer_with_bounds(full_bounds());
        let spec = Specification { file: Some("logo.png".into()), extension: Some("png".into()), ..Default::default() };
        let mut registry: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let component_id = registry.insert(());

        let rx = orchestrator.render(1, component_id, layer, spec, 72.0, Config::default()).unwrap();
        orchestrator.cancel(component_id);
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, RenderOutcome::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_fires_once_all_work_for_a_document_drains() {
        let orchestrator = RenderOrchestrator::new(Arc::new(FakeHost));
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
        orchestrator.register_document(1, idle_tx);

        let layer = layer_with_bounds(full_bounds());
        let spec = Specification { file: Some("logo.png".into()), extension: Some("png".into()), ..Default::default() };
        let mut registry: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let component_id = registry.insert(());
        let rx = orchestrator.render(1, component_id, layer, spec, 72.0, Config::default()).unwrap();
        rx.await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), idle_rx.recv()).await.unwrap().unwrap();
    }
}
