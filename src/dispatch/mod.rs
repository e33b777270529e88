//! Per-document file placement queue.
//!
//! Grounded on `assets::io::{AssetReader, FileAssetReader}`: async
//! `tokio::fs` wrapped behind a narrow trait-free API, restructured here
//! from a read-only asset loader into a single-consumer mutation queue
//! with the two-lane (priority/normal) ordering the reconciliation loop
//! needs.

mod pathing;

pub use pathing::{compute_base_path, is_ignored_file, path_budget, MAX_PATH};

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::errors::{AssetForgeError, Result};

#[derive(Debug)]
enum NormalOp {
    MoveIntoBase { src: PathBuf, rel: String },
    MoveWithinBase { src_rel: String, dst_rel: String },
    RemoveWithin { rel: String },
    RemoveAbsolute { abs: PathBuf },
    AppendWithin { rel: String, data: Vec<u8> },
    WriteWithin { rel: String, data: Vec<u8> },
}

#[derive(Debug)]
enum PriorityOp {
    CreateBase,
    MoveBase { new_base: PathBuf },
}

type Reply = oneshot::Sender<Result<()>>;

/// Handle to a running dispatcher worker task. Cloning shares the same
/// underlying queue and base path.
#[derive(Clone)]
pub struct FileDispatcher {
    normal_tx: mpsc::UnboundedSender<(NormalOp, Reply)>,
    priority_tx: mpsc::UnboundedSender<(PriorityOp, Reply)>,
    error_tx: mpsc::UnboundedSender<AssetForgeError>,
}

impl FileDispatcher {
    /// Spawns the worker task and returns a handle to it, plus a receiver
    /// for `error` events the worker could not propagate to a caller
    /// (e.g. cleanup failures after a successful primary operation).
    #[must_use]
    pub fn spawn(base_path: PathBuf) -> (Self, mpsc::UnboundedReceiver<AssetForgeError>) {
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        let (priority_tx, priority_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let worker = Worker { base_path, normal_rx, priority_rx, error_tx: error_tx.clone() };
        tokio::spawn(worker.run());

        (Self { normal_tx, priority_tx, error_tx }, error_rx)
    }

    async fn submit_normal(&self, op: NormalOp) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.normal_tx.send((op, reply_tx)).is_err() {
            return Err(AssetForgeError::HostRpcError("file dispatcher worker has shut down".to_string()));
        }
        reply_rx.await.unwrap_or_else(|_| Err(AssetForgeError::HostRpcError("file dispatcher dropped the reply channel".to_string())))
    }

    async fn submit_priority(&self, op: PriorityOp) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.priority_tx.send((op, reply_tx)).is_err() {
            return Err(AssetForgeError::HostRpcError("file dispatcher worker has shut down".to_string()));
        }
        reply_rx.await.unwrap_or_else(|_| Err(AssetForgeError::HostRpcError("file dispatcher dropped the reply channel".to_string())))
    }

    pub async fn create_base(&self) -> Result<()> {
        self.submit_priority(PriorityOp::CreateBase).await
    }

    /// Moves the base directory to `new_base` (document rename/move).
    pub async fn move_base(&self, new_base: PathBuf) -> Result<()> {
        self.submit_priority(PriorityOp::MoveBase { new_base }).await
    }

    pub async fn move_into_base(&self, src: PathBuf, rel: impl Into<String>) -> Result<()> {
        self.submit_normal(NormalOp::MoveIntoBase { src, rel: rel.into() }).await
    }

    pub async fn move_within_base(&self, src_rel: impl Into<String>, dst_rel: impl Into<String>) -> Result<()> {
        self.submit_normal(NormalOp::MoveWithinBase { src_rel: src_rel.into(), dst_rel: dst_rel.into() }).await
    }

    pub async fn remove_within(&self, rel: impl Into<String>) -> Result<()> {
        self.submit_normal(NormalOp::RemoveWithin { rel: rel.into() }).await
    }

    pub async fn remove_absolute(&self, abs: PathBuf) -> Result<()> {
        self.submit_normal(NormalOp::RemoveAbsolute { abs }).await
    }

    pub async fn append_within(&self, rel: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.submit_normal(NormalOp::AppendWithin { rel: rel.into(), data }).await
    }

    pub async fn write_within(&self, rel: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.submit_normal(NormalOp::WriteWithin { rel: rel.into(), data }).await
    }
}

struct Worker {
    base_path: PathBuf,
    normal_rx: mpsc::UnboundedReceiver<(NormalOp, Reply)>,
    priority_rx: mpsc::UnboundedReceiver<(PriorityOp, Reply)>,
    error_tx: mpsc::UnboundedSender<AssetForgeError>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            // Drain every already-queued priority op before letting the
            // normal lane advance: a priority submission pauses the
            // normal lane and runs exclusively until none remain queued.
            while let Ok((op, reply)) = self.priority_rx.try_recv() {
                let result = self.run_priority(op).await;
                let _ = reply.send(result);
            }

            tokio::select! {
                biased;
                maybe = self.priority_rx.recv() => {
                    match maybe {
                        Some((op, reply)) => {
                            let result = self.run_priority(op).await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
                maybe = self.normal_rx.recv() => {
                    match maybe {
                        Some((op, reply)) => {
                            let result = self.run_normal(op).await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
            }
        }
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.base_path.join(rel)
    }

    async fn run_priority(&mut self, op: PriorityOp) -> Result<()> {
        match op {
            PriorityOp::CreateBase => mkdirs(&self.base_path).await,
            PriorityOp::MoveBase { new_base } => {
                let previous = std::mem::replace(&mut self.base_path, new_base.clone());
                if !tokio::fs::try_exists(&previous).await.unwrap_or(false) {
                    self.base_path = new_base;
                    return mkdirs(&self.base_path).await;
                }
                mkdirs(new_base.parent().unwrap_or(&new_base)).await?;
                let result = rename_or_copy(&previous, &new_base).await;
                if let Err(err) = &result {
                    self.error_tx.send(clone_error(err)).ok();
                }
                result
            }
        }
    }

    async fn run_normal(&mut self, op: NormalOp) -> Result<()> {
        match op {
            NormalOp::MoveIntoBase { src, rel } => {
                let target = self.abs(&rel);
                if let Some(parent) = target.parent() {
                    mkdirs(parent).await?;
                }
                rename_or_copy(&src, &target).await
            }
            NormalOp::MoveWithinBase { src_rel, dst_rel } => {
                let src = self.abs(&src_rel);
                let dst = self.abs(&dst_rel);
                if let Some(parent) = dst.parent() {
                    mkdirs(parent).await?;
                }
                let result = rename_or_copy(&src, &dst).await;
                if result.is_ok() {
                    if let Some(parent) = src.parent() {
                        pathing::remove_empty_parents(parent, &self.base_path).await.ok();
                    }
                }
                result
            }
            NormalOp::RemoveWithin { rel } => {
                let target = self.abs(&rel);
                let result = remove_file_tolerant(&target).await;
                if result.is_ok() {
                    if let Some(parent) = target.parent() {
                        pathing::remove_empty_parents(parent, &self.base_path).await.ok();
                    }
                }
                result
            }
            NormalOp::RemoveAbsolute { abs } => remove_file_tolerant(&abs).await,
            NormalOp::AppendWithin { rel, data } => {
                use tokio::io::AsyncWriteExt;
                let target = self.abs(&rel);
                if let Some(parent) = target.parent() {
                    mkdirs(parent).await?;
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&target)
                    .await
                    .map_err(|source| AssetForgeError::FileSystemError { path: target.clone(), source })?;
                file.write_all(&data).await.map_err(|source| AssetForgeError::FileSystemError { path: target, source })
            }
            NormalOp::WriteWithin { rel, data } => {
                let target = self.abs(&rel);
                if let Some(parent) = target.parent() {
                    mkdirs(parent).await?;
                }
                tokio::fs::write(&target, &data).await.map_err(|source| AssetForgeError::FileSystemError { path: target, source })
            }
        }
    }
}

async fn mkdirs(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|source| AssetForgeError::FileSystemError { path: dir.to_path_buf(), source })
}

/// `mkdirs(dirname(target)); rename(src, target); on-error copy+remove`.
async fn rename_or_copy(src: &Path, dst: &Path) -> Result<()> {
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(src, dst).await.map_err(|source| AssetForgeError::FileSystemError { path: dst.to_path_buf(), source })?;
            tokio::fs::remove_file(src).await.map_err(|source| AssetForgeError::FileSystemError { path: src.to_path_buf(), source })
        }
    }
}

async fn remove_file_tolerant(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AssetForgeError::FileSystemError { path: path.to_path_buf(), source }),
    }
}

fn clone_error(err: &AssetForgeError) -> AssetForgeError {
    match err {
        AssetForgeError::FileSystemError { path, source } => {
            AssetForgeError::FileSystemError { path: path.clone(), source: std::io::Error::new(source.kind(), source.to_string()) }
        }
        other => AssetForgeError::HostRpcError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_move_within_base_relocates_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("doc-assets");
        let (dispatcher, _errors) = FileDispatcher::spawn(base.clone());
        dispatcher.create_base().await.unwrap();
        dispatcher.write_within("logo.png", b"image-bytes".to_vec()).await.unwrap();
        assert!(tokio::fs::try_exists(base.join("logo.png")).await.unwrap());

        dispatcher.move_within_base("logo.png", "thumbs/logo.png").await.unwrap();
        assert!(!tokio::fs::try_exists(base.join("logo.png")).await.unwrap());
        assert!(tokio::fs::try_exists(base.join("thumbs/logo.png")).await.unwrap());
    }

    #[tokio::test]
    async fn remove_within_cleans_up_empty_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("doc-assets");
        let (dispatcher, _errors) = FileDispatcher::spawn(base.clone());
        dispatcher.create_base().await.unwrap();
        dispatcher.write_within("thumbs/icons/logo.png", b"x".to_vec()).await.unwrap();

        dispatcher.remove_within("thumbs/icons/logo.png").await.unwrap();

        assert!(!tokio::fs::try_exists(base.join("thumbs")).await.unwrap());
        assert!(tokio::fs::try_exists(&base).await.unwrap());
    }

    #[tokio::test]
    async fn removing_a_missing_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("doc-assets");
        let (dispatcher, _errors) = FileDispatcher::spawn(base.clone());
        dispatcher.create_base().await.unwrap();
        dispatcher.remove_within("never-existed.png").await.unwrap();
    }
}
