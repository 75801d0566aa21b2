//! The upload state machine: `stat`, `append` and `close`.

use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::lock::{KeyGuard, KeyedGate, UploadKey};
use crate::resolver::{PathResolver, Phase, UploadRecord, finalized_path};
use crate::{CallContext, Principal, StoreError, ensure_namespace};

/// Size information for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
}

/// Resumable upload operations, scoped by the principal in the context.
///
/// All methods block on filesystem I/O.
pub trait FileStore: Send + Sync + 'static {
    /// Returns the current size of `name`; 0 if nothing was uploaded yet.
    fn stat(&self, ctx: &CallContext, name: &str) -> Result<FileInfo, StoreError>;

    /// Appends everything readable from `data` to `name`.
    ///
    /// Returns the number of bytes written. Fails with
    /// [`StoreError::Conflict`] if `name` was already closed.
    fn append(
        &self,
        ctx: &CallContext,
        name: &str,
        data: &mut dyn Read,
    ) -> Result<u64, StoreError>;

    /// Finalizes `name`. Closing an absent or already closed upload is a no-op.
    fn close(&self, ctx: &CallContext, name: &str) -> Result<(), StoreError>;
}

/// Configuration for [`LocalFileStore`].
#[derive(Debug, Clone)]
pub struct LocalFileStoreConfig {
    /// Root directory holding one namespace directory per user.
    pub path: PathBuf,
}

/// [`FileStore`] backed by the local filesystem.
pub struct LocalFileStore {
    resolver: PathResolver,
    gate: KeyedGate,
}

impl LocalFileStore {
    pub fn new(config: LocalFileStoreConfig) -> Self {
        Self {
            resolver: PathResolver::new(config.path),
            gate: KeyedGate::new(),
        }
    }

    fn lock(&self, principal: &Principal, name: &str) -> KeyGuard<'_> {
        self.gate
            .acquire(UploadKey::new(principal.username.as_str(), name))
    }

    fn resolve(&self, principal: &Principal, name: &str) -> Result<UploadRecord, StoreError> {
        self.resolver.resolve(principal, name).inspect_err(|e| {
            tracing::error!(
                username = %principal.username,
                file = name,
                error = %e,
                "failed to resolve upload"
            );
        })
    }
}

impl FileStore for LocalFileStore {
    fn stat(&self, ctx: &CallContext, name: &str) -> Result<FileInfo, StoreError> {
        let principal = ctx.principal()?;
        // Waits out an in-flight append or close, so the size is never read
        // mid-chunk or between the two probes of a rename. Request bodies are
        // idle-bounded at the HTTP layer, which bounds this wait too.
        let _guard = self.lock(principal, name);

        let record = self.resolve(principal, name)?;

        tracing::info!(
            file = name,
            size = record.size_bytes,
            phase = ?record.phase,
            "returning file info"
        );

        Ok(FileInfo {
            size: record.size_bytes,
        })
    }

    fn append(
        &self,
        ctx: &CallContext,
        name: &str,
        data: &mut dyn Read,
    ) -> Result<u64, StoreError> {
        let principal = ctx.principal()?;
        tracing::debug!(username = %principal.username, file = name, "append started");

        let _guard = self.lock(principal, name);

        let record = self.resolve(principal, name)?;

        if record.phase == Phase::Finalized {
            tracing::warn!(
                username = %principal.username,
                file = name,
                "append on closed upload"
            );
            return Err(StoreError::Conflict(format!(
                "upload already closed: {name}"
            )));
        }

        ensure_namespace(&self.resolver, principal);

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let mut out = options.open(&record.physical_path).inspect_err(|e| {
            tracing::error!(file = name, error = %e, "failed to open upload");
        })?;

        if record.phase == Phase::Absent {
            sync_parent(&record.physical_path).inspect_err(|e| {
                tracing::error!(file = name, error = %e, "failed to sync namespace");
            })?;
        }

        let written = std::io::copy(data, &mut out).inspect_err(|e| {
            tracing::error!(file = name, error = %e, "failed to write upload");
        })?;

        out.sync_all().inspect_err(|e| {
            tracing::error!(file = name, error = %e, "failed to sync upload");
        })?;

        tracing::info!(
            file = name,
            written,
            size = record.size_bytes + written,
            "appended to upload"
        );

        Ok(written)
    }

    fn close(&self, ctx: &CallContext, name: &str) -> Result<(), StoreError> {
        let principal = ctx.principal()?;
        let _guard = self.lock(principal, name);

        let record = self.resolve(principal, name)?;

        match record.phase {
            Phase::Absent => {
                tracing::warn!(file = name, "closing non-existent upload");
                Ok(())
            }
            Phase::Finalized => {
                tracing::info!(file = name, "closing already closed upload");
                Ok(())
            }
            Phase::InProgress => {
                let target = finalized_path(&record.physical_path);
                std::fs::rename(&record.physical_path, &target).inspect_err(|e| {
                    tracing::error!(file = name, error = %e, "failed to finalize upload");
                })?;
                sync_parent(&target).inspect_err(|e| {
                    tracing::error!(file = name, error = %e, "failed to sync namespace");
                })?;

                tracing::info!(file = name, size = record.size_bytes, "closed upload");
                Ok(())
            }
        }
    }
}

/// Flushes the directory entry of `path` so a create or rename survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => std::fs::File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
