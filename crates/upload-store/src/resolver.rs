use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::validation::ensure_single_component;
use crate::{PART_SUFFIX, Principal, StoreError};

/// Lifecycle phase of an upload, derived from what exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing stored yet.
    Absent,
    /// A `.part` artifact exists and accepts appends.
    InProgress,
    /// The upload was closed and is immutable.
    Finalized,
}

/// Snapshot of an upload's on-disk state.
///
/// Recomputed on every store operation; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Artifact representing the upload, or the target of the next append
    /// when the upload is [`Phase::Absent`].
    pub physical_path: PathBuf,
    pub size_bytes: u64,
    pub exists: bool,
    pub phase: Phase,
}

/// Maps `(principal, name)` to physical paths under a storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the namespace directory of `principal`.
    pub fn namespace_dir(&self, principal: &Principal) -> PathBuf {
        self.root.join(&principal.username)
    }

    /// Resolves the current state of `name` for `principal`.
    ///
    /// A finalized artifact wins over an in-progress one. A name that
    /// already ends in [`PART_SUFFIX`] denotes the in-progress artifact
    /// itself and is not suffixed again.
    pub fn resolve(&self, principal: &Principal, name: &str) -> Result<UploadRecord, StoreError> {
        ensure_single_component("username", &principal.username)?;
        ensure_single_component("file name", name)?;

        let dir = self.namespace_dir(principal);

        let finalized = dir.join(name);
        if let Some(size) = probe(&finalized)? {
            return Ok(UploadRecord {
                physical_path: finalized,
                size_bytes: size,
                exists: true,
                phase: Phase::Finalized,
            });
        }

        let part = dir.join(part_name(name));
        let record = match probe(&part)? {
            Some(size) => UploadRecord {
                physical_path: part,
                size_bytes: size,
                exists: true,
                phase: Phase::InProgress,
            },
            None => UploadRecord {
                physical_path: part,
                size_bytes: 0,
                exists: false,
                phase: Phase::Absent,
            },
        };
        Ok(record)
    }
}

/// Returns the in-progress file name for `name`.
pub(crate) fn part_name(name: &str) -> String {
    if name.ends_with(PART_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{PART_SUFFIX}")
    }
}

/// Returns the finalized path for an in-progress artifact path.
pub(crate) fn finalized_path(part: &Path) -> PathBuf {
    let name = part
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = name.strip_suffix(PART_SUFFIX).unwrap_or(&name);
    part.with_file_name(stripped)
}

/// Returns the size of the file at `path`, `None` if it does not exist.
fn probe(path: &Path) -> Result<Option<u64>, StoreError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
