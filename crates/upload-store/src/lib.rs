//! Resumable upload store.
//!
//! Tracks whether a named upload is absent, in progress or finalized for a
//! given user, appends bytes to in-progress uploads and atomically finalizes
//! them. All state lives on disk: an in-progress upload is a file carrying the
//! [`PART_SUFFIX`], a finalized upload is the same file renamed without it.

mod lock;
mod principal;
mod provisioner;
mod resolver;
mod store;
mod validation;

pub use lock::{KeyGuard, KeyedGate, UploadKey};
pub use principal::{CallContext, Principal};
pub use provisioner::ensure_namespace;
pub use resolver::{PathResolver, Phase, UploadRecord};
pub use store::{FileInfo, FileStore, LocalFileStore, LocalFileStoreConfig};
pub use validation::{MAX_NAME_LEN, validate_file_name, validate_username};

/// Suffix marking an upload that has not been closed yet.
pub const PART_SUFFIX: &str = ".part";

/// Errors produced by the upload store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no principal in call context")]
    Unauthenticated,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
