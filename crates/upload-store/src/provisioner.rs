//! Lazy creation of per-user storage namespaces.

use std::io::ErrorKind;
use std::path::Path;

use crate::{PathResolver, Principal};

/// Creates the namespace directory of `principal` if it is missing.
///
/// Best effort: an existing directory is success and any other failure is
/// logged and swallowed. The following write reports the real error if the
/// directory truly could not be created.
pub fn ensure_namespace(resolver: &PathResolver, principal: &Principal) {
    let dir = resolver.namespace_dir(principal);
    match create_dir(&dir) {
        Ok(()) => tracing::debug!(path = %dir.display(), "namespace created"),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => tracing::warn!(
            path = %dir.display(),
            username = %principal.username,
            error = %e,
            "failed to create namespace"
        ),
    }
}

fn create_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Err(ErrorKind::AlreadyExists.into());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}
