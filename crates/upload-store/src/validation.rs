use std::ffi::OsStr;
use std::path::{Component, Path};

use crate::{PART_SUFFIX, StoreError};

/// Longest name a filesystem directory entry may carry, in bytes.
const MAX_COMPONENT_LEN: usize = 255;

/// Longest accepted file name, in bytes. The in-progress artifact appends
/// [`PART_SUFFIX`], which must still fit in one directory entry.
pub const MAX_NAME_LEN: usize = MAX_COMPONENT_LEN - PART_SUFFIX.len();

/// Validates a logical file name at the request boundary.
///
/// Accepts `[A-Za-z0-9_-][A-Za-z0-9_.-]*`. Rejects:
/// - Empty names and names longer than [`MAX_NAME_LEN`]
/// - A leading `.` (hidden files, `.` and `..`)
/// - Names ending in the reserved [`PART_SUFFIX`]
pub fn validate_file_name(name: &str) -> Result<(), StoreError> {
    check_grammar(
        "file name",
        name,
        MAX_NAME_LEN,
        |c| c.is_ascii_alphanumeric() || c == '_' || c == '-',
        |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'),
    )?;

    if name.ends_with(PART_SUFFIX) {
        return Err(StoreError::Invalid(format!(
            "file name uses reserved suffix {PART_SUFFIX}: {name}"
        )));
    }

    Ok(())
}

/// Validates a username at the request boundary.
///
/// Accepts `[A-Za-z0-9_][A-Za-z0-9@_.-]*`.
pub fn validate_username(username: &str) -> Result<(), StoreError> {
    check_grammar(
        "username",
        username,
        MAX_COMPONENT_LEN,
        |c| c.is_ascii_alphanumeric() || c == '_',
        |c| c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '.' | '-'),
    )
}

fn check_grammar(
    kind: &str,
    value: &str,
    max_len: usize,
    first: impl Fn(char) -> bool,
    rest: impl Fn(char) -> bool,
) -> Result<(), StoreError> {
    let mut chars = value.chars();
    let Some(head) = chars.next() else {
        return Err(StoreError::Invalid(format!("empty {kind}")));
    };

    if value.len() > max_len {
        return Err(StoreError::Invalid(format!(
            "{kind} longer than {max_len} bytes"
        )));
    }

    if !first(head) || !chars.all(rest) {
        return Err(StoreError::Invalid(format!("malformed {kind}: {value}")));
    }

    Ok(())
}

/// Ensures `value` is exactly one normal path component, so joining it onto
/// a directory can never leave that directory.
pub(crate) fn ensure_single_component(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Invalid(format!("empty {kind}")));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == OsStr::new(value) => Ok(()),
        _ => Err(StoreError::Invalid(format!(
            "{kind} must be a single path component: {value}"
        ))),
    }
}
