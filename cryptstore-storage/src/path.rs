//! Key normalization and listing helpers shared by the backends.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeSet;

/// Validates a key and strips surrounding slashes.
///
/// Keys are relative `/`-separated paths: absolute keys, empty segments,
/// `.`/`..` segments and backslashes are rejected.
pub fn normalize_key(key: &str) -> StorageResult<String> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.starts_with('/') {
        return Err(invalid("absolute keys are not allowed"));
    }
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid("key is empty"));
    }
    if trimmed.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    for segment in trimmed.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segments are not allowed")),
            _ => {}
        }
    }
    Ok(trimmed.to_string())
}

/// Like [`normalize_key`], but an empty prefix means the root.
pub fn normalize_prefix(prefix: &str) -> StorageResult<String> {
    if prefix.trim_matches('/').is_empty() {
        return Ok(String::new());
    }
    normalize_key(prefix)
}

/// Joins a normalized prefix and a child name.
pub fn join(prefix: &str, child: &str) -> String {
    if prefix.is_empty() {
        child.to_string()
    } else {
        format!("{prefix}/{child}")
    }
}

/// Computes a listing of `prefix` from a flat set of terminal keys.
pub fn list_from_keys<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    recursive: bool,
) -> Vec<String> {
    let mut out = BTreeSet::new();
    for key in keys {
        let rest = if prefix.is_empty() {
            key
        } else {
            match key.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            }
        };
        if recursive {
            out.insert(key.to_string());
        } else {
            let child = rest.split('/').next().unwrap_or(rest);
            out.insert(join(prefix, child));
        }
    }
    out.into_iter().collect()
}

/// Turns an arbitrary lock name into a single safe file/object name.
pub fn lock_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.lock")
}
