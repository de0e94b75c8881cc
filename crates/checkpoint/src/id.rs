//! Checkpoint identifiers

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque token locating a checkpoint
///
/// Each backend decides for itself whether it can serve an identifier.
/// A typed [`CheckpointId::Path`] is an explicit request for filesystem
/// storage; a [`CheckpointId::Raw`] string may hold a path or a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckpointId {
    Path(PathBuf),
    Raw(String),
}

impl CheckpointId {
    /// Identifier text, lossily converted for non UTF-8 paths
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            CheckpointId::Path(path) => path.to_string_lossy(),
            CheckpointId::Raw(raw) => Cow::Borrowed(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CheckpointId::Path(path) => path.as_os_str().is_empty(),
            CheckpointId::Raw(raw) => raw.is_empty(),
        }
    }

    /// URL scheme of a raw identifier (`"s3"` for `s3://bucket/key`)
    ///
    /// Returns `None` for typed paths and for strings without a
    /// syntactically valid `scheme://` prefix.
    pub fn scheme(&self) -> Option<&str> {
        let CheckpointId::Raw(raw) = self else {
            return None;
        };
        let (scheme, _) = raw.split_once("://")?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        let valid = first.is_ascii_alphabetic()
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    /// Remainder of a raw identifier after `scheme://`
    pub fn without_scheme(&self) -> Option<&str> {
        let scheme = self.scheme()?;
        match self {
            CheckpointId::Raw(raw) => Some(&raw[scheme.len() + 3..]),
            CheckpointId::Path(_) => None,
        }
    }

    /// Interpret the identifier as a filesystem path
    pub fn to_path(&self) -> PathBuf {
        match self {
            CheckpointId::Path(path) => path.clone(),
            CheckpointId::Raw(raw) => PathBuf::from(raw),
        }
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for CheckpointId {
    fn from(raw: &str) -> Self {
        CheckpointId::Raw(raw.to_string())
    }
}

impl From<String> for CheckpointId {
    fn from(raw: String) -> Self {
        CheckpointId::Raw(raw)
    }
}

impl From<PathBuf> for CheckpointId {
    fn from(path: PathBuf) -> Self {
        CheckpointId::Path(path)
    }
}

impl From<&Path> for CheckpointId {
    fn from(path: &Path) -> Self {
        CheckpointId::Path(path.to_path_buf())
    }
}
