//! Shared type definitions for checkpoint storage

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of a checkpoint session a storage handle serves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StorageRole {
    /// Loads an existing checkpoint
    Reader,

    /// Saves a new checkpoint
    Writer,
}

impl StorageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageRole::Reader => "reader",
            StorageRole::Writer => "writer",
        }
    }
}

impl fmt::Display for StorageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
