//! Files produced by a project run.
//!
//! `ProducedFile` describes something already on disk under a project's
//! output directory; `GeneratedFile` is in-memory content from a simulation
//! that the collector has yet to write.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A file found under a project's output subdirectory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedFile {
    /// Path relative to the project's subdirectory
    pub path: PathBuf,

    /// Size in bytes
    pub size_bytes: u64,

    /// Hex-encoded SHA-256 of the contents
    pub sha256: String,
}

impl ProducedFile {
    /// Describe `path`, recording it relative to `root`. The contents are
    /// hashed in a stream, never loaded whole. Blocking.
    pub fn from_path(root: &Path, path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let size_bytes = file.metadata()?.len();

        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        Ok(Self {
            path: relative,
            size_bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Content produced by a simulation generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// File name relative to the project's subdirectory
    pub name: String,

    pub contents: String,
}

impl GeneratedFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}
