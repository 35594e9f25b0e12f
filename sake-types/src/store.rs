//! The on-disk shape of `.shastore`: a version marker plus a path-to-hash
//! mapping. Kept as plain serializable data here; the I/O and merge logic
//! that operates on it lives in `sake_core::store`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single file's recorded content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub sha: String,
}

impl FileFingerprint {
    pub fn new(sha: impl Into<String>) -> Self {
        FileFingerprint { sha: sha.into() }
    }
}

/// The full `.shastore` document. `files` is an `IndexMap` (not a
/// `HashMap`) so that rewriting the store with unchanged contents produces
/// byte-identical output (rather than a new random iteration order each run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintStoreDocument {
    #[serde(rename = "sake version")]
    pub sake_version: String,
    pub files: IndexMap<String, FileFingerprint>,
}

impl FingerprintStoreDocument {
    pub fn new(sake_version: impl Into<String>) -> Self {
        FingerprintStoreDocument {
            sake_version: sake_version.into(),
            files: IndexMap::new(),
        }
    }
}
