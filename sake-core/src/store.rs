//! Fingerprint store I/O: loading and durably rewriting `.shastore`, and
//! content hashing of the files the graph references.

use log::debug;
use rayon::prelude::*;
use sake_types::{FileFingerprint, FingerprintStoreDocument, SakeError, SakeResult};
use semver::Version;
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const STORE_FILENAME: &str = ".shastore";

const BLOCK_SIZE: usize = 64 * 1024;

/// Hashes a single file in 64 KiB blocks. A read failure (missing or
/// unreadable file) is reported as `MissingFile`.
pub fn hash_file(path: &Path) -> SakeResult<String> {
    let mut file = File::open(path)
        .map_err(|e| SakeError::MissingFile(format!("cannot read '{}': {}", path.display(), e)))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| SakeError::MissingFile(format!("cannot read '{}': {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Hashes a set of files relative to `cwd`, parallelized with a bounded
/// `rayon` pool since hashing is read-only. Files that no
/// longer exist are simply omitted, matching the staleness check's "missing
/// from M" rule rather than failing the whole pass.
pub fn hash_files(relative_paths: &[String], cwd: &Path) -> HashMap<String, String> {
    relative_paths
        .par_iter()
        .filter_map(|rel| {
            let full = cwd.join(rel);
            if !full.is_file() {
                return None;
            }
            match hash_file(&full) {
                Ok(sha) => Some((rel.clone(), sha)),
                Err(e) => {
                    debug!("skipping hash of '{}': {}", rel, e);
                    None
                }
            }
        })
        .collect()
}

/// `true` when `stored` is strictly older than `running`, or when `stored`
/// doesn't even parse as a semantic version (a store from before versioning,
/// or a corrupt one, is treated as older). `running` is always this crate's
/// own `CARGO_PKG_VERSION`, so a parse failure there is a build-time bug,
/// not a runtime condition to recover from.
fn is_older(stored: &str, running: &str) -> bool {
    let running = Version::parse(running).expect("CARGO_PKG_VERSION must be valid semver");
    match Version::parse(stored) {
        Ok(stored) => stored < running,
        Err(_) => true,
    }
}

/// Loads `.shastore` from `path`. A missing file is not an error: it means
/// "first run", and an empty document at the current version is returned.
/// A present file whose version is absent or older than `running_version`
/// is rejected with `StoreVersionMismatch`.
pub fn load(path: &Path, running_version: &str) -> SakeResult<FingerprintStoreDocument> {
    if !path.is_file() {
        return Ok(FingerprintStoreDocument::new(running_version));
    }
    let text = std::fs::read_to_string(path)?;
    let doc: FingerprintStoreDocument = serde_yaml::from_str(&text)?;
    if doc.sake_version.is_empty() || is_older(&doc.sake_version, running_version) {
        return Err(SakeError::StoreVersionMismatch);
    }
    Ok(doc)
}

/// Writes `doc` to `path` in a literal `---` / `...` framed form, so a
/// partial write is detectable on a later load.
pub fn save(path: &Path, doc: &FingerprintStoreDocument) -> SakeResult<()> {
    let body = serde_yaml::to_string(doc)?;
    let body = body.strip_prefix("---\n").unwrap_or(&body);
    let text = format!("---\n{}...\n", body);
    std::fs::write(path, text)?;
    Ok(())
}

/// Merges freshly computed hashes into a persisted store, for the
/// sub-build case where the effective DAG is a proper subgraph. Entries for files inside `subgraph_files` are replaced by
/// `updates`; entries outside are preserved from `previous` untouched;
/// entries named in `do_not_update` are dropped regardless (used for
/// freshly re-forced files whose hash should not be recorded).
pub fn merge(
    previous: FingerprintStoreDocument,
    subgraph_files: &HashSet<String>,
    updates: &HashMap<String, String>,
    do_not_update: &HashSet<String>,
    running_version: &str,
) -> FingerprintStoreDocument {
    let mut merged = FingerprintStoreDocument::new(running_version);
    for (path, fingerprint) in previous.files {
        if !subgraph_files.contains(&path) {
            merged.files.insert(path, fingerprint);
        }
    }
    for (path, sha) in updates {
        merged
            .files
            .insert(path.clone(), FileFingerprint::new(sha.clone()));
    }
    for path in do_not_update {
        merged.files.shift_remove(path);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hashes_are_stable_for_identical_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let first = hash_file(&path).unwrap();
        let second = hash_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 40);
    }

    #[test]
    fn different_content_hashes_differ() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, b"world").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn missing_store_yields_empty_document_at_current_version() {
        let dir = tempdir().unwrap();
        let doc = load(&dir.path().join(STORE_FILENAME), "1.2.3").unwrap();
        assert_eq!(doc.sake_version, "1.2.3");
        assert!(doc.files.is_empty());
    }

    #[test]
    fn store_round_trips_and_is_framed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        let mut doc = FingerprintStoreDocument::new("1.2.3");
        doc.files.insert("a.c".into(), FileFingerprint::new("deadbeef"));
        save(&path, &doc).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.trim_end().ends_with("..."));

        let loaded = load(&path, "1.2.3").unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn older_stored_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        let doc = FingerprintStoreDocument::new("0.9.0");
        save(&path, &doc).unwrap();
        let result = load(&path, "1.0.0");
        assert!(matches!(result, Err(SakeError::StoreVersionMismatch)));
    }

    #[rstest::rstest]
    #[case("0.9.0", "1.0.0", true)]
    #[case("1.0.0", "1.0.0", false)]
    #[case("1.1.0", "1.0.0", false)]
    #[case("1.0.0", "1.0.1", true)]
    #[case("2.0.0", "1.9.9", false)]
    #[case("1.0.0-alpha", "1.0.0", true)]
    #[case("not-a-version", "1.0.0", true)]
    fn version_ordering_follows_semver_precedence(
        #[case] stored: &str,
        #[case] running: &str,
        #[case] expected_older: bool,
    ) {
        assert_eq!(is_older(stored, running), expected_older);
    }

    #[test]
    fn merge_preserves_entries_outside_subgraph() {
        let mut previous = FingerprintStoreDocument::new("1.0.0");
        previous.files.insert("outside.c".into(), FileFingerprint::new("aaa"));
        previous.files.insert("inside.c".into(), FileFingerprint::new("old"));

        let mut subgraph = HashSet::new();
        subgraph.insert("inside.c".to_string());

        let mut updates = HashMap::new();
        updates.insert("inside.c".to_string(), "new".to_string());

        let merged = merge(previous, &subgraph, &updates, &HashSet::new(), "1.0.0");
        assert_eq!(merged.files["outside.c"].sha, "aaa");
        assert_eq!(merged.files["inside.c"].sha, "new");
    }

    #[test]
    fn merge_drops_do_not_update_entries() {
        let previous = FingerprintStoreDocument::new("1.0.0");
        let mut updates = HashMap::new();
        updates.insert("forced.c".to_string(), "new".to_string());
        let mut skip = HashSet::new();
        skip.insert("forced.c".to_string());

        let merged = merge(previous, &HashSet::new(), &updates, &skip, "1.0.0");
        assert!(!merged.files.contains_key("forced.c"));
    }
}
