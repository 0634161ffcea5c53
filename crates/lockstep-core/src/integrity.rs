//! Content hashing and tamper detection

use crate::content::ContentCache;
use crate::error::{RestoreError, RestoreResult};
use crate::lockfile::PackageKey;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lockstep_model::{Diagnostic, ErrorCode};
use rayon::prelude::*;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::sync::Arc;

/// Base64 of the SHA-512 digest of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    STANDARD.encode(Sha512::digest(bytes))
}

/// Hash the cached archive of every package.
///
/// Runs on the blocking pool and fans out over rayon. A package missing from
/// the cache is an I/O error.
pub async fn compute_hashes(
    cache: Arc<ContentCache>,
    packages: Vec<PackageKey>,
) -> RestoreResult<HashMap<PackageKey, String>> {
    tokio::task::spawn_blocking(move || {
        packages
            .into_par_iter()
            .map(|(id, version)| {
                let path = cache.package_file(&id, &version);
                let bytes = std::fs::read(&path).map_err(|e| RestoreError::io(&path, e))?;
                Ok(((id, version), content_hash(&bytes)))
            })
            .collect::<RestoreResult<HashMap<_, _>>>()
    })
    .await
    .map_err(|e| RestoreError::Task(e.to_string()))?
}

/// Compare recorded hashes against computed ones.
///
/// Packages without a recorded hash are not checked. Every mismatch is listed
/// in one diagnostic.
pub fn validate(
    expected: &HashMap<PackageKey, String>,
    actual: &HashMap<PackageKey, String>,
) -> Option<Diagnostic> {
    let mut mismatches: Vec<(&PackageKey, &String, &String)> = actual
        .iter()
        .filter_map(|(key, hash)| match expected.get(key) {
            Some(recorded) if recorded != hash => Some((key, recorded, hash)),
            _ => None,
        })
        .collect();
    if mismatches.is_empty() {
        return None;
    }
    mismatches.sort_by(|a, b| {
        a.0 .0
            .to_lowercase()
            .cmp(&b.0 .0.to_lowercase())
            .then_with(|| a.0 .1.cmp(&b.0 .1))
    });

    let details: Vec<String> = mismatches
        .iter()
        .map(|((id, version), recorded, hash)| {
            format!("{} {} (expected {}, actual {})", id, version, recorded, hash)
        })
        .collect();
    let mut diagnostic = Diagnostic::new(
        ErrorCode::ContentHashMismatch,
        format!(
            "Package content does not match the lock file: {}",
            details.join("; ")
        ),
    );
    if let [((id, _), _, _)] = mismatches.as_slice() {
        diagnostic = diagnostic.with_library(id.clone());
    }
    Some(diagnostic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use semver::Version;
    use tempfile::TempDir;

    fn key(id: &str, version: &str) -> PackageKey {
        (id.to_string(), Version::parse(version).unwrap())
    }

    #[test]
    fn test_hash_is_base64_sha512() {
        assert_eq!(
            content_hash(b""),
            "z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg/SpIdNs6c5H0NE8XYXysP+DGNKHfuwvY7kxvUdBeoGlODJ6+SfaPg=="
        );
    }

    #[test]
    fn test_single_diagnostic_lists_every_mismatch() {
        let expected = HashMap::from([
            (key("B", "1.0.0"), "bbb".to_string()),
            (key("A", "1.0.0"), "aaa".to_string()),
            (key("C", "1.0.0"), "ccc".to_string()),
        ]);
        let actual = HashMap::from([
            (key("A", "1.0.0"), "xxx".to_string()),
            (key("B", "1.0.0"), "yyy".to_string()),
            (key("C", "1.0.0"), "ccc".to_string()),
            (key("D", "1.0.0"), "ddd".to_string()),
        ]);

        let diagnostic = validate(&expected, &actual).unwrap();
        assert_eq!(diagnostic.code, ErrorCode::ContentHashMismatch);
        assert_eq!(
            diagnostic.message,
            "Package content does not match the lock file: \
             A 1.0.0 (expected aaa, actual xxx); B 1.0.0 (expected bbb, actual yyy)"
        );
        assert!(diagnostic.library_id.is_none());
    }

    #[test]
    fn test_matching_hashes_pass() {
        let hashes = HashMap::from([(key("A", "1.0.0"), "aaa".to_string())]);
        assert!(validate(&hashes, &hashes).is_none());
        assert!(validate(&HashMap::new(), &hashes).is_none());
    }

    #[tokio::test]
    async fn test_compute_hashes_reads_cache() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ContentCache::new(dir.path()));
        let version = Version::new(1, 0, 0);
        fs::write_atomic(&cache.package_file("A", &version), b"archive").unwrap();

        let hashes = compute_hashes(cache.clone(), vec![key("A", "1.0.0")]).await.unwrap();
        assert_eq!(hashes[&key("A", "1.0.0")], content_hash(b"archive"));

        let missing = compute_hashes(cache, vec![key("B", "1.0.0")]).await;
        assert!(matches!(missing, Err(RestoreError::Io { .. })));
    }
}
