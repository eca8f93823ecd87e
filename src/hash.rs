//! Content fingerprints for raw snapshots

use blake3::Hasher;

/// A hash value represented as a hex string
pub type HashValue = String;

/// Hash a single file's bytes
pub fn hash_bytes(content: &[u8]) -> HashValue {
    blake3::hash(content).to_hex().to_string()
}

/// Combine per-file hashes into one snapshot fingerprint.
///
/// Entries are hashed in the order given, so callers pass them sorted by name.
pub fn fingerprint(entries: &[(String, HashValue)]) -> HashValue {
    let mut hasher = Hasher::new();
    for (name, hash) in entries {
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        hasher.update(hash.as_bytes());
        hasher.update(b"||");
    }
    hasher.finalize().to_hex().to_string()
}
