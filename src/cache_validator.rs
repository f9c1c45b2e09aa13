use sha2::{Digest, Sha256};

/// Integrity wrapper for cached plan data.
///
/// Plan limits are cached per company to avoid re-reading the plans table on
/// every gating check. A poisoned entry could silently lift a tenant's
/// ceiling, so each entry carries a SHA-256 checksum that is verified on
/// read; a mismatch is treated as a miss and the plan is re-read from the
/// database.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedEntry {
    /// The cached payload (JSON string).
    data: String,
    /// Hex-encoded SHA-256 checksum of `data`.
    checksum: String,
}

impl SealedEntry {
    /// Wraps a payload with its checksum and serializes it for storage.
    pub fn seal(data: String) -> String {
        let entry = Self {
            checksum: checksum_of(&data),
            data,
        };
        serde_json::to_string(&entry).unwrap_or_default()
    }

    /// Deserializes a stored entry and returns the payload if the checksum
    /// still matches. Returns None for corrupted or tampered entries.
    pub fn open(serialized: &str) -> Option<String> {
        let entry: SealedEntry = serde_json::from_str(serialized).ok()?;

        if checksum_of(&entry.data) == entry.checksum {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Cache integrity check failed (payload length {}), discarding entry",
                entry.data.len()
            );
            None
        }
    }
}

fn checksum_of(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
