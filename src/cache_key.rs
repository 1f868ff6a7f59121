use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::config::TransformerConfig;

/// Rewrite passes that affect output, in pipeline order. Adding, removing or
/// reordering a pass changes every cache key, which is exactly the point:
/// cached artifacts from a differently-shaped pipeline must never be reused.
pub const REWRITE_PASS_SET: &[&str] = &[
    "import-export-lowering",
    "inline-requires",
    "inline-globals",
    "constant-folding",
];

/// Derives a stable cache key covering everything that influences transform
/// output for a given input file: crate version, the rewrite pass set, and the
/// full serialized configuration.
pub fn cache_key(config: &TransformerConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    for pass in REWRITE_PASS_SET {
        hasher.update([0u8]);
        hasher.update(pass.as_bytes());
    }
    hasher.update([0u8]);
    // Serialization of the config cannot fail for these field types; the
    // Debug fallback keeps the key total rather than panicking.
    let serialized =
        serde_json::to_string(config).unwrap_or_else(|_| format!("{config:?}"));
    hasher.update(serialized.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
