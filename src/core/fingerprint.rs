//! Request fingerprinting for the response cache.

use sha2::{Digest, Sha256};

use crate::backend::ChatRequest;
use crate::core::provider::Provider;

/// SHA-256 fingerprint of a fully resolved request, hex-encoded.
///
/// Covers everything that influences the response: provider, model, system
/// prompt, the full message list (attachment content is already inlined into
/// the prompt text by assembly), image data, temperature, and the output
/// cap. Field order is fixed by the serialized struct, so equal requests
/// always produce equal fingerprints.
#[must_use]
pub fn fingerprint(provider: Provider, request: &ChatRequest) -> String {
    let canonical = serde_json::json!({
        "provider": provider.id(),
        "request": request,
    });
    // Serializing a Value cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}
