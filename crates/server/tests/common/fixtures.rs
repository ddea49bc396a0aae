//! Shared test fixtures.

use base64::Engine;
use serde_json::{Value, json};
use sha2::{Digest, Sha512};

/// SRI integrity string (sha512) of a byte payload.
#[allow(dead_code)]
pub fn sha512_integrity(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    let digest = hasher.finalize();
    format!(
        "sha512-{}",
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

/// Upstream-shaped metadata document for a single-version package.
#[allow(dead_code)]
pub fn metadata_doc(
    registry_url: &str,
    name: &str,
    version: &str,
    integrity: Option<&str>,
    readme: Option<&str>,
) -> Value {
    let mut dist = json!({
        "tarball": format!("{registry_url}/{name}/-/{name}-{version}.tgz"),
    });
    if let Some(integrity) = integrity {
        dist["integrity"] = json!(integrity);
    }

    let mut doc = json!({
        "name": name,
        "dist-tags": { "latest": version },
        "versions": {
            version: {
                "name": name,
                "version": version,
                "dist": dist,
            }
        },
        "description": format!("The {name} package"),
    });
    if let Some(readme) = readme {
        doc["readme"] = json!(readme);
    }
    doc
}
