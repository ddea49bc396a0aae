//! Tarball URL rewriting for proxied metadata documents.

use serde_json::Value;

/// Rewrite every `versions.*.dist.tarball` URL so clients download
/// through this server instead of the upstream.
///
/// Each URL becomes `{scheme}://{host}/{name}/-/{filename}` where
/// `filename` is the final path segment of the existing URL and `name`
/// comes from the document (falling back to the version object's own
/// `name` field). Only the scheme+authority portion changes, so applying
/// the rewrite twice with the same host is a no-op; applying it with a
/// new host re-points a document cached under an old address.
///
/// Returns the number of URLs rewritten.
pub fn rewrite_tarball_urls(doc: &mut Value, scheme: &str, host: &str) -> usize {
    let package_name = doc
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(versions) = doc.get_mut("versions").and_then(Value::as_object_mut) else {
        return 0;
    };

    let mut rewritten = 0;
    for version in versions.values_mut() {
        let name = version
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| package_name.clone());
        let Some(name) = name else { continue };

        let Some(dist) = version.get_mut("dist").and_then(Value::as_object_mut) else {
            continue;
        };
        let Some(tarball) = dist.get("tarball").and_then(Value::as_str) else {
            continue;
        };
        let Some(filename) = tarball.rsplit('/').next().filter(|f| !f.is_empty()) else {
            continue;
        };

        let url = format!("{scheme}://{host}/{name}/-/{filename}");
        dist.insert("tarball".to_string(), Value::String(url));
        rewritten += 1;
    }
    rewritten
}
