//! Tarball filename parsing.

use regex::Regex;
use std::sync::OnceLock;

/// Matches the version suffix of a tarball filename once the
/// `<package>-` prefix has been stripped: `major.minor.patch` plus an
/// optional pre-release tag (`-beta.1`) and build metadata (`+build.5`),
/// both captured as part of the version. Anything after the version other
/// than the `.tgz` suffix is a parse failure.
fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+\.\d+\.\d+(?:-[0-9A-Za-z.\-]+)?(?:\+[0-9A-Za-z.\-]+)?)\.tgz$")
            .expect("version regex is valid")
    })
}

/// Extract the version from a tarball filename of the form
/// `<package>-<version>.tgz`.
///
/// The package name is required because it may itself contain dashes
/// (`left-pad-1.3.0.tgz`); stripping the known prefix removes the
/// ambiguity a bare regex over the whole filename would have.
pub fn parse_tarball_filename(package: &str, filename: &str) -> crate::Result<String> {
    let rest = filename
        .strip_prefix(package)
        .and_then(|r| r.strip_prefix('-'))
        .ok_or_else(|| {
            crate::Error::InvalidTarballFilename(format!(
                "{filename} does not start with {package}-"
            ))
        })?;

    let captures = version_re().captures(rest).ok_or_else(|| {
        crate::Error::InvalidTarballFilename(format!("{filename} has no version suffix"))
    })?;
    Ok(captures[1].to_string())
}
