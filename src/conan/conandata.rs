use crate::Result;
use crate::conan::BuildProfile;
use ohno::IntoAppError;
use serde::Deserialize;
use serde_yaml::Value;
use std::fs::File;
use std::path::Path;

/// The `conandata.yml` shape: a `sources` mapping of version to download descriptor.
///
/// See <https://github.com/conan-io/hooks/pull/269> for the format's history; entries may also
/// carry patches and checksums, which are ignored here.
#[derive(Debug, Deserialize)]
struct ConanData {
    sources: serde_yaml::Mapping,
}

/// Extract the upstream download URL from a package's `conandata.yml`.
///
/// The first version entry in document order is consulted. Returns `Ok(None)` when the manifest
/// carries no URL resolvable for the build platform; an unreadable or malformed manifest is an
/// error for the caller to log against the owning package.
pub fn extract_download_url(manifest: &Path, profile: &BuildProfile) -> Result<Option<String>> {
    let file = File::open(manifest).into_app_err_with(|| format!("could not open manifest '{}'", manifest.display()))?;

    let data: ConanData =
        serde_yaml::from_reader(file).into_app_err_with(|| format!("could not parse manifest '{}'", manifest.display()))?;

    let Some((_, entry)) = data.sources.iter().next() else {
        return Ok(None);
    };

    let Some(url) = entry.get("url") else {
        return Ok(None);
    };

    Ok(resolve_url_value(url, profile))
}

/// Resolve a manifest `url` value to one concrete URL.
///
/// Precedence for platform-keyed maps is the OS-build key, then the architecture-build key;
/// mirror lists resolve to their last element. A map with no matching platform key resolves to
/// nothing.
#[must_use]
pub fn resolve_url_value(url: &Value, profile: &BuildProfile) -> Option<String> {
    let mut url = url;

    if let Value::Mapping(map) = url
        && let Some(os_build) = profile.os_build()
        && let Some(keyed) = map.get(os_build)
    {
        url = keyed;
    }

    if let Value::Mapping(map) = url
        && let Some(arch_build) = profile.arch_build()
        && let Some(keyed) = map.get(arch_build)
    {
        url = keyed;
    }

    if let Value::Sequence(mirrors) = url {
        url = mirrors.last()?;
    }

    url.as_str().map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn profile() -> BuildProfile {
        BuildProfile::from_settings([("os_build", "Linux"), ("arch_build", "x86_64")])
    }

    fn url_value(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_plain_string_url() {
        let url = url_value(r#""http://example.com/libfoo-1.2.0.tar.gz""#);
        assert_eq!(
            resolve_url_value(&url, &profile()),
            Some("http://example.com/libfoo-1.2.0.tar.gz".to_owned())
        );
    }

    #[test]
    fn test_os_build_key_wins_over_arch_and_list() {
        let url = url_value(
            "Linux: http://example.com/linux.tar.gz\n\
             x86_64: http://example.com/x86.tar.gz\n\
             Windows: http://example.com/win.zip\n",
        );
        assert_eq!(resolve_url_value(&url, &profile()), Some("http://example.com/linux.tar.gz".to_owned()));
    }

    #[test]
    fn test_arch_build_key_used_when_os_key_absent() {
        let url = url_value(
            "x86_64: http://example.com/x86.tar.gz\n\
             armv8: http://example.com/arm.tar.gz\n",
        );
        assert_eq!(resolve_url_value(&url, &profile()), Some("http://example.com/x86.tar.gz".to_owned()));
    }

    #[test]
    fn test_nested_platform_map_resolves_both_keys() {
        let url = url_value(
            "Linux:\n\
            \x20 x86_64: http://example.com/linux-x86.tar.gz\n\
            \x20 armv8: http://example.com/linux-arm.tar.gz\n",
        );
        assert_eq!(
            resolve_url_value(&url, &profile()),
            Some("http://example.com/linux-x86.tar.gz".to_owned())
        );
    }

    #[test]
    fn test_mirror_list_prefers_last_element() {
        let url = url_value("- http://mirror-a.example.com/pkg.tar.gz\n- http://mirror-b.example.com/pkg.tar.gz\n");
        assert_eq!(
            resolve_url_value(&url, &profile()),
            Some("http://mirror-b.example.com/pkg.tar.gz".to_owned())
        );
    }

    #[test]
    fn test_platform_map_with_no_matching_key_resolves_to_nothing() {
        let url = url_value("Macos: http://example.com/mac.tar.gz\n");
        assert_eq!(resolve_url_value(&url, &profile()), None);
    }

    #[test]
    fn test_first_version_entry_in_document_order_is_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conandata.yml");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "sources:\n\
            \x20 \"2.0.1\":\n\
            \x20   url: http://example.com/libfoo-2.0.1.tar.gz\n\
            \x20 \"1.9.0\":\n\
            \x20   url: http://example.com/libfoo-1.9.0.tar.gz\n"
        )
        .unwrap();

        let url = extract_download_url(&path, &profile()).unwrap();
        assert_eq!(url, Some("http://example.com/libfoo-2.0.1.tar.gz".to_owned()));
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let result = extract_download_url(Path::new("/nonexistent/conandata.yml"), &profile());
        assert!(result.is_err());
    }
}
