use crate::Result;
use crate::conan::Conan;
use crate::config::Config;
use ohno::IntoAppError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     deps";

/// One dependency as reported by the package manager's listing command.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDependency {
    pub reference: String,

    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default)]
    pub export_folder: Option<PathBuf>,

    #[serde(default)]
    pub source_folder: Option<PathBuf>,

    /// `host` for regular requirements, `build` for build-time-only ones.
    #[serde(default)]
    pub context: Option<String>,
}

/// One resolved dependency, threaded through every pipeline stage.
///
/// Created here; the recovery engine fills the recovered source dir and manifest path, the
/// index reconciler the download URL and identity handle, and the reattribution engine bumps
/// the match counter.
#[derive(Debug, Clone)]
pub struct DependencyRecord {
    /// Package coordinate, e.g. `zlib/1.2.13` or `pkg/1.0@user/channel`. Unique per run.
    pub reference: String,

    pub name: String,
    pub version: String,

    /// Reference with `/` replaced by `-`; the per-package folder name and remap join key.
    pub package_slug: String,

    pub revision: String,
    pub is_build_requirement: bool,

    pub export_folder: PathBuf,
    pub source_folder: PathBuf,

    /// Where recovered sources were placed, when the cache folder was missing.
    pub recovered_source_dir: Option<PathBuf>,

    /// The `conandata.yml` governing this package, once located.
    pub conandata_path: Option<PathBuf>,

    /// Canonical download URL from the index, or the raw manifest URL on an index miss.
    pub download_url: Option<String>,

    /// Backend identity handle captured during index reconciliation.
    pub key_uuid: Option<String>,

    /// How many source files phase-1 reattribution confirmed as accurately mapped.
    pub match_count: u32,
}

impl DependencyRecord {
    fn from_raw(raw: RawDependency) -> Option<Self> {
        let revision = raw.revision?;
        let (name, version) = raw.reference.split_once('/')?;

        Some(Self {
            name: name.to_owned(),
            version: version.to_owned(),
            package_slug: raw.reference.replace('/', "-"),
            revision,
            is_build_requirement: raw.context.as_deref() == Some("build"),
            export_folder: raw.export_folder.unwrap_or_default(),
            source_folder: raw.source_folder.unwrap_or_default(),
            recovered_source_dir: None,
            conandata_path: None,
            download_url: None,
            key_uuid: None,
            match_count: 0,
            reference: raw.reference,
        })
    }
}

/// Invoke the package manager's dependency listing and build the record collection.
///
/// A failure here is fatal; nothing downstream can produce a meaningful result without the
/// dependency graph.
pub async fn map_dependencies(conan: &Conan, config: &Config) -> Result<Vec<DependencyRecord>> {
    let deps_json = config.temp_dir.join("deps.json");
    log::info!(target: LOG_TARGET, "Mapping project dependencies to {}", deps_json.display());

    let output = conan
        .info_json(&config.install_ref, config.include_build_requires, &deps_json)
        .await
        .into_app_err("the dependency listing failed; the scan cannot continue")?;
    log::info!(target: LOG_TARGET, "\n{output}");

    let data = fs::read_to_string(&deps_json).into_app_err_with(|| format!("could not read '{}'", deps_json.display()))?;
    parse_dependency_list(&data)
}

/// Parse the listing JSON, dropping placeholder entries that carry no revision.
pub fn parse_dependency_list(data: &str) -> Result<Vec<DependencyRecord>> {
    let raw: Vec<RawDependency> = serde_json::from_str(data).into_app_err("the dependency listing JSON has an unexpected shape")?;

    Ok(raw.into_iter().filter_map(DependencyRecord::from_raw).collect())
}

/// References of dependencies whose cache source folder is absent on disk.
///
/// Only these enter the recovery engine; a record with sources already in the cache is scanned
/// in place.
#[must_use]
pub fn missing_source_folders(deps: &[DependencyRecord]) -> Vec<String> {
    let mut missing = Vec::new();

    for dep in deps {
        if dep.source_folder.as_os_str().is_empty() || !dep.source_folder.exists() {
            log::info!(target: LOG_TARGET, "Source folder missing for {} at: {}", dep.reference, dep.source_folder.display());
            missing.push(dep.reference.clone());
        } else {
            log::info!(target: LOG_TARGET, "Source folder exists for {} at: {}", dep.reference, dep.source_folder.display());
        }
    }

    missing
}

/// Scan targets for dependencies already present in the cache; also pins their manifest to the
/// export-folder `conandata.yml`.
pub fn cached_source_folders(deps: &mut [DependencyRecord], missing: &[String]) -> Vec<PathBuf> {
    let mut folders = Vec::new();

    for dep in deps.iter_mut().filter(|d| !missing.contains(&d.reference)) {
        folders.push(dep.source_folder.clone());
        dep.conandata_path = Some(dep.export_folder.join("conandata.yml"));
    }

    folders
}

/// The project manifest kind found in the project path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    /// `conanfile.py`
    Recipe,
    /// `conanfile.txt`
    Declaration,
}

/// Check a supported conanfile exists in the project; fatal precondition when absent.
pub fn validate_project_manifest(project_path: &Path) -> Result<RecipeKind> {
    log::info!(target: LOG_TARGET, "Checking for conanfile.");

    let mut kind = None;
    for (file, file_kind) in [("conanfile.txt", RecipeKind::Declaration), ("conanfile.py", RecipeKind::Recipe)] {
        if project_path.join(file).exists() {
            log::info!(target: LOG_TARGET, "The {file} manifest file exists in your environment.");
            kind = Some(file_kind);
        }
    }

    kind.ok_or_else(|| ohno::app_err!("a supported conanfile was not found in {}", project_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"reference": "conanfile.txt", "is_ref": false},
        {"reference": "zlib/1.2.13", "revision": "abc123",
         "export_folder": "/cache/zlib/1.2.13/_/_/export",
         "source_folder": "/cache/zlib/1.2.13/_/_/source", "context": "host"},
        {"reference": "cmake/3.25.0", "revision": "def456",
         "export_folder": "/cache/cmake/3.25.0/_/_/export",
         "source_folder": "/cache/cmake/3.25.0/_/_/source", "context": "build"}
    ]"#;

    #[test]
    fn test_parse_drops_entries_without_revision() {
        let deps = parse_dependency_list(LISTING).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].reference, "zlib/1.2.13");
        assert_eq!(deps[0].name, "zlib");
        assert_eq!(deps[0].version, "1.2.13");
        assert_eq!(deps[0].package_slug, "zlib-1.2.13");
        assert!(!deps[0].is_build_requirement);
        assert!(deps[1].is_build_requirement);
    }

    #[test]
    fn test_user_channel_kept_in_version_and_slug() {
        let deps = parse_dependency_list(r#"[{"reference": "libfoo/1.0@user/stable", "revision": "r1"}]"#).unwrap();
        assert_eq!(deps[0].name, "libfoo");
        assert_eq!(deps[0].version, "1.0@user/stable");
        assert_eq!(deps[0].package_slug, "libfoo-1.0@user-stable");
    }

    #[test]
    fn test_existing_source_folder_never_reported_missing() {
        let cache = tempfile::tempdir().unwrap();
        let present = cache.path().join("zlib-source");
        fs::create_dir(&present).unwrap();

        let mut deps = parse_dependency_list(LISTING).unwrap();
        deps[0].source_folder = present;
        deps[1].source_folder = cache.path().join("does-not-exist");

        let missing = missing_source_folders(&deps);
        assert_eq!(missing, vec!["cmake/3.25.0".to_owned()]);
    }

    #[test]
    fn test_cached_source_folders_pin_export_manifest() {
        let mut deps = parse_dependency_list(LISTING).unwrap();
        let missing = vec!["cmake/3.25.0".to_owned()];

        let folders = cached_source_folders(&mut deps, &missing);

        assert_eq!(folders, vec![PathBuf::from("/cache/zlib/1.2.13/_/_/source")]);
        assert_eq!(deps[0].conandata_path, Some(PathBuf::from("/cache/zlib/1.2.13/_/_/export/conandata.yml")));
        assert_eq!(deps[1].conandata_path, None);
    }

    #[test]
    fn test_validate_project_manifest() {
        let project = tempfile::tempdir().unwrap();
        assert!(validate_project_manifest(project.path()).is_err());

        fs::write(project.path().join("conanfile.txt"), "[requires]\nzlib/1.2.13\n").unwrap();
        assert_eq!(validate_project_manifest(project.path()).unwrap(), RecipeKind::Declaration);

        fs::write(project.path().join("conanfile.py"), "from conan import ConanFile\n").unwrap();
        assert_eq!(validate_project_manifest(project.path()).unwrap(), RecipeKind::Recipe);
    }
}
