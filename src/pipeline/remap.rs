use crate::Result;
use crate::backend::{DueDiligenceEntry, InventoryEntry, ReassignOutcome, SourceFile};
use crate::config::Config;
use crate::pipeline::deps::DependencyRecord;
use ohno::app_err;
use std::collections::{BTreeMap, HashMap};

const LOG_TARGET: &str = "    remap";

/// Artifact bucket the backend uses for files it could not attribute at all.
const UNMATCHED_ARTIFACT: &str = "Unmatched Source Files";

/// One file of the project's source-file inventory, annotated for reattribution.
///
/// The local copy is mutated freely during the phases; the authoritative backend record only
/// changes through explicit reassignment calls.
#[derive(Debug, Clone)]
pub struct SourceFileRecord {
    pub sha1: String,
    pub path: String,

    /// Synthesized `artifactId-version` join key for the due-diligence report.
    pub full_name: String,

    /// Download link of the currently-attributed library, joined in from due diligence.
    pub download_link: Option<String>,

    /// Phase 1 found the file already attributed to the right library.
    pub accurate_match: bool,

    /// Phase 1 queued the file for reassignment by identity handle.
    pub need_to_remap: bool,

    /// How many dependencies' path patterns matched this file without resolving it.
    pub path_match_count: u32,

    queued_second_phase: bool,
}

/// What phase 1 produced: files for the narrowing phase, and hashes queued for reassignment
/// grouped by target identity handle.
#[derive(Debug, Default)]
pub struct PhaseOneOutcome {
    pub second_phase: Vec<usize>,
    pub remap_queue: BTreeMap<String, Vec<String>>,
}

/// Correct source-file-to-library attribution for the scanned project.
///
/// Three-phase matching: exact reconciliation by download-URL equality, narrowing of ambiguous
/// path matches, then fallback keyword/name search. Per-file and per-call failures are logged
/// and skipped; only the project-token resolution is load-bearing enough to abort.
pub async fn change_source_file_inventory_match(config: &Config, deps: &mut [DependencyRecord]) -> Result<()> {
    let org_name = config.org_name.clone();
    log::info!(
        target: LOG_TARGET,
        "Start validating source files matching accuracy compared to the local conan cache in:\nOrganization: {org_name}\nProduct name: {}\nProject name: {}",
        config.product_name.as_deref().unwrap_or("(token)"),
        config.project_name.as_deref().unwrap_or("(token)")
    );

    let project_token = resolve_project_token(config).await?;

    let due_diligence = due_diligence_by_library(config.backend.get_due_diligence(&project_token).await?);
    let mut files = annotate_source_files(config.backend.get_source_file_inventory(&project_token).await?, &due_diligence);
    let inventory = config.backend.get_inventory(&project_token).await?;
    let inventory_by_link = inventory_download_links(&inventory, &due_diligence);

    let outcome = phase1(deps, &mut files, &inventory_by_link, &org_name);

    let comment = format!("Source files changed by conan-scout scan_{}", config.date_time_now);

    if !outcome.remap_queue.is_empty() {
        execute_reassignments(config, &outcome.remap_queue, &inventory, &comment, &org_name).await;
    }

    if !outcome.second_phase.is_empty() {
        let narrowed = phase2_narrow(&files, &outcome.second_phase);
        let groups = group_remaining_by_dependency(deps, &files, &narrowed);
        phase3(config, deps, &files, &groups, &inventory, &comment).await;
    }

    Ok(())
}

/// Resolve the project token from the configuration, deriving it by name where needed.
async fn resolve_project_token(config: &Config) -> Result<String> {
    if let Some(token) = &config.project_token {
        return Ok(token.clone());
    }

    let product_token = match &config.product_token {
        Some(token) => token.clone(),
        None => {
            let product_name = config
                .product_name
                .as_deref()
                .ok_or_else(|| app_err!("either a product name or a product token is required to resolve the project"))?;
            config.backend.get_product_token_by_name(product_name).await?
        }
    };

    let project_name = config
        .project_name
        .as_deref()
        .ok_or_else(|| app_err!("either a project name or a project token is required to resolve the project"))?;

    config.backend.get_project_token_by_name(&product_token, project_name).await
}

/// Library names of multi-license entries carry a trailing `*` in the due-diligence report.
fn strip_multi_license_marker(library: &str) -> &str {
    library.strip_suffix('*').unwrap_or(library)
}

/// Key the due-diligence report by (marker-stripped) library name.
pub fn due_diligence_by_library(entries: Vec<DueDiligenceEntry>) -> HashMap<String, DueDiligenceEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.library = strip_multi_license_marker(&entry.library).to_owned();
            (entry.library.clone(), entry)
        })
        .collect()
}

/// Annotate the raw source-file inventory with due-diligence download links.
///
/// Files in the backend's unmatched bucket keep a null link; they cannot be confirmed accurate
/// by URL equality, only remapped.
pub fn annotate_source_files(files: Vec<SourceFile>, due_diligence: &HashMap<String, DueDiligenceEntry>) -> Vec<SourceFileRecord> {
    files
        .into_iter()
        .map(|file| {
            let full_name = format!("{}-{}", file.library.artifact_id, file.library.version);

            let download_link = if file.library.artifact_id.contains(UNMATCHED_ARTIFACT) {
                None
            } else {
                due_diligence.get(&full_name).and_then(|entry| entry.download_link.clone())
            };

            SourceFileRecord {
                sha1: file.sha1,
                path: file.path,
                full_name,
                download_link,
                accurate_match: false,
                need_to_remap: false,
                path_match_count: 0,
                queued_second_phase: false,
            }
        })
        .collect()
}

/// Map each inventory library's due-diligence download link to its filename.
pub fn inventory_download_links(inventory: &[InventoryEntry], due_diligence: &HashMap<String, DueDiligenceEntry>) -> HashMap<String, String> {
    let mut by_link = HashMap::new();

    for library in inventory {
        if let Some(link) = due_diligence.get(&library.filename).and_then(|entry| entry.download_link.clone()) {
            let _ = by_link.insert(link, library.filename.clone());
        }
    }

    by_link
}

/// Does this source file live under the dependency's package folder or cache source path?
fn path_matches(dep: &DependencyRecord, file: &SourceFileRecord) -> bool {
    if file.path.contains(&dep.package_slug) {
        return true;
    }

    let source_folder = dep.source_folder.to_string_lossy();
    !source_folder.is_empty() && file.path.contains(source_folder.as_ref())
}

/// Phase 1: exact reconciliation by download-URL equality.
///
/// A file whose annotated link equals its owning dependency's resolved URL is already correct;
/// otherwise it is queued under the dependency's identity handle, or pushed to phase 2 when no
/// handle exists. A file enters the phase-2 queue at most once, but its path-match counter
/// keeps counting every candidate dependency for the narrowing phase.
pub fn phase1(
    deps: &mut [DependencyRecord],
    files: &mut [SourceFileRecord],
    inventory_by_link: &HashMap<String, String>,
    org_name: &str,
) -> PhaseOneOutcome {
    let mut outcome = PhaseOneOutcome::default();
    let mut queued_by_handle = 0_usize;
    let mut queued_for_search = 0_usize;

    for dep in deps.iter_mut() {
        let matched_filename = dep.download_url.as_ref().and_then(|url| inventory_by_link.get(url)).cloned();

        for (i, file) in files.iter_mut().enumerate() {
            if !path_matches(dep, file) {
                continue;
            }

            let accurate = matched_filename.is_some() && file.download_link.is_some() && file.download_link == dep.download_url;

            if accurate {
                dep.match_count += 1;
                file.accurate_match = true;
            } else if let Some(key_uuid) = &dep.key_uuid {
                file.need_to_remap = true;
                outcome.remap_queue.entry(key_uuid.clone()).or_default().push(file.sha1.clone());
                queued_by_handle += 1;
            } else {
                file.path_match_count += 1;
                queued_for_search += 1;
                if !file.queued_second_phase {
                    file.queued_second_phase = true;
                    outcome.second_phase.push(i);
                }
            }
        }

        match &matched_filename {
            Some(filename) if dep.match_count > 0 => {
                log::info!(
                    target: LOG_TARGET,
                    "for {} conan package: {} source files are mapped to the correct library ({filename}) in {org_name}",
                    dep.package_slug,
                    dep.match_count
                );
            }
            _ => {
                log::info!(
                    target: LOG_TARGET,
                    "for {} conan package: {} source files are mapped to the correct library in {org_name}",
                    dep.package_slug,
                    dep.match_count
                );
            }
        }
    }

    log::info!(
        target: LOG_TARGET,
        "There are {} source files that can be re-mapped to the correct conan source library in {org_name}",
        queued_by_handle + queued_for_search
    );

    outcome
}

/// Issue one reassignment call per target identity, each carrying all of its queued hashes.
async fn execute_reassignments(
    config: &Config,
    queue: &BTreeMap<String, Vec<String>>,
    inventory: &[InventoryEntry],
    comment: &str,
    org_name: &str,
) {
    let filename_by_uuid: HashMap<&str, &str> = inventory
        .iter()
        .filter_map(|library| library.key_uuid.as_deref().map(|uuid| (uuid, library.filename.as_str())))
        .collect();

    let mut moved = 0_usize;

    for (key_uuid, sha1s) in queue {
        match config.backend.reassign_source_files(key_uuid, sha1s, comment).await {
            ReassignOutcome::Applied => {
                let target = filename_by_uuid.get(key_uuid.as_str()).copied().unwrap_or(key_uuid.as_str());
                log::info!(target: LOG_TARGET, "--{} source files were moved to {target} library in {org_name}", sha1s.len());
                moved += sha1s.len();
            }
            ReassignOutcome::Conflict => {
                log::info!(target: LOG_TARGET, "Reassignment to {key_uuid} collided with existing backend state; skipped");
            }
            ReassignOutcome::Failed(e) => {
                log::warn!(target: LOG_TARGET, "Reassignment to {key_uuid} failed: {e:#}");
            }
        }
    }

    log::info!(target: LOG_TARGET, "Total {moved} source files were remapped to the correct libraries.");
}

/// Phase 2: keep only files that are still unresolved and whose path matched fewer than two
/// candidate dependencies; an ambiguous path cannot be reattributed with confidence.
pub fn phase2_narrow(files: &[SourceFileRecord], candidates: &[usize]) -> Vec<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&i| {
            let file = &files[i];
            !file.accurate_match && !file.need_to_remap && file.path_match_count < 2
        })
        .collect()
}

/// Regroup the narrowed files by dependency via the same path-containment test, keyed by
/// package slug.
pub fn group_remaining_by_dependency(
    deps: &[DependencyRecord],
    files: &[SourceFileRecord],
    narrowed: &[usize],
) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for dep in deps {
        for &i in narrowed {
            let file = &files[i];
            if path_matches(dep, file) {
                groups.entry(dep.package_slug.clone()).or_default().push(file.sha1.clone());
            }
        }
    }

    groups
}

/// Full-inventory name match: a source library whose filename contains both the package name
/// and version.
pub fn find_library_by_name<'a>(inventory: &'a [InventoryEntry], name: &str, version: &str) -> Option<&'a InventoryEntry> {
    let name = name.to_lowercase();
    let version = version.to_lowercase();

    inventory.iter().find(|library| {
        let filename = library.filename.to_lowercase();
        library.is_source_library() && filename.contains(&name) && filename.contains(&version)
    })
}

/// Phase 3: fallback resolution for dependencies whose files could not be matched by URL.
async fn phase3(
    config: &Config,
    deps: &[DependencyRecord],
    files: &[SourceFileRecord],
    groups: &BTreeMap<String, Vec<String>>,
    inventory: &[InventoryEntry],
    comment: &str,
) {
    let deps_by_slug: HashMap<&str, &DependencyRecord> = deps.iter().map(|d| (d.package_slug.as_str(), d)).collect();
    let files_by_sha1: HashMap<&str, &SourceFileRecord> = files.iter().map(|f| (f.sha1.as_str(), f)).collect();

    let total = groups.len();
    let mut matched = 0_usize;

    for (slug, sha1s) in groups {
        let Some(dep) = deps_by_slug.get(slug.as_str()) else {
            continue;
        };

        // An identity handle from reconciliation wins outright.
        if let Some(key_uuid) = &dep.key_uuid {
            log::info!(target: LOG_TARGET, "found a match for mis-configured source files of {slug}");
            report_reassignment(config.backend.reassign_source_files(key_uuid, sha1s, comment).await, key_uuid);
            matched += 1;
            log::info!(
                target: LOG_TARGET,
                "--{matched}/{total} libraries were matched ( {} mis-configured source files from {slug} conan package were matched to a source library )",
                sha1s.len()
            );
            continue;
        }

        log::info!(target: LOG_TARGET, "Trying to match the remaining mis-configured source files of {slug} with global search");

        let hits = match config.backend.search_libraries(&dep.name).await {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Library search for '{}' failed: {e:#}", dep.name);
                Vec::new()
            }
        };

        let hits_by_url: HashMap<&str, _> = hits
            .iter()
            .filter(|hit| hit.is_source_library())
            .filter_map(|hit| hit.url.as_deref().map(|url| (url, hit)))
            .collect();

        if let Some(hit) = dep.download_url.as_deref().and_then(|url| hits_by_url.get(url)) {
            log::info!(target: LOG_TARGET, "found a match by global search for mis-configured source files of {slug}");
            report_reassignment(config.backend.reassign_source_files(&hit.key_uuid, sha1s, comment).await, &hit.key_uuid);
            matched += 1;
            log::info!(
                target: LOG_TARGET,
                "--{matched}/{total} libraries were matched ( {} mis-configured source files from {slug} conan package were matched to {} source library )",
                sha1s.len(),
                hit.filename.as_deref().unwrap_or(&hit.key_uuid)
            );
            continue;
        }

        log::info!(target: LOG_TARGET, "Match was not found by global search for mis-configured source files of {slug}");
        log::info!(target: LOG_TARGET, "Trying to match the remaining mis-configured source files of {slug} with name match");

        if let Some(library) = find_library_by_name(inventory, &dep.name, &dep.version) {
            log::info!(target: LOG_TARGET, "A match was found by name for conan package {slug}: -->{}", library.filename);

            let final_sha1s: Vec<String> = sha1s
                .iter()
                .filter(|sha1| {
                    let already = files_by_sha1
                        .get(sha1.as_str())
                        .is_some_and(|file| file.full_name == library.filename);
                    if already {
                        log::info!(target: LOG_TARGET, "sha1: {sha1} is already mapped to {}", library.filename);
                    }
                    !already
                })
                .cloned()
                .collect();

            // Every hash already attributed to that exact filename still counts as a match.
            if final_sha1s.is_empty() {
                continue;
            }

            let Some(key_uuid) = &library.key_uuid else {
                log::warn!(target: LOG_TARGET, "Library {} carries no identity handle; cannot reassign", library.filename);
                continue;
            };

            report_reassignment(config.backend.reassign_source_files(key_uuid, &final_sha1s, comment).await, key_uuid);
            matched += 1;
            log::info!(
                target: LOG_TARGET,
                "--{matched}/{total} libraries were matched ( {} mis-configured source files from {slug} conan package were matched to {} source library )",
                final_sha1s.len(),
                library.filename
            );
        } else {
            log::info!(target: LOG_TARGET, "Match was not found by name for mis-configured source files of {slug}");
            log::info!(target: LOG_TARGET, "Did not find a match for {slug} package's remaining source files.");
        }
    }
}

fn report_reassignment(outcome: ReassignOutcome, key_uuid: &str) {
    match outcome {
        ReassignOutcome::Applied => {}
        ReassignOutcome::Conflict => {
            log::info!(target: LOG_TARGET, "Reassignment to {key_uuid} collided with existing backend state; skipped");
        }
        ReassignOutcome::Failed(e) => {
            log::warn!(target: LOG_TARGET, "Reassignment to {key_uuid} failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SourceFileLibrary;
    use std::path::PathBuf;

    fn dep(reference: &str, source_folder: &str) -> DependencyRecord {
        let (name, version) = reference.split_once('/').unwrap();
        DependencyRecord {
            reference: reference.to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
            package_slug: reference.replace('/', "-"),
            revision: "r1".to_owned(),
            is_build_requirement: false,
            export_folder: PathBuf::new(),
            source_folder: PathBuf::from(source_folder),
            recovered_source_dir: None,
            conandata_path: None,
            download_url: None,
            key_uuid: None,
            match_count: 0,
        }
    }

    fn source_file(sha1: &str, path: &str, full_name: &str, download_link: Option<&str>) -> SourceFileRecord {
        SourceFileRecord {
            sha1: sha1.to_owned(),
            path: path.to_owned(),
            full_name: full_name.to_owned(),
            download_link: download_link.map(ToOwned::to_owned),
            accurate_match: false,
            need_to_remap: false,
            path_match_count: 0,
            queued_second_phase: false,
        }
    }

    fn inventory_entry(filename: &str, key_uuid: Option<&str>, library_type: &str) -> InventoryEntry {
        InventoryEntry {
            key_uuid: key_uuid.map(ToOwned::to_owned),
            filename: filename.to_owned(),
            library_type: library_type.to_owned(),
        }
    }

    #[test]
    fn test_due_diligence_strips_multi_license_marker() {
        let entries = vec![
            DueDiligenceEntry {
                library: "zlib-1.2.13*".to_owned(),
                download_link: Some("http://zlib.net/zlib-1.2.13.tar.gz".to_owned()),
                license: Some("Zlib".to_owned()),
            },
            DueDiligenceEntry {
                library: "libfoo-1.0".to_owned(),
                download_link: None,
                license: None,
            },
        ];

        let by_library = due_diligence_by_library(entries);
        assert!(by_library.contains_key("zlib-1.2.13"));
        assert!(by_library.contains_key("libfoo-1.0"));
        assert!(!by_library.contains_key("zlib-1.2.13*"));
    }

    #[test]
    fn test_annotate_skips_unmatched_bucket() {
        let mut due_diligence = HashMap::new();
        let _ = due_diligence.insert(
            "zlib-1.2.13".to_owned(),
            DueDiligenceEntry {
                library: "zlib-1.2.13".to_owned(),
                download_link: Some("http://zlib.net/zlib-1.2.13.tar.gz".to_owned()),
                license: None,
            },
        );

        let files = vec![
            SourceFile {
                sha1: "a1".to_owned(),
                path: "/scan/zlib-1.2.13/inflate.c".to_owned(),
                library: SourceFileLibrary {
                    artifact_id: "zlib".to_owned(),
                    version: "1.2.13".to_owned(),
                },
            },
            SourceFile {
                sha1: "a2".to_owned(),
                path: "/scan/misc/loose.c".to_owned(),
                library: SourceFileLibrary {
                    artifact_id: "Unmatched Source Files".to_owned(),
                    version: "1.0".to_owned(),
                },
            },
        ];

        let records = annotate_source_files(files, &due_diligence);
        assert_eq!(records[0].download_link.as_deref(), Some("http://zlib.net/zlib-1.2.13.tar.gz"));
        assert_eq!(records[1].download_link, None);
    }

    #[test]
    fn test_phase1_accurate_match_is_never_queued() {
        let url = "http://zlib.net/zlib-1.2.13.tar.gz";

        let mut deps = vec![dep("zlib/1.2.13", "/cache/zlib/source")];
        deps[0].download_url = Some(url.to_owned());
        deps[0].key_uuid = Some("uuid-zlib".to_owned());

        let mut files = vec![source_file("a1", "/scan/zlib-1.2.13/inflate.c", "zlib-1.2.13", Some(url))];

        let mut inventory_by_link = HashMap::new();
        let _ = inventory_by_link.insert(url.to_owned(), "zlib-1.2.13".to_owned());

        let outcome = phase1(&mut deps, &mut files, &inventory_by_link, "TestOrg");

        assert!(files[0].accurate_match);
        assert!(!files[0].need_to_remap);
        assert_eq!(deps[0].match_count, 1);
        assert!(outcome.remap_queue.is_empty());
        assert!(outcome.second_phase.is_empty());
    }

    #[test]
    fn test_phase1_groups_queued_hashes_by_identity() {
        let mut deps = vec![dep("zlib/1.2.13", "/cache/zlib/source")];
        deps[0].download_url = Some("http://zlib.net/zlib-1.2.13.tar.gz".to_owned());
        deps[0].key_uuid = Some("uuid-zlib".to_owned());

        // Attributed to the wrong library, so their links disagree with the dependency URL.
        let mut files = vec![
            source_file("a1", "/scan/zlib-1.2.13/inflate.c", "other-2.0", Some("http://other.example/2.0.tar.gz")),
            source_file("a2", "/scan/zlib-1.2.13/deflate.c", "other-2.0", Some("http://other.example/2.0.tar.gz")),
            source_file("a3", "/scan/zlib-1.2.13/trees.c", "other-2.0", None),
        ];

        let outcome = phase1(&mut deps, &mut files, &HashMap::new(), "TestOrg");

        assert_eq!(outcome.remap_queue.len(), 1);
        assert_eq!(outcome.remap_queue["uuid-zlib"], vec!["a1", "a2", "a3"]);
        assert!(files.iter().all(|f| f.need_to_remap));
        assert!(outcome.second_phase.is_empty());
    }

    #[test]
    fn test_phase1_without_identity_queues_for_search_once() {
        let mut deps = vec![dep("zlib/1.2.13", "/cache/zlib/source"), dep("libfoo/1.0", "/cache/libfoo/source")];

        // One file under a path that contains both package slugs.
        let mut files = vec![source_file(
            "a1",
            "/scan/zlib-1.2.13/vendored/libfoo-1.0/foo.c",
            "other-2.0",
            None,
        )];

        let outcome = phase1(&mut deps, &mut files, &HashMap::new(), "TestOrg");

        assert_eq!(outcome.second_phase, vec![0]);
        assert_eq!(files[0].path_match_count, 2);
    }

    #[test]
    fn test_phase2_narrowing_drops_ambiguous_files_and_is_idempotent() {
        let mut files = vec![
            source_file("a1", "/scan/zlib-1.2.13/inflate.c", "other-2.0", None),
            source_file("a2", "/scan/zlib-1.2.13/vendored/libfoo-1.0/foo.c", "other-2.0", None),
            source_file("a3", "/scan/libbar-3.0/bar.c", "other-2.0", None),
        ];
        files[0].path_match_count = 1;
        files[1].path_match_count = 2;
        files[2].path_match_count = 1;
        files[2].need_to_remap = true;

        let candidates = vec![0, 1, 2];
        let narrowed = phase2_narrow(&files, &candidates);
        assert_eq!(narrowed, vec![0]);

        // Re-running the narrowing on its own output removes nothing further.
        assert_eq!(phase2_narrow(&files, &narrowed), narrowed);
    }

    #[test]
    fn test_group_remaining_by_dependency() {
        let deps = vec![dep("zlib/1.2.13", "/cache/zlib/source"), dep("libfoo/1.0", "/cache/libfoo/source")];
        let files = vec![
            source_file("a1", "/scan/zlib-1.2.13/inflate.c", "other-2.0", None),
            source_file("a2", "/scan/zlib-1.2.13/deflate.c", "other-2.0", None),
            source_file("a3", "/scan/libfoo-1.0/foo.c", "other-2.0", None),
        ];

        let groups = group_remaining_by_dependency(&deps, &files, &[0, 1, 2]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["zlib-1.2.13"], vec!["a1", "a2"]);
        assert_eq!(groups["libfoo-1.0"], vec!["a3"]);
    }

    #[test]
    fn test_find_library_by_name_needs_name_version_and_type() {
        let inventory = vec![
            inventory_entry("ZLIB-1.2.13.tar.gz", Some("uuid-1"), "SOURCE_LIBRARY"),
            inventory_entry("zlib-1.2.13.jar", Some("uuid-2"), "JAVA_ARCHIVE"),
            inventory_entry("zlib-1.2.11.tar.gz", Some("uuid-3"), "SOURCE_LIBRARY"),
        ];

        let library = find_library_by_name(&inventory, "zlib", "1.2.13").unwrap();
        assert_eq!(library.key_uuid.as_deref(), Some("uuid-1"));

        assert!(find_library_by_name(&inventory, "zlib", "9.9.9").is_none());
        assert!(find_library_by_name(&inventory, "bzip2", "1.0.8").is_none());
    }
}
