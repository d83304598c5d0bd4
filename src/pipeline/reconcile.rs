use crate::backend::{Client, SyncOutcome};
use crate::conan::{BuildProfile, extract_download_url};
use crate::index::CanonicalIndex;
use crate::pipeline::deps::DependencyRecord;

const LOG_TARGET: &str = "reconcile";

/// Cross-reference every dependency's upstream URL against the canonical index, syncing matched
/// identities with the backend.
///
/// On an index hit the dependency carries the canonical download URL and, when the sync
/// succeeds, the backend identity handle. On a miss the raw manifest URL is kept as-is; it may
/// still match the backend's catalog by plain URL equality downstream. Dependencies without a
/// manifest (system pseudo-packages) keep a null URL, which deliberately blocks URL matching.
pub async fn reconcile(deps: &mut [DependencyRecord], index: &CanonicalIndex, backend: &Client, profile: &BuildProfile) {
    for dep in deps.iter_mut() {
        dep.match_count = 0;

        let Some(manifest) = dep.conandata_path.clone() else {
            dep.download_url = None;
            continue;
        };

        let url = match extract_download_url(&manifest, profile) {
            Ok(Some(url)) => url,
            Ok(None) => {
                log::warn!(target: LOG_TARGET, "No resolvable upstream URL in the manifest of {}", dep.reference);
                dep.download_url = None;
                continue;
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not find {} conandata.yml file: {e}", dep.reference);
                dep.download_url = None;
                continue;
            }
        };

        let Some(entry) = index.lookup(&url) else {
            dep.download_url = Some(url);
            continue;
        };

        dep.download_url = Some(entry.download_url.clone());

        match backend
            .sync_source_library(&entry.owner, &entry.name, &entry.version, &entry.repo_url, &entry.download_url)
            .await
        {
            SyncOutcome::Synced { key_uuid } => {
                log::debug!(target: LOG_TARGET, "Synced canonical identity for {}: {key_uuid}", dep.reference);
                dep.key_uuid = Some(key_uuid);
            }
            SyncOutcome::Conflict => {
                log::info!(target: LOG_TARGET, "Canonical identity for {} already exists in the backend", dep.reference);
            }
            SyncOutcome::Failed(e) => {
                log::warn!(target: LOG_TARGET, "Could not sync the canonical identity for {}: {e:#}", dep.reference);
            }
        }
    }
}
