use crate::Result;
use crate::conan::{BuildProfile, Conan, extract_download_url};
use crate::pipeline::deps::DependencyRecord;
use ohno::{IntoAppError, bail};
use reqwest::header::CACHE_CONTROL;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = " recovery";

/// The ordered fallback chain for recovering a package's sources.
///
/// Step N runs only after step N-1 failed; the first success terminates the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Scoped `conan install` + `conan source` into the package working directory.
    InstallAndSource,

    /// Direct archive download driven by the manifest the failed commands left in the
    /// working directory.
    WorkdirManifest,

    /// Direct archive download driven by the manifest in the package's export folder.
    ExportManifest,

    /// The package has a recipe but no manifest: force `conan source` to generate one, then
    /// download directly.
    ForcedSource,
}

pub const RECOVERY_CHAIN: [RecoveryStep; 4] = [
    RecoveryStep::InstallAndSource,
    RecoveryStep::WorkdirManifest,
    RecoveryStep::ExportManifest,
    RecoveryStep::ForcedSource,
];

/// What one strategy attempt produced.
#[derive(Debug)]
pub enum StepOutcome {
    /// Sources landed in the package working directory; the manifest governing the package was
    /// located at the given path, when one exists.
    Recovered { manifest: Option<PathBuf> },

    /// The step's preconditions are absent; it was not run.
    Unavailable,

    /// The step ran and failed. Per-package only, logged by the attempt.
    Failed,
}

/// Drive an ordered strategy chain to the first success.
///
/// Returns the winning step and the manifest it located, or `None` when the chain is exhausted.
pub async fn drive_chain<F>(steps: &[RecoveryStep], mut attempt: F) -> Option<(RecoveryStep, Option<PathBuf>)>
where
    F: AsyncFnMut(RecoveryStep) -> StepOutcome,
{
    for &step in steps {
        match attempt(step).await {
            StepOutcome::Recovered { manifest } => return Some((step, manifest)),
            StepOutcome::Unavailable | StepOutcome::Failed => {}
        }
    }

    None
}

/// Recovers missing dependency sources into per-package working directories.
#[derive(Debug)]
pub struct SourceRecovery<'a> {
    conan: &'a Conan,
    profile: &'a BuildProfile,
    work_root: PathBuf,
    http: reqwest::Client,
}

impl<'a> SourceRecovery<'a> {
    pub fn new(conan: &'a Conan, profile: &'a BuildProfile, work_root: PathBuf) -> Result<Self> {
        Ok(Self {
            conan,
            profile,
            work_root,
            http: reqwest::Client::builder().user_agent("conan-scout").build()?,
        })
    }

    /// Attempt recovery for every missing dependency; never fatal to the run.
    ///
    /// Returns the working directories of successfully recovered packages, in input order.
    pub async fn recover_missing(&self, deps: &mut [DependencyRecord], missing: &[String]) -> Vec<PathBuf> {
        log::info!(
            target: LOG_TARGET,
            "The following packages' source files are missing from the conan cache - will try to extract to {}:\n{}",
            self.work_root.display(),
            missing.join("\n")
        );

        let mut recovered = Vec::new();

        for reference in missing {
            let Some(dep) = deps.iter_mut().find(|d| &d.reference == reference) else {
                continue;
            };

            let package_dir = self.work_root.join(&dep.package_slug);
            if let Err(e) = fs::create_dir_all(&package_dir) {
                log::error!(target: LOG_TARGET, "Could not create working directory for {reference}: {e}");
                continue;
            }

            let outcome = drive_chain(&RECOVERY_CHAIN, async |step| self.attempt(step, dep, &package_dir).await).await;

            match outcome {
                Some((step, manifest)) => {
                    log::info!(target: LOG_TARGET, "Recovered {reference} into {} via {step:?}", package_dir.display());
                    dep.recovered_source_dir = Some(package_dir.clone());
                    dep.conandata_path = manifest;
                    recovered.push(package_dir);
                }
                None => log::warn!(target: LOG_TARGET, "{reference} source files were not found"),
            }
        }

        recovered
    }

    async fn attempt(&self, step: RecoveryStep, dep: &DependencyRecord, package_dir: &Path) -> StepOutcome {
        let recipe = dep.export_folder.join("conanfile.py");
        let workdir_manifest = package_dir.join("conandata.yml");
        let export_manifest = dep.export_folder.join("conandata.yml");

        match step {
            RecoveryStep::InstallAndSource => {
                if !recipe.is_file() {
                    return StepOutcome::Unavailable;
                }

                let install_ref = if dep.reference.contains('@') {
                    dep.reference.clone()
                } else {
                    format!("{}@", dep.reference)
                };

                let commands = async {
                    let _ = self.conan.install_package(package_dir, &dep.export_folder, &install_ref).await?;
                    self.conan.source_package(package_dir, &dep.export_folder).await
                };

                match commands.await {
                    Ok(_) => {
                        let manifest = [workdir_manifest, export_manifest].into_iter().find(|m| m.is_file());
                        StepOutcome::Recovered { manifest }
                    }
                    Err(e) => {
                        log::error!(target: LOG_TARGET, "install/source failed for {}: {e}", dep.reference);
                        StepOutcome::Failed
                    }
                }
            }

            RecoveryStep::WorkdirManifest => self.attempt_download(dep, package_dir, &workdir_manifest).await,

            RecoveryStep::ExportManifest => self.attempt_download(dep, package_dir, &export_manifest).await,

            RecoveryStep::ForcedSource => {
                if !recipe.is_file() {
                    return StepOutcome::Unavailable;
                }

                log::info!(
                    target: LOG_TARGET,
                    "{} conandata.yml is missing from {} - will try to get with conan source command",
                    dep.reference,
                    dep.export_folder.display()
                );

                if let Err(e) = self.conan.source_package(package_dir, &dep.export_folder).await {
                    log::error!(target: LOG_TARGET, "forced source run failed for {}: {e}", dep.reference);
                    return StepOutcome::Failed;
                }

                self.attempt_download(dep, package_dir, &workdir_manifest).await
            }
        }
    }

    async fn attempt_download(&self, dep: &DependencyRecord, package_dir: &Path, manifest: &Path) -> StepOutcome {
        if !manifest.is_file() {
            return StepOutcome::Unavailable;
        }

        log::info!(target: LOG_TARGET, "Will try to get source from {}", manifest.display());

        match self.download_archive(dep, package_dir, manifest).await {
            Ok(()) => StepOutcome::Recovered {
                manifest: Some(manifest.to_path_buf()),
            },
            Err(e) => {
                log::error!(target: LOG_TARGET, "Could not download source files for {}: {e:#}", dep.reference);
                StepOutcome::Failed
            }
        }
    }

    /// Fetch the upstream archive a manifest points at and persist it in the package directory.
    async fn download_archive(&self, dep: &DependencyRecord, package_dir: &Path, manifest: &Path) -> Result<()> {
        let url = extract_download_url(manifest, self.profile)
            .into_app_err_with(|| format!("the manifest for {} was not found or is not accessible", dep.reference))?;

        let Some(url) = url else {
            bail!("the url retrieved from {} is missing", manifest.display());
        };

        let parsed = url::Url::parse(&url).into_app_err_with(|| format!("the url retrieved from {} is invalid: {url}", manifest.display()))?;

        let archive_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("source-archive")
            .to_owned();

        let response = self
            .http
            .get(parsed)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .into_app_err_with(|| format!("request for '{url}' could not be sent"))?
            .error_for_status()
            .into_app_err_with(|| format!("request for '{url}' was rejected"))?;

        let bytes = response
            .bytes()
            .await
            .into_app_err_with(|| format!("could not read the archive body from '{url}'"))?;

        let target = package_dir.join(&archive_name);
        fs::write(&target, &bytes).into_app_err_with(|| format!("could not persist the archive at '{}'", target.display()))?;

        log::info!(
            target: LOG_TARGET,
            "{} source files were retrieved from {} and saved at {}",
            dep.reference,
            manifest.display(),
            package_dir.display()
        );
        Ok(())
    }
}
