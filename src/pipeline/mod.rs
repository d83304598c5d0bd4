mod cleanup;

pub mod deps;
pub mod reconcile;
pub mod recovery;
pub mod remap;
pub mod scan;

use crate::Result;
use crate::agent::ScanAgent;
use crate::conan::{BuildProfile, Conan, run_shell_command};
use crate::config::Config;
use crate::index::CanonicalIndex;
use crate::pipeline::deps::RecipeKind;
use crate::pipeline::recovery::SourceRecovery;
use ohno::IntoAppError;
use std::fs;
use std::time::Instant;

const LOG_TARGET: &str = " pipeline";

/// Run the whole scan pipeline for the configured project.
///
/// Fatal preconditions (missing Conan, missing profile, no conanfile, listing failure, upload
/// failure) propagate; everything else is best-effort per package.
pub async fn run(config: &Config) -> Result<()> {
    cleanup::remove_previous_run_folders(config);

    let started = Instant::now();
    log::info!(target: LOG_TARGET, "Start running conan-scout on token {}.", config.org_token);

    let conan = Conan::new(&config.profile_name);
    conan.assert_installed().await?;

    let profile = BuildProfile::resolve(&conan).await?;

    run_additional_commands(config).await;

    let recipe_kind = deps::validate_project_manifest(config.project_path.as_std_path())?;

    fs::create_dir_all(&config.temp_dir).into_app_err_with(|| format!("could not create '{}'", config.temp_dir.display()))?;

    let mut dependencies = deps::map_dependencies(&conan, config).await?;

    if config.run_pre_step {
        log::info!(target: LOG_TARGET, "Running conan install pre-step");
        if let Err(e) = conan.install_project(&config.install_ref, &config.temp_dir).await {
            log::error!(target: LOG_TARGET, "conan install pre-step failed: {e}");
        } else {
            log::info!(target: LOG_TARGET, "installation completed, install folder: {}", config.temp_dir.display());
        }
    }

    // The project's own sources, when its py recipe declares how to fetch them.
    if config.resolve_main_package && config.main_package.is_none() && recipe_kind == RecipeKind::Recipe {
        if let Err(e) = conan.source_project(config.project_path.as_std_path(), &config.temp_dir).await {
            log::error!(target: LOG_TARGET, "could not resolve the main package sources: {e}");
        }
    }

    let mut scan_dirs = vec![config.project_path.as_std_path().to_path_buf()];

    let missing = deps::missing_source_folders(&dependencies);

    if !missing.is_empty() {
        let work_root = config.temp_dir.join("temp_deps");
        let recovery = SourceRecovery::new(&conan, &profile, work_root)?;
        scan_dirs.extend(recovery.recover_missing(&mut dependencies, &missing).await);
    }

    scan_dirs.extend(deps::cached_source_folders(&mut dependencies, &missing));

    let index = match CanonicalIndex::fetch(&config.index_url).await {
        Ok(index) => index,
        Err(e) => {
            log::warn!(target: LOG_TARGET, "Proceeding without the canonical index: {e:#}");
            CanonicalIndex::default()
        }
    };

    reconcile::reconcile(&mut dependencies, &index, &config.backend, &profile).await;

    let agent = ScanAgent::new(config);
    scan::dispatch(config, &agent, &scan_dirs).await?;

    if config.change_origin_library {
        remap::change_source_file_inventory_match(config, &mut dependencies).await?;
    }

    log::info!(target: LOG_TARGET, "Finished running conan-scout. Run time: {:.2?}", started.elapsed());

    cleanup::finish(config);
    Ok(())
}

/// User-supplied commands that must run before dependency mapping; failures are logged only.
async fn run_additional_commands(config: &Config) {
    for command in &config.additional_commands {
        if let Err(e) = run_shell_command(command).await {
            log::error!(target: LOG_TARGET, "additional command failed: {e}");
        }
    }
}
