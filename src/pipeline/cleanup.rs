use crate::agent::AGENT_WORK_PREFIX;
use crate::config::{Config, SCANNED_FOLDER_PREFIX, TEMP_FOLDER_PREFIX};
use std::fs;
use std::path::Path;

const LOG_TARGET: &str = "  cleanup";

/// Remove temp folders left behind by previous runs of the scanner and the agent.
pub fn remove_previous_run_folders(config: &Config) {
    remove_matching(config.install_folder.as_std_path(), TEMP_FOLDER_PREFIX);
    remove_matching(config.agent_path.as_std_path(), AGENT_WORK_PREFIX);
}

fn remove_matching(dir: &Path, prefix: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => log::info!(target: LOG_TARGET, "removed previous run folder:\n{}", path.display()),
            Err(e) => log::error!(target: LOG_TARGET, "Error: {} - {e}", path.display()),
        }
    }
}

/// Dispose of this run's install folder: delete it, or rename it into the project when the
/// user asked to keep it. Never fatal.
pub fn finish(config: &Config) {
    if config.keep_install_folder {
        let target = config
            .project_path
            .as_std_path()
            .join(format!("{SCANNED_FOLDER_PREFIX}{}", config.date_time_now));
        log::info!(target: LOG_TARGET, "renaming {} to {}", config.temp_dir.display(), target.display());

        if let Err(e) = fs::rename(&config.temp_dir, &target) {
            log::error!(target: LOG_TARGET, "Error: {} - {e}", config.temp_dir.display());
        }
    } else {
        match fs::remove_dir_all(&config.temp_dir) {
            Ok(()) => log::info!(target: LOG_TARGET, "removed install folder: {}", config.temp_dir.display()),
            Err(e) => log::error!(target: LOG_TARGET, "Error: {} - {e}", config.temp_dir.display()),
        }
    }
}
