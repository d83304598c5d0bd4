use crate::Result;
use ohno::{IntoAppError, bail};
use std::path::Path;
use tokio::process::Command;

const LOG_TARGET: &str = "    conan";

/// Run a command line through the platform shell, capturing stdout and stderr combined.
///
/// A non-zero exit status is an error carrying the captured output, so callers can surface the
/// tool's own diagnostics.
pub async fn run_shell_command(command: &str) -> Result<String> {
    log::info!(target: LOG_TARGET, "Going to run the following command:\n{command}");

    #[cfg(windows)]
    let output = Command::new("cmd").arg("/C").arg(command).output().await;
    #[cfg(not(windows))]
    let output = Command::new("sh").arg("-c").arg(command).output().await;

    let output = output.into_app_err_with(|| format!("could not spawn command '{command}'"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        bail!("command '{command}' failed with {}:\n{text}", output.status);
    }

    log::debug!(target: LOG_TARGET, "{text}");
    Ok(text)
}

/// Wrapper over the Conan command-line tool.
///
/// Every operation is one blocking shell invocation; Conan's own output is captured and logged.
#[derive(Debug, Clone)]
pub struct Conan {
    profile_name: String,
}

impl Conan {
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
        }
    }

    /// Validate Conan is installed by retrieving its version banner.
    pub async fn assert_installed(&self) -> Result<()> {
        let version = run_shell_command("conan --version")
            .await
            .into_app_err("please check Conan is installed and configured properly")?;

        if !version.contains("Conan version") {
            bail!("please check Conan is installed and configured properly; got: {version}");
        }

        log::info!(target: LOG_TARGET, "Conan identified - {}", version.trim());
        Ok(())
    }

    /// Fail when the configured profile does not exist.
    pub async fn assert_profile_exists(&self) -> Result<()> {
        let _ = run_shell_command(&format!("conan profile show {}", self.profile_name))
            .await
            .into_app_err_with(|| format!("conan profile was not found: {}", self.profile_name))?;
        Ok(())
    }

    /// Read one profile setting; a missing setting resolves to an empty string.
    pub async fn profile_setting(&self, key: &str) -> String {
        match run_shell_command(&format!("conan profile get settings.{key} {}", self.profile_name)).await {
            Ok(output) => output.lines().next().unwrap_or_default().to_owned(),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Profile setting '{key}' is not defined: {e}");
                String::new()
            }
        }
    }

    /// List the full dependency graph as JSON written to `json_path`.
    pub async fn info_json(&self, install_ref: &str, dry_build: bool, json_path: &Path) -> Result<String> {
        let dry_build = if dry_build { " --dry-build" } else { "" };
        run_shell_command(&format!(
            "conan info {install_ref} --paths{dry_build} --json {}",
            json_path.display()
        ))
        .await
    }

    /// Pre-step install of the whole project, building everything from source.
    pub async fn install_project(&self, install_ref: &str, install_folder: &Path) -> Result<String> {
        run_shell_command(&format!(
            "conan install {install_ref} --install-folder {} --build --profile:build {}",
            install_folder.display(),
            self.profile_name
        ))
        .await
    }

    /// Install a single exported package into a scoped working directory.
    pub async fn install_package(&self, package_dir: &Path, export_folder: &Path, reference: &str) -> Result<String> {
        run_shell_command(&format!(
            "conan install --install-folder {} {} {reference} --profile:build {}",
            package_dir.display(),
            export_folder.display(),
            self.profile_name
        ))
        .await
    }

    /// Run a package recipe's source method into a scoped working directory.
    pub async fn source_package(&self, package_dir: &Path, export_folder: &Path) -> Result<String> {
        run_shell_command(&format!(
            "conan source --source-folder {} --install-folder {} {}",
            package_dir.display(),
            package_dir.display(),
            export_folder.display()
        ))
        .await
    }

    /// Run the project recipe's source method into the given folder.
    pub async fn source_project(&self, project_path: &Path, source_folder: &Path) -> Result<String> {
        run_shell_command(&format!(
            "conan source {} --source-folder {}",
            project_path.display(),
            source_folder.display()
        ))
        .await
    }
}
