use crate::Result;
use crate::config::Config;
use ohno::{IntoAppError, bail};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;

const LOG_TARGET: &str = "    agent";

/// Name of the scanning-agent executable, expected in the configured agent directory.
pub const AGENT_EXECUTABLE: &str = "sca-agent";

/// Prefix of the work folders the agent leaves behind, removed on the next run.
pub const AGENT_WORK_PREFIX: &str = "sca-agent-work_";

/// Everything under the scan targets is eligible.
const INCLUDE_GLOB: &str = "**/*.*";

/// Generated package-manager artifacts that must never be scanned as project sources, appended
/// on top of any user-configured exclusions.
const FIXED_EXCLUDES: &str = "**/conan_scout_scanned_*,**/*conan_export.tgz,**/*conan_package.tgz,**/*conanfile.py,\
    **/node_modules,**/src/test,**/testdata,**/*sources.jar,**/*javadoc.jar";

/// Nested source archives are common in recovered packages; always extract as deep as possible.
const ARCHIVE_EXTRACTION_DEPTH: &str = "7";

/// Pattern to extract the upload tracking token from the agent's output
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[Ss]upport [Tt]oken:\s*(\S+)").expect("invalid regex"));

/// Result of one agent invocation.
#[derive(Debug, Clone)]
pub struct ScanSubmission {
    /// Human-readable scan summary from the agent's output.
    pub summary: String,

    /// Opaque token used to poll the backend for upload completion.
    pub request_token: String,
}

/// Invoker for the external scanning agent.
#[derive(Debug)]
pub struct ScanAgent {
    executable: PathBuf,
    api_url: String,
    user_key: String,
    org_token: String,
    product_name: Option<String>,
    product_token: Option<String>,
    project_name: Option<String>,
    project_token: Option<String>,
}

impl ScanAgent {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            executable: config.agent_path.as_std_path().join(AGENT_EXECUTABLE),
            api_url: config.api_url.clone(),
            user_key: config.user_key.clone(),
            org_token: config.org_token.clone(),
            product_name: config.product_name.clone(),
            product_token: config.product_token.clone(),
            project_name: config.project_name.clone(),
            project_token: config.project_token.clone(),
        }
    }

    /// Scan the given directories, returning the agent's summary and the upload token.
    ///
    /// The agent reads its file-selection settings from the environment; user-configured
    /// exclusions are preserved and the fixed package-manager exclusions appended.
    pub async fn scan(&self, scan_dirs: &[PathBuf]) -> Result<ScanSubmission> {
        let dirs = scan_dirs.iter().map(|d| d.display().to_string()).collect::<Vec<_>>().join(",");

        let excludes = match std::env::var("SCA_EXCLUDES") {
            Ok(user_excludes) if !user_excludes.is_empty() => format!("{user_excludes},{FIXED_EXCLUDES}"),
            _ => FIXED_EXCLUDES.to_owned(),
        };

        let mut command = Command::new(&self.executable);
        let _ = command
            .arg("-d")
            .arg(&dirs)
            .env("SCA_URL", &self.api_url)
            .env("SCA_USER_KEY", &self.user_key)
            .env("SCA_API_KEY", &self.org_token)
            .env("SCA_INCLUDES", INCLUDE_GLOB)
            .env("SCA_EXCLUDES", &excludes)
            .env("SCA_ARCHIVE_EXTRACTION_DEPTH", ARCHIVE_EXTRACTION_DEPTH);

        if let Some(product_name) = &self.product_name {
            let _ = command.arg("-product").arg(product_name);
        }
        if let Some(product_token) = &self.product_token {
            let _ = command.arg("-productToken").arg(product_token);
        }
        if let Some(project_name) = &self.project_name {
            let _ = command.arg("-project").arg(project_name);
        }
        if let Some(project_token) = &self.project_token {
            let _ = command.arg("-projectToken").arg(project_token);
        }

        log::info!(target: LOG_TARGET, "Dispatching scan of: {dirs}");

        let output = command
            .output()
            .await
            .into_app_err_with(|| format!("could not run the scanning agent '{}'", self.executable.display()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            bail!("the scanning agent failed with {}:\n{text}", output.status);
        }

        let request_token = parse_request_token(&text)
            .ok_or_else(|| ohno::app_err!("the scanning agent's output carries no upload tracking token:\n{text}"))?;

        Ok(ScanSubmission {
            summary: text,
            request_token,
        })
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Pull the upload tracking token out of the agent's output.
#[must_use]
pub fn parse_request_token(output: &str) -> Option<String> {
    TOKEN_REGEX.captures(output).map(|caps| caps[1].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_token() {
        let output = "Scanned 1234 files\nSupport Token: 4f1f-ab3c-99\nDone.";
        assert_eq!(parse_request_token(output), Some("4f1f-ab3c-99".to_owned()));

        assert_eq!(parse_request_token("support token:  tok123"), Some("tok123".to_owned()));
        assert_eq!(parse_request_token("no token here"), None);
    }
}
