use crate::Result;
use crate::backend::Client;
use crate::config::Args;
use camino::Utf8PathBuf;
use chrono::Local;
use ohno::bail;
use std::path::PathBuf;

const LOG_TARGET: &str = "   config";

/// Prefix of the per-run working folder created under the install folder.
pub const TEMP_FOLDER_PREFIX: &str = "conan_scout_pre_process_";

/// Prefix used when a kept install folder is renamed into the project at the end of a run.
pub const SCANNED_FOLDER_PREFIX: &str = "conan_scout_scanned_";

/// Fully resolved run configuration.
///
/// Built once from the parsed arguments, enriched with the derived run state (timestamp, temp
/// dir, install reference, backend connection) and never mutated afterwards.
#[derive(Debug)]
pub struct Config {
    pub api_url: String,
    pub user_key: String,
    pub org_token: String,

    pub product_token: Option<String>,
    pub project_token: Option<String>,
    pub product_name: Option<String>,
    pub project_name: Option<String>,

    pub project_path: Utf8PathBuf,
    pub agent_path: Utf8PathBuf,
    pub install_folder: Utf8PathBuf,

    pub profile_name: String,
    pub main_package: Option<String>,
    pub resolve_main_package: bool,
    pub run_pre_step: bool,
    pub include_build_requires: bool,

    pub keep_install_folder: bool,
    pub change_origin_library: bool,
    pub additional_commands: Vec<String>,
    pub scan_status_timeout: u64,
    pub index_url: String,

    /// Timestamp identifying this run, `YmdHMS%6f` formatted.
    pub date_time_now: String,

    /// Per-run working directory: `<install_folder>/conan_scout_pre_process_<timestamp>`.
    pub temp_dir: PathBuf,

    /// What `conan info` / `conan install` are pointed at: the project path, or the explicit
    /// main-package coordinate with `@` appended when user/channel are absent.
    pub install_ref: String,

    pub backend: Client,

    /// Organization display name, fetched once at startup as a connection test.
    pub org_name: String,
}

impl Config {
    /// Build the run configuration from parsed arguments.
    ///
    /// Fails when the project path is not a directory or the backend connection test fails;
    /// both are fatal preconditions.
    pub async fn new(args: Args) -> Result<Self> {
        if !args.project_path.is_dir() {
            bail!("project path '{}' is not a directory", args.project_path);
        }

        let agent_path = args.agent_path.unwrap_or_else(|| args.project_path.clone());
        let install_folder = args.install_folder.unwrap_or_else(|| args.project_path.clone());

        let date_time_now = Local::now().format("%Y%m%d%H%M%S%6f").to_string();
        let temp_dir = install_folder
            .as_std_path()
            .join(format!("{TEMP_FOLDER_PREFIX}{date_time_now}"));

        let install_ref = match &args.main_package {
            Some(main_package) if main_package.contains('@') => main_package.clone(),
            Some(main_package) => format!("{main_package}@"),
            None => args.project_path.to_string(),
        };

        let backend = Client::new(&args.api_url, &args.user_key, &args.org_token)?;

        // Connection test; nothing downstream can work without a reachable backend.
        let org = backend.get_organization_details().await?;
        log::info!(target: LOG_TARGET, "Connected to organization '{}' at {}", org.org_name, args.api_url);

        Ok(Self {
            api_url: args.api_url,
            user_key: args.user_key,
            org_token: args.org_token,
            product_token: args.product_token,
            project_token: args.project_token,
            product_name: args.product_name,
            project_name: args.project_name,
            project_path: args.project_path,
            agent_path,
            install_folder,
            profile_name: args.profile_name,
            main_package: args.main_package,
            resolve_main_package: args.resolve_main_package,
            run_pre_step: args.run_pre_step,
            include_build_requires: args.include_build_requires,
            keep_install_folder: args.keep_install_folder,
            change_origin_library: args.change_origin_library,
            additional_commands: args.additional_commands,
            scan_status_timeout: args.scan_status_timeout,
            index_url: args.index_url,
            date_time_now,
            temp_dir,
            install_ref,
            backend,
            org_name: org.org_name,
        })
    }
}
