use camino::Utf8PathBuf;
use clap::{ArgAction, ValueEnum};

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Command-line arguments for a scan run
#[derive(clap::Args, Debug)]
pub struct Args {
    /// The backend organization URL
    #[arg(long, short = 'u', value_name = "URL", env = "CONAN_SCOUT_API_URL", help_heading = "Backend Connection")]
    pub api_url: String,

    /// The admin user key
    #[arg(
        long,
        short = 'k',
        value_name = "KEY",
        env = "CONAN_SCOUT_USER_KEY",
        hide_env_values = true,
        help_heading = "Backend Connection"
    )]
    pub user_key: String,

    /// The organization token
    #[arg(
        long,
        short = 't',
        value_name = "TOKEN",
        env = "CONAN_SCOUT_ORG_TOKEN",
        hide_env_values = true,
        help_heading = "Backend Connection"
    )]
    pub org_token: String,

    /// The product token - only required if the product name is not defined
    #[arg(long, value_name = "TOKEN", help_heading = "Product / Project")]
    pub product_token: Option<String>,

    /// The project token - only required if the project name is not defined
    #[arg(long, value_name = "TOKEN", help_heading = "Product / Project")]
    pub project_token: Option<String>,

    /// The product name - only required if the product token is not defined
    #[arg(long, value_name = "NAME", help_heading = "Product / Project")]
    pub product_name: Option<String>,

    /// The project name - only required if the project token is not defined
    #[arg(long, value_name = "NAME", help_heading = "Product / Project")]
    pub project_name: Option<String>,

    /// The directory containing the project's conanfile.txt / conanfile.py
    #[arg(long, short = 'd', value_name = "PATH")]
    pub project_path: Utf8PathBuf,

    /// The directory containing the scanning agent [default: the project path]
    #[arg(long, short = 'a', value_name = "PATH")]
    pub agent_path: Option<Utf8PathBuf>,

    /// The folder under which per-run package install output is placed [default: the project path]
    #[arg(long, short = 'i', value_name = "PATH")]
    pub install_folder: Option<Utf8PathBuf>,

    /// The name of the Conan profile used to resolve platform-conditional URLs
    #[arg(long, short = 'f', value_name = "NAME", default_value = "default", help_heading = "Conan")]
    pub profile_name: String,

    /// The package_name/package_version[@user/channel] coordinate of the project's conanfile package
    #[arg(long, short = 'm', value_name = "REF", help_heading = "Conan")]
    pub main_package: Option<String>,

    /// Retrieve and scan the source files of the project's conanfile.py recipe via its source method
    #[arg(long, short = 'r', value_name = "BOOL", default_value_t = true, action = ArgAction::Set, help_heading = "Conan")]
    pub resolve_main_package: bool,

    /// Run `conan install --build` as a pre-step before mapping dependencies
    #[arg(long, short = 'p', value_name = "BOOL", default_value_t = false, action = ArgAction::Set, help_heading = "Conan")]
    pub run_pre_step: bool,

    /// Include build-time-only requirements when listing dependencies
    #[arg(long, short = 'b', value_name = "BOOL", default_value_t = true, action = ArgAction::Set, help_heading = "Conan")]
    pub include_build_requires: bool,

    /// Keep the per-run install folder after the run instead of deleting it
    #[arg(long, short = 's', value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    pub keep_install_folder: bool,

    /// Correct source-file-to-library attribution in the backend after the scan
    #[arg(long, short = 'g', value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub change_origin_library: bool,

    /// Additional shell commands to run before the dependency mapping
    #[arg(long, short = 'q', value_name = "COMMAND", num_args = 1.., help_heading = "Conan")]
    pub additional_commands: Vec<String>,

    /// Maximum seconds to wait for the scan upload to complete (0 disables the timeout)
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    pub scan_status_timeout: u64,

    /// Where the canonical library index CSV is fetched from
    #[arg(long, value_name = "URL", default_value = crate::index::DEFAULT_INDEX_URL, help_heading = "Backend Connection")]
    pub index_url: String,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Args {
    /// Initialize logger based on log level
    pub fn init_logging(&self) {
        if self.log_level == LogLevel::None {
            return;
        }

        let level = match self.log_level {
            LogLevel::None => return, // Already checked above, but being explicit
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        let env = env_logger::Env::default().filter_or("RUST_LOG", level);

        env_logger::Builder::from_env(env)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(matches!(self.log_level, LogLevel::Debug) || matches!(self.log_level, LogLevel::Trace))
            .init();
    }
}
