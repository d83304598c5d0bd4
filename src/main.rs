//! A tool to orchestrate software-composition-analysis scans of Conan-managed C/C++ projects.
//!
//! # Overview
//!
//! `conan-scout` discovers a Conan project's full dependency graph, locates or recovers each
//! dependency's source files, hands the resolved directories to an external scanning agent, and
//! then corrects source-file-to-library attribution in the backend analysis service.
//!
//! The run proceeds through six stages:
//!
//! 1. **Profile resolution** — the configured Conan build profile is read once and its settings
//!    (OS, architecture, compiler) are used later to disambiguate platform-conditional download
//!    URLs in `conandata.yml` manifests.
//! 2. **Dependency mapping** — `conan info` lists every dependency together with its cache
//!    paths and revision.
//! 3. **Source recovery** — dependencies whose cache source folder is missing are recovered
//!    through an ordered chain of strategies, falling back to downloading the upstream archive
//!    declared in the package manifest.
//! 4. **Index reconciliation** — each dependency's upstream URL is cross-referenced against the
//!    canonical library index and the matching identity is synced with the backend.
//! 5. **Scan dispatch** — all resolved source directories are scanned by the external agent and
//!    the upload is polled to completion.
//! 6. **Source reattribution** — a three-phase matching pass reassigns mis-attributed source
//!    files to the correct library records.
//!
//! # Basic Usage
//!
//! Scan the project in `./myproject`:
//!
//! ```bash
//! conan-scout \
//!   --api-url https://backend.example.com \
//!   --user-key $USER_KEY \
//!   --org-token $ORG_TOKEN \
//!   --project-path ./myproject \
//!   --product-name MyProduct \
//!   --project-name MyProject
//! ```
//!
//! Use a named Conan profile and skip build-time-only requirements:
//!
//! ```bash
//! conan-scout ... --profile-name linux-gcc11 --include-build-requires false
//! ```
//!
//! Keep the per-run install folder for inspection instead of deleting it:
//!
//! ```bash
//! conan-scout ... --keep-install-folder true
//! ```
//!
//! # Exit Codes
//!
//! - `0`: the scan ran to completion (individual package failures are logged, not fatal)
//! - non-zero: a fatal precondition failed — Conan missing or misconfigured, the named profile
//!   was not found, no supported conanfile in the project, the dependency listing failed, or the
//!   scan upload failed or timed out
//!
//! # Diagnostics
//!
//! `--log-level debug` traces every Conan invocation, archive download, and backend call.
//! Per-package recovery and matching failures are logged with the affected reference and the
//! run continues; best-effort reconciliation across hundreds of packages must not be sunk by
//! one bad package.

use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use conan_scout::Result;
use conan_scout::config::{Args, Config};
use conan_scout::pipeline;

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "conan-scout", version, about, styles = CLAP_STYLES)]
struct Cli {
    #[command(flatten)]
    args: Args,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    cli.args.init_logging();

    let config = Config::new(cli.args).await?;
    pipeline::run(&config).await
}
