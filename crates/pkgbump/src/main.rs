mod apply;
mod check;
mod error;
mod logging;
mod settings;
mod toggles;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{debug, error, warn};
use pkgbump_core::{CheckOutput, DecisionConfig, build_client};

use crate::error::AppError;
use crate::settings::{Settings, default_max_log_size_bytes};
use crate::toggles::EnvToggles;

#[derive(Debug, Parser)]
#[allow(clippy::struct_excessive_bools)]
#[command(
    name = "pkgbump",
    version,
    about = "Keep a PKGBUILD in sync with the latest upstream Cursor release."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Recipe file to read and rewrite.
    #[arg(long, global = true, default_value = "PKGBUILD")]
    recipe: PathBuf,

    /// Handoff file written by `check` and `run`.
    #[arg(long, global = true, default_value = "check_output.json")]
    handoff: PathBuf,

    /// Settings file (default: pkgbump.json in the working directory, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit debug output (also enabled by `DEBUG=true`).
    #[arg(long, global = true)]
    debug: bool,

    /// Only accept strictly newer upstream versions in version-based mode
    /// (also enabled by `VERSION_PROTECTION=true`).
    #[arg(long, global = true)]
    version_protection: bool,

    /// Detect updates from version changes instead of upstream commit changes
    /// (same as `COMMIT_BASED_UPDATES=false`).
    #[arg(long, global = true)]
    version_based: bool,

    /// Resolve the bundled Electron runtime and rewrite the runtime lines
    /// (also enabled by `TRACK_RUNTIME=true`).
    #[arg(long, global = true)]
    track_runtime: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check for a new upstream release and write the handoff file.
    Check,
    /// Rewrite the recipe from a handoff file.
    Apply {
        /// Handoff file produced by `check`.
        #[arg(value_name = "HANDOFF")]
        file: PathBuf,
    },
    /// Check, then apply the result in one go.
    Run,
}

/// Everything a phase needs, resolved once per invocation.
pub(crate) struct Session {
    pub client: reqwest::Client,
    pub settings: Settings,
    pub decision: DecisionConfig,
    pub track_runtime: bool,
    pub recipe_path: PathBuf,
    pub handoff_path: PathBuf,
}

impl Session {
    fn new(cli: &Cli, env: &EnvToggles, settings: Settings) -> Result<Self, AppError> {
        let client = build_client(&settings.user_agent, settings.connect_timeout())?;

        let mut decision = settings.decision_config();
        decision.commit_based =
            !cli.version_based && env.commit_based_updates.unwrap_or(decision.commit_based);
        decision.version_protection = toggles::resolve(
            cli.version_protection,
            env.version_protection,
            decision.version_protection,
        );
        let track_runtime =
            toggles::resolve(cli.track_runtime, env.track_runtime, settings.track_runtime);

        Ok(Self {
            client,
            settings,
            decision,
            track_runtime,
            recipe_path: cli.recipe.clone(),
            handoff_path: cli.handoff.clone(),
        })
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let env = EnvToggles::from_env();
    let settings = Settings::load(cli.config.as_deref());
    let max_log_size = settings
        .as_ref()
        .map_or_else(|_| default_max_log_size_bytes(), |settings| settings.max_log_size_bytes);
    logging::init_logging(
        toggles::resolve(cli.debug, env.debug, false),
        cli.log_file.as_deref(),
        max_log_size,
    );
    for warning in &env.warnings {
        warn!("{warning}");
    }

    match settings
        .map_err(AppError::from)
        .and_then(|settings| run(&cli, &env, settings))
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, env: &EnvToggles, settings: Settings) -> Result<(), AppError> {
    let session = Session::new(cli, env, settings)?;
    debug!(
        "Commit-based updates: {}, version protection: {}, runtime tracking: {}",
        session.decision.commit_based, session.decision.version_protection, session.track_runtime
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    runtime.block_on(async {
        match &cli.command {
            Command::Check => {
                check::run_check(&session).await?;
            }
            Command::Apply { file } => {
                let output = read_handoff(file)?;
                apply::run_apply(&session, &output).await?;
            }
            Command::Run => {
                let output = check::run_check(&session).await?;
                apply::run_apply(&session, &output).await?;
            }
        }
        Ok::<(), AppError>(())
    })
}

fn read_handoff(path: &Path) -> Result<CheckOutput, AppError> {
    debug!("Reading check output from {}", path.display());
    let output = CheckOutput::read(path)?;
    debug!(
        "Handoff: update needed {}, new version {}, release {}, commit {}",
        output.update_needed, output.new_version, output.new_rel, output.new_commit
    );
    Ok(output)
}
