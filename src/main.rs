use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use build_numbers::config::{self, BuildNumbersConfig, Overrides};
use build_numbers::output::{self, OutputSink};
use build_numbers::protocol::{self, Request};
use build_numbers::store::Identifier;
use build_numbers::telemetry;
use build_numbers_git::{CliRepo, GitRepo as _};
use clap::{ArgAction, Parser};
use tracing::error;

/// Monotonic build numbers stored on a git branch
///
/// Reads the counter for IDENTIFIER from a JSON document on a dedicated
/// branch and, unless told otherwise, advances it and pushes the result.
/// Prints `build-number=<n>` and, inside GitHub Actions, also sets the
/// `build-number` step output and the `BUILD_NUMBER` environment variable.
///
/// Every flag can be supplied as an action input through the matching
/// `INPUT_*` environment variable.
#[derive(Parser, Debug)]
#[command(name = "build-numbers")]
#[command(version, about)]
struct Cli {
    /// Counter to read or advance (e.g. `app-release`)
    #[arg(long, env = "INPUT_IDENTIFIER")]
    identifier: Identifier,

    /// Branch holding the counters [default: from config, else build-numbers]
    #[arg(long, env = "INPUT_BRANCH")]
    branch: Option<String>,

    /// Advance the counter; `false` only reads it (a new counter still starts at 1)
    #[arg(
        long,
        env = "INPUT_INCREMENT",
        default_value = "true",
        value_parser = config::parse_action_bool,
        action = ArgAction::Set
    )]
    increment: bool,

    /// Remote to sync with [default: from config, else origin]
    #[arg(long)]
    remote: Option<String>,

    /// Retries after a rejected push [default: from config, else 0]
    #[arg(long)]
    push_retries: Option<u32>,

    /// Config file [default: <repo>/.github/build-numbers.toml]
    #[arg(long, env = "BUILD_NUMBERS_CONFIG")]
    config: Option<PathBuf>,

    /// Any path inside the repository
    #[arg(long, default_value = ".")]
    repo: PathBuf,
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            let summary = e.to_string();
            println!(
                "{}",
                output::failure_annotation(summary.lines().next().unwrap_or_default())
            );
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            println!("{}", output::failure_annotation(&format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let repo = CliRepo::open(&cli.repo)
        .with_context(|| format!("opening repository at {}", cli.repo.display()))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| repo.root().join(config::DEFAULT_CONFIG_PATH));
    let settings = BuildNumbersConfig::load(&config_path)?.resolve(&Overrides {
        branch: cli.branch.clone(),
        remote: cli.remote.clone(),
        push_retries: cli.push_retries,
    })?;

    let request = Request {
        identifier: cli.identifier.clone(),
        increment: cli.increment,
    };
    let outcome = protocol::run(&repo, &settings, &request)?;

    OutputSink::from_env()
        .publish(outcome.value, &mut std::io::stdout().lock())
        .context("publishing build number")?;
    Ok(())
}
