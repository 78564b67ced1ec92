// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Command-line interface for the badge rotator.
//!
//! `run` executes one rotation and prints the outcome as JSON, `preview`
//! renders the styled page for a local HTML document and `check` validates a
//! configuration and the secrets supplied through the environment.

use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
};

use badge_rotator::{
    Config, Error, RunOutcome, Secrets, Stage, StageFailure, extract_fragment, install_crypto_provider, load_config,
    month_of, preflight, run, wrap,
};
use chrono::{Local, Month};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line interface for the monthly badge rotation.
#[derive(Debug, Parser,)]
#[command(name = "badge-rotator", version, about = "Rotate a monthly impact badge into a repository")]
struct Cli
{
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand,)]
/// Supported commands exposed by the CLI.
enum Command
{
    /// Run the full rotation pipeline once.
    Run(RunArgs,),
    /// Extract and wrap a local HTML document without network access.
    Preview(PreviewArgs,),
    /// Validate configuration and secrets without running the pipeline.
    Check(CheckArgs,),
}

#[derive(Debug, Args,)]
struct RunArgs
{
    /// Path to the YAML configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config: PathBuf,

    /// Month to name the branch and pull request after; defaults to the
    /// current month.
    #[arg(long = "month", value_name = "MONTH")]
    month: Option<Month,>,

    /// Output formatted JSON for easier inspection.
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pretty: bool,

    #[command(flatten)]
    secrets: SecretArgs,
}

#[derive(Debug, Args,)]
struct PreviewArgs
{
    /// HTML document containing the badge anchor.
    #[arg(long = "input", value_name = "PATH")]
    input: PathBuf,

    /// Write the page to a file instead of stdout.
    #[arg(long = "output", value_name = "PATH")]
    output: Option<PathBuf,>,
}

#[derive(Debug, Args,)]
struct CheckArgs
{
    /// Path to the YAML configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config: PathBuf,

    #[command(flatten)]
    secrets: SecretArgs,
}

/// Secrets, usually supplied through the environment.
#[derive(Debug, Args, Default,)]
struct SecretArgs
{
    /// User id for the render service.
    #[arg(long = "render-user-id", env = "RENDER_USER_ID", hide_env_values = true)]
    render_user_id: Option<String,>,

    /// API key for the render service.
    #[arg(long = "render-api-key", env = "RENDER_API_KEY", hide_env_values = true)]
    render_api_key: Option<String,>,

    /// Token used for pushing and opening the pull request.
    #[arg(long = "github-token", env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String,>,
}

impl From<SecretArgs,> for Secrets
{
    fn from(args: SecretArgs,) -> Self
    {
        Self {
            render_user_id: args.render_user_id,
            render_api_key: args.render_api_key,
            github_token:   args.github_token,
        }
    }
}

/// Entry point that reports errors and sets the appropriate exit status.
#[tokio::main]
async fn main()
{
    init_tracing();
    install_crypto_provider();

    let cli = Cli::parse();
    match dispatch(cli.command,).await {
        Ok(code,) => process::exit(code,),
        Err(error,) => {
            eprintln!("{}", error.to_display_string());
            process::exit(if error.is_configuration() { 2 } else { 1 },);
        }
    }
}

/// Installs a stderr subscriber honouring `RUST_LOG`, defaulting to `info`.
fn init_tracing()
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),);
    tracing_subscriber::fmt().with_env_filter(filter,).with_writer(io::stderr,).init();
}

/// Executes a parsed command and returns the process exit code.
///
/// # Errors
///
/// Propagates input and serialization failures of the selected command.
async fn dispatch(command: Command,) -> Result<i32, Error,>
{
    match command {
        Command::Run(args,) => run_pipeline(args,).await,
        Command::Preview(args,) => run_preview(&args,).map(|()| 0,),
        Command::Check(args,) => run_check(args,),
    }
}

async fn run_pipeline(args: RunArgs,) -> Result<i32, Error,>
{
    let month = args.month.unwrap_or_else(|| month_of(&Local::now(),),);
    let secrets = Secrets::from(args.secrets,);

    let result = match read_config(&args.config,) {
        Ok(config,) => run(&config, &secrets, month,).await,
        Err(error,) => Err(StageFailure {
            stage: Stage::Preflight,
            error,
        },),
    };
    let outcome = RunOutcome::from_result(&result,);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_outcome(&mut handle, &outcome, args.pretty,)?;

    Ok(outcome.exit_code(),)
}

fn run_preview(args: &PreviewArgs,) -> Result<(), Error,>
{
    let document = fs::read_to_string(&args.input,).map_err(|e| badge_rotator::io_error(&args.input, e,),)?;
    let page = wrap(&extract_fragment(&document,)?,);

    match &args.output {
        Some(path,) => {
            fs::write(path, page.as_bytes(),).map_err(|e| badge_rotator::io_error(path, e,),)?;
            info!("Wrote preview to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            io::Write::write_all(&mut handle, page.as_bytes(),)
                .map_err(|e| badge_rotator::io_error(Path::new("<stdout>",), e,),)?;
        }
    }

    Ok((),)
}

fn run_check(args: CheckArgs,) -> Result<i32, Error,>
{
    let config = read_config(&args.config,)?;
    preflight(&config, &Secrets::from(args.secrets,),)?;
    info!("Configuration {} is valid", args.config.display());
    Ok(0,)
}

/// Loads the configuration, treating an unreadable file as a caller error.
fn read_config(path: &Path,) -> Result<Config, Error,>
{
    load_config(path,).map_err(|error| match error {
        Error::Io {
            ..
        } => Error::configuration(error.to_display_string(),),
        other => other,
    },)
}

fn write_outcome<W: io::Write,>(writer: &mut W, outcome: &RunOutcome, pretty: bool,) -> Result<(), Error,>
{
    if pretty {
        serde_json::to_writer_pretty(writer, outcome,)?;
    } else {
        serde_json::to_writer(writer, outcome,)?;
    }

    Ok((),)
}

#[cfg(test)]
mod tests
{
    use std::{fs, io::Cursor, path::Path};

    use badge_rotator::{RunOutcome, Stage, VIEWPORT_CSS};
    use chrono::Month;
    use clap::Parser;
    use tempfile::tempdir;

    use super::{
        CheckArgs, Cli, Command, PreviewArgs, RunArgs, SecretArgs, read_config, run_check, run_pipeline, run_preview,
        write_outcome,
    };

    const CONFIG: &str = r#"
source_url: https://badges.example/logo/octocat
store:
  backend: filesystem
  root: /tmp/badge-rotator-store
repository:
  owner: octocat
  name: site
"#;

    #[test]
    fn cli_parses_run_with_month()
    {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "run",
            "--config",
            "config.yaml",
            "--month",
            "October",
            "--render-user-id",
            "user",
        ],)
        .expect("failed to parse CLI",);

        let args = match cli.command {
            Command::Run(args,) => args,
            other => panic!("unexpected command variant: {other:?}"),
        };
        assert_eq!(args.config, Path::new("config.yaml"));
        assert_eq!(args.month, Some(Month::October));
        assert_eq!(args.secrets.render_user_id.as_deref(), Some("user"));
        assert!(!args.pretty);
    }

    #[test]
    fn cli_requires_subcommand()
    {
        assert!(Cli::try_parse_from([env!("CARGO_PKG_NAME")],).is_err());
    }

    #[test]
    fn preview_writes_wrapped_badge()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let input = temp.path().join("page.html",);
        let output = temp.path().join("badge.html",);
        fs::write(&input, r#"<html><body><p>intro</p><a href="/b">CO₂ offset</a></body></html>"#,)
            .expect("failed to write input",);

        run_preview(&PreviewArgs {
            input:  input.clone(),
            output: Some(output.clone(),),
        },)
        .expect("preview failed",);

        let page = fs::read_to_string(&output,).expect("failed to read preview",);
        assert!(page.contains(r#"<a href="/b">CO2 offset</a>"#));
        assert!(page.contains(VIEWPORT_CSS));
    }

    #[test]
    fn preview_reports_missing_anchor()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let input = temp.path().join("page.html",);
        fs::write(&input, "<p>no badge here</p>",).expect("failed to write input",);

        let error = run_preview(&PreviewArgs {
            input,
            output: None,
        },)
        .expect_err("expected extraction error",);
        assert!(matches!(error, badge_rotator::Error::Extraction { .. }));
    }

    #[test]
    fn check_reports_missing_secrets()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let config = temp.path().join("config.yaml",);
        fs::write(&config, CONFIG,).expect("failed to write config",);

        let error = run_check(CheckArgs {
            config,
            secrets: SecretArgs::default(),
        },)
        .expect_err("expected configuration error",);
        assert!(error.is_configuration());
        assert!(error.to_string().contains("render API key"));
    }

    #[test]
    fn check_accepts_complete_configuration()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let config = temp.path().join("config.yaml",);
        fs::write(&config, CONFIG,).expect("failed to write config",);

        let code = run_check(CheckArgs {
            config,
            secrets: SecretArgs {
                render_user_id: Some("user".to_owned(),),
                render_api_key: Some("key".to_owned(),),
                github_token:   Some("ghp_token".to_owned(),),
            },
        },)
        .expect("check failed",);
        assert_eq!(code, 0);
    }

    #[test]
    fn unreadable_config_is_a_caller_error()
    {
        let error = read_config(Path::new("/nonexistent/badge-rotator.yaml",),).expect_err("expected error",);
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn run_without_secrets_exits_with_caller_error()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let config = temp.path().join("config.yaml",);
        fs::write(&config, CONFIG,).expect("failed to write config",);

        let code = run_pipeline(RunArgs {
            config,
            month: Some(Month::May,),
            pretty: false,
            secrets: SecretArgs::default(),
        },)
        .await
        .expect("outcome should be written",);
        assert_eq!(code, 2);
    }

    #[test]
    fn outcome_is_written_as_compact_json()
    {
        let outcome = RunOutcome {
            status:           500,
            stage:            Some(Stage::Render,),
            message:          "render service error (empty body): nothing".to_owned(),
            pull_request_url: None,
        };
        let mut buffer = Cursor::new(Vec::new(),);
        write_outcome(&mut buffer, &outcome, false,).expect("failed to serialize outcome",);

        let output = String::from_utf8(buffer.into_inner(),).expect("invalid UTF-8",);
        assert_eq!(output, r#"{"status":500,"stage":"render","message":"render service error (empty body): nothing"}"#);
    }
}
