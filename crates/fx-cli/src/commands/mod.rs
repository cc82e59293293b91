//! CLI command definitions and dispatch.

pub mod build;
pub mod doctor;
pub mod down;
pub mod init;
pub mod rmi;
pub mod up;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use fx_common::config::FxConfig;
use fx_common::constants::{APP_NAME, CONFIG_ENV};
use fx_engine::{DockerEngine, EngineClient};

/// Build functions into images and run them as containers.
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the container engine answers.
    Doctor(doctor::DoctorArgs),
    /// Make sure every base image is present, pulling if needed.
    Init(init::InitArgs),
    /// Build a function directory into an image.
    Build(build::BuildArgs),
    /// Run an image as a container with its service port published.
    Up(up::UpArgs),
    /// Stop and remove a container.
    Down(down::DownArgs),
    /// Remove an image.
    Rmi(rmi::RmiArgs),
}

/// Shared state for a single command invocation.
pub struct Session {
    /// Loaded configuration.
    pub config: FxConfig,
    /// Engine every command talks to.
    pub engine: Arc<dyn EngineClient>,
}

impl Session {
    fn open(config_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let config = FxConfig::load(config_path).context("loading configuration")?;
        let engine = DockerEngine::connect(&config).context("connecting to the container engine")?;
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(cli.config.as_deref())?;
    match cli.command {
        Command::Doctor(args) => doctor::execute(&session, args).await,
        Command::Init(args) => init::execute(&session, args).await,
        Command::Build(args) => build::execute(&session, args).await,
        Command::Up(args) => up::execute(&session, args).await,
        Command::Down(args) => down::execute(&session, args).await,
        Command::Rmi(args) => rmi::execute(&session, args).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn up_parses_port_and_detach() {
        let cli = Cli::try_parse_from(["fx", "up", "fx/hello", "--port", "8080", "--detach"])
            .expect("parse");
        match cli.command {
            Command::Up(args) => {
                assert_eq!(args.name, "fx/hello");
                assert_eq!(args.port, 8080);
                assert!(args.detach);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_format_accepts_json() {
        let cli = Cli::try_parse_from(["fx", "--log-format", "json", "doctor"]).expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn build_requires_directory() {
        assert!(Cli::try_parse_from(["fx", "build", "fx/hello"]).is_err());
    }
}
