//! `fx up`: Run an image as a container with its service port published.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use fx_runtime::LifecycleManager;

use super::Session;
use crate::output;

/// Arguments for the `up` command.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Image to run.
    pub name: String,

    /// Host port the service port is published on.
    #[arg(short, long)]
    pub port: u16,

    /// Build context the image came from.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Leave the container running and return immediately.
    #[arg(short, long)]
    pub detach: bool,
}

/// Executes the `up` command.
///
/// In the foreground, waits for Ctrl+C and then tears the container down.
///
/// # Errors
///
/// Returns an error if the container cannot be deployed or torn down.
pub async fn execute(session: &Session, args: UpArgs) -> anyhow::Result<()> {
    let lifecycle = LifecycleManager::new(session.engine.clone(), session.config.cleanup_failed_deploy);
    let mut container = lifecycle
        .deploy(&args.name, &args.dir, args.port)
        .await
        .with_context(|| format!("deploying {}", args.name))?;

    output::print_container(&container);

    if args.detach {
        eprintln!();
        eprintln!(
            "  Running detached. Use {}fx down {}{} to stop it.",
            output::BOLD,
            container.id().short(),
            output::RESET
        );
        return Ok(());
    }

    eprintln!();
    eprintln!("  Press {}Ctrl+C{} to stop the container...", output::BOLD, output::RESET);
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    eprintln!();
    lifecycle
        .teardown(&mut container)
        .await
        .with_context(|| format!("tearing down {}", container.id()))?;
    output::success(&format!("container {} removed", container.id().short()));
    Ok(())
}
