//! `fx init`: Make sure every base image is present.

use clap::Args;
use fx_runtime::{Provisioner, Provisioning};

use super::Session;
use crate::output;

/// Arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Print the pull report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `init` command.
///
/// Every base image is mandatory: a single failed pull fails the command.
///
/// # Errors
///
/// Returns an error if the engine is unreachable or any pull fails.
pub async fn execute(session: &Session, args: InitArgs) -> anyhow::Result<()> {
    let provisioner = Provisioner::from_config(session.engine.clone(), &session.config);
    let outcome = provisioner.ensure_ready().await?;

    match &outcome {
        Provisioning::AlreadyReady => {
            output::success(&format!(
                "all {} base images are present",
                provisioner.catalog().len()
            ));
        }
        Provisioning::Pulled(report) if args.json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        Provisioning::Pulled(report) => output::print_pull_report(report),
    }

    if outcome.is_complete() {
        Ok(())
    } else {
        anyhow::bail!("some base images could not be pulled")
    }
}
