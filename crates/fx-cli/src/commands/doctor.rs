//! `fx doctor`: Check that the container engine answers.

use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `doctor` command.
#[derive(Args, Debug)]
pub struct DoctorArgs {}

/// Executes the `doctor` command.
///
/// # Errors
///
/// Returns an error if the engine does not answer a liveness query.
pub async fn execute(session: &Session, _args: DoctorArgs) -> anyhow::Result<()> {
    let host = session.config.docker_host.as_deref().unwrap_or("local default");
    if session.engine.is_running().await {
        output::success(&format!("container engine is running ({host})"));
        Ok(())
    } else {
        output::failure(&format!("container engine is not reachable ({host})"));
        anyhow::bail!("container engine is not running")
    }
}
