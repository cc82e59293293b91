//! `fx down`: Stop and remove a container.

use anyhow::Context as _;
use clap::Args;
use fx_common::types::ContainerId;
use fx_runtime::LifecycleManager;

use super::Session;
use crate::output;

/// Arguments for the `down` command.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Container ID (full or short) as printed by `fx up`.
    pub id: String,
}

/// Executes the `down` command.
///
/// # Errors
///
/// Returns an error if the container cannot be removed.
pub async fn execute(session: &Session, args: DownArgs) -> anyhow::Result<()> {
    let lifecycle = LifecycleManager::new(session.engine.clone(), session.config.cleanup_failed_deploy);
    let mut container = lifecycle.adopt(ContainerId::new(args.id));
    lifecycle
        .teardown(&mut container)
        .await
        .with_context(|| format!("tearing down {}", container.id()))?;
    output::success(&format!("container {} removed", container.id()));
    Ok(())
}
