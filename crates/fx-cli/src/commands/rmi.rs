//! `fx rmi`: Remove an image.

use anyhow::Context as _;
use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `rmi` command.
#[derive(Args, Debug)]
pub struct RmiArgs {
    /// Image ID or reference.
    pub image: String,
}

/// Executes the `rmi` command.
///
/// # Errors
///
/// Returns an error if the engine refuses to remove the image.
pub async fn execute(session: &Session, args: RmiArgs) -> anyhow::Result<()> {
    session
        .engine
        .remove_image(&args.image)
        .await
        .with_context(|| format!("removing image {}", args.image))?;
    output::success(&format!("removed {}", args.image));
    Ok(())
}
