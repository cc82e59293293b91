//! `fx build`: Build a function directory into an image.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Tag for the resulting image.
    pub name: String,

    /// Directory containing the Dockerfile and function sources.
    pub dir: PathBuf,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if packaging or the build fails.
pub async fn execute(session: &Session, args: BuildArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    session
        .engine
        .build(&args.name, &args.dir)
        .await
        .with_context(|| format!("building {} from {}", args.name, args.dir.display()))?;
    output::success(&format!(
        "built {} in {}",
        args.name,
        output::format_duration(started.elapsed())
    ));
    Ok(())
}
