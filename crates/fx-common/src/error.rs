//! Unified error types for the fx workspace.
//!
//! Remote failures carry the identifier of the image or container involved
//! and the daemon's message, so callers can log a diagnosable line without
//! this crate formatting user-facing text.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ContainerId, ContainerState};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FxError {
    /// The container engine daemon could not be reached.
    #[error("container engine unavailable: {message}")]
    EngineUnavailable {
        /// Transport or daemon message.
        message: String,
    },

    /// Pulling an image failed.
    #[error("pull of {reference} failed: {message}")]
    PullFailed {
        /// Image reference that was being pulled.
        reference: String,
        /// Transport, registry, or daemon message.
        message: String,
    },

    /// Building an image failed.
    #[error("build of {image} failed: {reason}")]
    BuildFailed {
        /// Tag the image was being built as.
        image: String,
        /// What went wrong while packaging, submitting, or consuming the build.
        reason: String,
    },

    /// Creating a container failed.
    #[error("creating container from {image} failed: {message}")]
    ContainerCreateFailed {
        /// Image the container was being created from.
        image: String,
        /// Daemon message.
        message: String,
    },

    /// A container was created but could not be started.
    #[error("starting container {id} failed: {message}")]
    ContainerStartFailed {
        /// Identifier of the created container.
        id: ContainerId,
        /// Daemon message.
        message: String,
    },

    /// Stopping or removing a container failed.
    #[error("{op} of container {id} failed: {message}")]
    ContainerOpFailed {
        /// Operation name (`stop`, `remove`).
        op: &'static str,
        /// Container the operation targeted.
        id: ContainerId,
        /// Daemon message.
        message: String,
    },

    /// Removing an image failed.
    #[error("removal of image {image} failed: {message}")]
    ImageRemoveFailed {
        /// Image identifier or reference.
        image: String,
        /// Daemon message.
        message: String,
    },

    /// A lifecycle operation was requested from a state that forbids it.
    #[error("cannot {op} container {id} while {state}")]
    InvalidTransition {
        /// Requested operation.
        op: &'static str,
        /// Container the operation targeted.
        id: ContainerId,
        /// State the container was in.
        state: ContainerState,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl FxError {
    /// Short machine-friendly name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EngineUnavailable { .. } => "engine_unavailable",
            Self::PullFailed { .. } => "pull_failed",
            Self::BuildFailed { .. } => "build_failed",
            Self::ContainerCreateFailed { .. } => "container_create_failed",
            Self::ContainerStartFailed { .. } => "container_start_failed",
            Self::ContainerOpFailed { .. } => "container_op_failed",
            Self::ImageRemoveFailed { .. } => "image_remove_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Io { .. } => "io",
            Self::Config { .. } => "config",
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FxError>;
