//! Engine client abstraction.
//!
//! Everything above this crate talks to the container engine through
//! [`EngineClient`]; the daemon-backed and in-memory implementations are
//! interchangeable behind `Arc<dyn EngineClient>`.

use std::path::Path;

use async_trait::async_trait;
use fx_common::error::Result;
use fx_common::types::{ContainerId, ImageRef, PortBinding};

/// A container that was created and started by [`EngineClient::deploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContainer {
    /// Engine-assigned identifier.
    pub id: ContainerId,
    /// Image the container runs.
    pub image: String,
    /// The container's single port binding.
    pub binding: PortBinding,
    /// Warnings the engine reported while creating the container.
    pub warnings: Vec<String>,
}

/// Stateless facade over a container engine.
///
/// Implementations hold no mutable state besides the connection handle,
/// so a single client may be shared by concurrent tasks. No operation
/// retries on failure.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Lists repo tags of images matching `reference`.
    ///
    /// Returns an empty list when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `FxError::EngineUnavailable` if the engine cannot be queried.
    async fn list_images_with_reference(&self, reference: &ImageRef) -> Result<Vec<String>>;

    /// Pulls `reference` from its registry.
    ///
    /// Success only means the pull stream ended without an error object;
    /// the resulting image is not re-checked against `reference`.
    ///
    /// # Errors
    ///
    /// Returns `FxError::PullFailed` on transport, registry, or daemon error.
    async fn pull(&self, reference: &ImageRef) -> Result<()>;

    /// Builds the directory `dir` into an image tagged `name`.
    ///
    /// # Errors
    ///
    /// Returns `FxError::BuildFailed` if the context cannot be packaged or
    /// read, the engine rejects the request, or a build log line is malformed.
    async fn build(&self, name: &str, dir: &Path) -> Result<()>;

    /// Creates and starts a container from image `name`, publishing the
    /// service port on `host_port`.
    ///
    /// `dir` is the build context the image came from; it is recorded in
    /// logs only.
    ///
    /// # Errors
    ///
    /// Returns `FxError::ContainerCreateFailed` if creation fails, or
    /// `FxError::ContainerStartFailed` (carrying the created id) if start fails.
    async fn deploy(&self, name: &str, dir: &Path, host_port: u16) -> Result<DeployedContainer>;

    /// Stops a container, giving it one second before it is killed.
    ///
    /// # Errors
    ///
    /// Returns `FxError::ContainerOpFailed` on daemon error.
    async fn stop(&self, id: &ContainerId) -> Result<()>;

    /// Force-removes a container, running or not.
    ///
    /// # Errors
    ///
    /// Returns `FxError::ContainerOpFailed` on daemon error.
    async fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Force-removes an image by id or reference.
    ///
    /// # Errors
    ///
    /// Returns `FxError::ImageRemoveFailed` on daemon error.
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Whether the engine answers a liveness query.
    async fn is_running(&self) -> bool;
}
