//! Container lifecycle management.
//!
//! Each container fx runs moves through `Created -> Started -> Stopped ->
//! Removed`, never backwards. The engine is the source of truth; a
//! [`ManagedContainer`] only tracks what this process has done to it.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fx_common::error::{FxError, Result};
use fx_common::types::{ContainerId, ContainerState, PortBinding};
use fx_engine::EngineClient;
use serde::Serialize;

/// A container and the lifecycle state fx last drove it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedContainer {
    id: ContainerId,
    image: Option<String>,
    binding: Option<PortBinding>,
    state: ContainerState,
    created_at: DateTime<Utc>,
}

impl ManagedContainer {
    /// Engine-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Image the container runs, if known.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Published port, if known.
    #[must_use]
    pub const fn binding(&self) -> Option<PortBinding> {
        self.binding
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// When fx created or adopted the container.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure(&self, op: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(FxError::InvalidTransition {
                op,
                id: self.id.clone(),
                state: self.state,
            })
        }
    }
}

/// Drives containers through their lifecycle on one engine.
#[derive(Clone)]
pub struct LifecycleManager {
    engine: Arc<dyn EngineClient>,
    cleanup_failed_deploy: bool,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("cleanup_failed_deploy", &self.cleanup_failed_deploy)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Creates a manager. With `cleanup_failed_deploy`, a container that was
    /// created but could not be started is removed again.
    #[must_use]
    pub fn new(engine: Arc<dyn EngineClient>, cleanup_failed_deploy: bool) -> Self {
        Self {
            engine,
            cleanup_failed_deploy,
        }
    }

    /// Creates and starts a container from image `name`, publishing the
    /// service port on `host_port`.
    ///
    /// # Errors
    ///
    /// Returns `FxError::ContainerCreateFailed` or
    /// `FxError::ContainerStartFailed` from the engine. The start error is
    /// returned even when the compensating removal succeeds.
    pub async fn deploy(&self, name: &str, dir: &Path, host_port: u16) -> Result<ManagedContainer> {
        match self.engine.deploy(name, dir, host_port).await {
            Ok(deployed) => {
                for warning in &deployed.warnings {
                    tracing::warn!(id = %deployed.id, warning = %warning, "engine warning");
                }
                Ok(ManagedContainer {
                    id: deployed.id,
                    image: Some(deployed.image),
                    binding: Some(deployed.binding),
                    state: ContainerState::Started,
                    created_at: Utc::now(),
                })
            }
            Err(FxError::ContainerStartFailed { id, message }) => {
                if self.cleanup_failed_deploy {
                    match self.engine.remove(&id).await {
                        Ok(()) => tracing::info!(id = %id, "removed container that failed to start"),
                        Err(e) => tracing::warn!(
                            id = %id,
                            error = %e,
                            "could not remove container that failed to start"
                        ),
                    }
                }
                Err(FxError::ContainerStartFailed { id, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Tracks a container started by an earlier process.
    ///
    /// The container is assumed to be started; image and binding are unknown.
    #[must_use]
    pub fn adopt(&self, id: ContainerId) -> ManagedContainer {
        ManagedContainer {
            id,
            image: None,
            binding: None,
            state: ContainerState::Started,
            created_at: Utc::now(),
        }
    }

    /// Stops a started container. A stop that runs into the grace timeout
    /// still counts as success.
    ///
    /// # Errors
    ///
    /// Returns `FxError::InvalidTransition` unless the container is started,
    /// or `FxError::ContainerOpFailed` from the engine.
    pub async fn stop(&self, container: &mut ManagedContainer) -> Result<()> {
        container.ensure("stop", container.state == ContainerState::Started)?;
        self.engine.stop(&container.id).await?;
        container.state = ContainerState::Stopped;
        Ok(())
    }

    /// Force-removes a container in any state but `Removed`.
    ///
    /// # Errors
    ///
    /// Returns `FxError::InvalidTransition` if already removed, or
    /// `FxError::ContainerOpFailed` from the engine.
    pub async fn remove(&self, container: &mut ManagedContainer) -> Result<()> {
        container.ensure("remove", container.state != ContainerState::Removed)?;
        self.engine.remove(&container.id).await?;
        container.state = ContainerState::Removed;
        Ok(())
    }

    /// Stops, then removes a container. Removal is attempted even if the
    /// stop fails, and a successful removal makes the teardown succeed.
    ///
    /// # Errors
    ///
    /// Returns the removal error, or `FxError::InvalidTransition` if the
    /// container is already removed.
    pub async fn teardown(&self, container: &mut ManagedContainer) -> Result<()> {
        if container.state == ContainerState::Started {
            if let Err(e) = self.stop(container).await {
                tracing::warn!(id = %container.id, error = %e, "stop failed, forcing removal");
            }
        }
        self.remove(container).await
    }
}

#[cfg(test)]
mod tests {
    use fx_engine::FakeEngine;
    use fx_engine::fake::EngineCall;

    use super::*;

    fn manager(engine: &Arc<FakeEngine>, cleanup: bool) -> LifecycleManager {
        LifecycleManager::new(engine.clone(), cleanup)
    }

    #[tokio::test]
    async fn deploy_starts_container() {
        let engine = Arc::new(FakeEngine::new());
        let container = manager(&engine, true)
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect("deploy");
        assert_eq!(container.state(), ContainerState::Started);
        assert_eq!(container.binding(), Some(PortBinding::to_host(8080)));
        assert_eq!(container.image(), Some("fx/hello"));
    }

    #[tokio::test]
    async fn start_failure_removes_created_container() {
        let engine = Arc::new(FakeEngine::new().failing_start());
        let err = manager(&engine, true)
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect_err("start fails");
        assert_eq!(err.kind(), "container_start_failed");
        assert!(engine.containers().is_empty());
        assert!(engine.calls().iter().any(|c| matches!(c, EngineCall::Remove(_))));
    }

    #[tokio::test]
    async fn start_failure_leaves_container_without_cleanup() {
        let engine = Arc::new(FakeEngine::new().failing_start());
        let _ = manager(&engine, false)
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect_err("start fails");
        assert_eq!(engine.containers().len(), 1);
    }

    #[tokio::test]
    async fn create_failure_does_not_remove_anything() {
        let engine = Arc::new(FakeEngine::new().failing_create());
        let err = manager(&engine, true)
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect_err("create fails");
        assert_eq!(err.kind(), "container_create_failed");
        assert!(!engine.calls().iter().any(|c| matches!(c, EngineCall::Remove(_))));
    }

    #[tokio::test]
    async fn stop_requires_started() {
        let engine = Arc::new(FakeEngine::new());
        let lifecycle = manager(&engine, true);
        let mut container = lifecycle
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect("deploy");

        lifecycle.stop(&mut container).await.expect("stop");
        let err = lifecycle.stop(&mut container).await.expect_err("already stopped");
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(err.to_string(), format!("cannot stop container {} while stopped", container.id()));
    }

    #[tokio::test]
    async fn remove_is_allowed_while_started() {
        let engine = Arc::new(FakeEngine::new());
        let lifecycle = manager(&engine, true);
        let mut container = lifecycle
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect("deploy");

        lifecycle.remove(&mut container).await.expect("force remove");
        assert_eq!(container.state(), ContainerState::Removed);
        let err = lifecycle.remove(&mut container).await.expect_err("already removed");
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[tokio::test]
    async fn teardown_removes_even_when_stop_fails() {
        let engine = Arc::new(FakeEngine::new().failing_stop());
        let lifecycle = manager(&engine, true);
        let mut container = lifecycle
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect("deploy");

        lifecycle.teardown(&mut container).await.expect("teardown");
        assert_eq!(container.state(), ContainerState::Removed);
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn adopted_container_can_be_torn_down() {
        let engine = Arc::new(FakeEngine::new());
        let lifecycle = manager(&engine, true);
        let deployed = engine
            .deploy("fx/hello", Path::new("."), 9090)
            .await
            .expect("deploy");

        let mut container = lifecycle.adopt(deployed.id);
        assert!(container.image().is_none());
        lifecycle.teardown(&mut container).await.expect("teardown");
        assert!(engine.containers().is_empty());
    }
}
