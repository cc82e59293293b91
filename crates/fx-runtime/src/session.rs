//! Base-image provisioning for a session.
//!
//! Combines the liveness check, the readiness check and the puller into the
//! sequence `fx init` runs before any function can be built.

use std::sync::Arc;

use fx_common::config::{BaseImageCatalog, FxConfig};
use fx_common::error::{FxError, Result};
use fx_engine::EngineClient;

use crate::puller::{ImagePuller, PullReport};
use crate::readiness;

/// What [`Provisioner::ensure_ready`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    /// Every base image was already present.
    AlreadyReady,
    /// At least one image was missing, so the whole catalog was pulled.
    Pulled(PullReport),
}

impl Provisioning {
    /// Whether every base image is now believed present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::AlreadyReady => true,
            Self::Pulled(report) => report.is_complete(),
        }
    }
}

/// Makes sure a catalog of base images is available on one engine.
#[derive(Clone)]
pub struct Provisioner {
    engine: Arc<dyn EngineClient>,
    catalog: BaseImageCatalog,
    puller: ImagePuller,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("catalog", &self.catalog)
            .field("puller", &self.puller)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner for `catalog`.
    #[must_use]
    pub fn new(engine: Arc<dyn EngineClient>, catalog: BaseImageCatalog, puller: ImagePuller) -> Self {
        Self {
            engine,
            catalog,
            puller,
        }
    }

    /// Creates a provisioner from the catalog and pull limit in `config`.
    #[must_use]
    pub fn from_config(engine: Arc<dyn EngineClient>, config: &FxConfig) -> Self {
        let puller = ImagePuller::new(Arc::clone(&engine), config.pull_concurrency);
        Self::new(engine, config.base_images.clone(), puller)
    }

    /// The catalog being provisioned.
    #[must_use]
    pub const fn catalog(&self) -> &BaseImageCatalog {
        &self.catalog
    }

    /// Checks readiness and pulls the whole catalog if anything is missing.
    ///
    /// # Errors
    ///
    /// Returns `FxError::EngineUnavailable` if the engine does not answer a
    /// liveness query. Pull failures are reported in the returned value.
    pub async fn ensure_ready(&self) -> Result<Provisioning> {
        if !self.engine.is_running().await {
            return Err(FxError::EngineUnavailable {
                message: "engine did not answer the liveness query".into(),
            });
        }

        if readiness::is_ready(self.engine.as_ref(), &self.catalog).await {
            tracing::info!(images = self.catalog.len(), "base images ready");
            return Ok(Provisioning::AlreadyReady);
        }

        Ok(Provisioning::Pulled(self.puller.pull_all(&self.catalog).await))
    }
}

#[cfg(test)]
mod tests {
    use fx_common::types::ImageRef;
    use fx_engine::FakeEngine;

    use super::*;

    fn config(refs: &[&str]) -> FxConfig {
        FxConfig {
            base_images: BaseImageCatalog::new(
                refs.iter().map(|r| ImageRef::parse(*r).expect("ref")).collect(),
            )
            .expect("catalog"),
            ..FxConfig::default()
        }
    }

    #[tokio::test]
    async fn ready_catalog_is_not_pulled() {
        let engine = Arc::new(FakeEngine::new().with_image("org/a:latest"));
        let provisioner = Provisioner::from_config(engine.clone(), &config(&["org/a"]));

        let outcome = provisioner.ensure_ready().await.expect("provision");
        assert_eq!(outcome, Provisioning::AlreadyReady);
        assert!(engine.pulls().is_empty());
    }

    #[tokio::test]
    async fn missing_image_pulls_whole_catalog() {
        let engine = Arc::new(FakeEngine::new().with_image("org/a:latest"));
        let provisioner = Provisioner::from_config(engine.clone(), &config(&["org/a", "org/b"]));

        let outcome = provisioner.ensure_ready().await.expect("provision");
        assert!(outcome.is_complete());
        assert_eq!(engine.pulls().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_engine_is_an_error() {
        let engine = Arc::new(FakeEngine::new().unreachable());
        let provisioner = Provisioner::from_config(engine.clone(), &config(&["org/a"]));

        let err = provisioner.ensure_ready().await.expect_err("unreachable");
        assert_eq!(err.kind(), "engine_unavailable");
        assert!(engine.pulls().is_empty());
    }
}
