//! Configuration model for an fx session.
//!
//! The base-image catalog lives here rather than in a global so that the
//! readiness checker and the puller receive it explicitly.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{FxError, Result};
use crate::types::ImageRef;

/// Immutable set of image references that must be present on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ImageRef>", into = "Vec<ImageRef>")]
pub struct BaseImageCatalog(Vec<ImageRef>);

impl BaseImageCatalog {
    /// Builds a catalog from references.
    ///
    /// # Errors
    ///
    /// Returns `FxError::Config` if a reference appears twice.
    pub fn new(images: Vec<ImageRef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for image in &images {
            if !seen.insert(image.as_str()) {
                return Err(FxError::Config {
                    message: format!("duplicate base image: {image}"),
                });
            }
        }
        Ok(Self(images))
    }

    /// References in declaration order.
    #[must_use]
    pub fn images(&self) -> &[ImageRef] {
        &self.0
    }

    /// Number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BaseImageCatalog {
    fn default() -> Self {
        Self(
            constants::DEFAULT_BASE_IMAGES
                .iter()
                .filter_map(|r| ImageRef::parse(*r).ok())
                .collect(),
        )
    }
}

impl TryFrom<Vec<ImageRef>> for BaseImageCatalog {
    type Error = FxError;

    fn try_from(value: Vec<ImageRef>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BaseImageCatalog> for Vec<ImageRef> {
    fn from(value: BaseImageCatalog) -> Self {
        value.0
    }
}

impl<'a> IntoIterator for &'a BaseImageCatalog {
    type Item = &'a ImageRef;
    type IntoIter = std::slice::Iter<'a, ImageRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Root configuration for fx.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FxConfig {
    /// Images that must be present before functions can be built.
    pub base_images: BaseImageCatalog,
    /// Maximum number of pulls in flight at once.
    pub pull_concurrency: NonZeroUsize,
    /// Remove a container that was created but failed to start.
    pub cleanup_failed_deploy: bool,
    /// Gzip the build context before sending it to the engine.
    pub compress_build_context: bool,
    /// Engine endpoint (`unix://`, `tcp://` or `http://`). Local defaults when unset.
    pub docker_host: Option<String>,
    /// Timeout applied to each engine request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            base_images: BaseImageCatalog::default(),
            pull_concurrency: NonZeroUsize::new(constants::DEFAULT_PULL_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
            cleanup_failed_deploy: true,
            compress_build_context: false,
            docker_host: None,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl FxConfig {
    /// Loads configuration from a YAML file, or defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("no configuration file, using defaults");
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| FxError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), images = config.base_images.len(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `FxError::Config` if the text is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| FxError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `FxError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(FxError::Config {
                message: "request_timeout_secs must be positive".into(),
            });
        }
        if let Some(host) = &self.docker_host {
            let known = ["unix://", "tcp://", "http://"];
            if !known.iter().any(|scheme| host.starts_with(scheme)) {
                return Err(FxError::Config {
                    message: format!("unsupported docker_host scheme: {host}"),
                });
            }
        }
        Ok(())
    }

    /// Request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
