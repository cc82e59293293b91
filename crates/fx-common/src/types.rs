//! Domain primitive types used across the fx workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FxError, Result};

/// Tag pulled when a reference names no tag.
pub const DEFAULT_TAG: &str = "latest";

/// Identifier of an image repository, optionally with a tag or digest.
///
/// Parsing only checks the shape the engine needs to split the reference;
/// the daemon stays the authority on whether the name is valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    /// Parses an image reference.
    ///
    /// # Errors
    ///
    /// Returns `FxError::Config` if the reference is empty or contains
    /// whitespace.
    pub fn parse(reference: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        if reference.is_empty() {
            return Err(FxError::Config {
                message: "image reference must not be empty".into(),
            });
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(FxError::Config {
                message: format!("image reference contains whitespace: {reference:?}"),
            });
        }
        Ok(Self(reference))
    }

    /// Returns the full reference as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repository part, without tag or digest.
    #[must_use]
    pub fn repository(&self) -> &str {
        let (repo, _) = self.split();
        repo
    }

    /// Explicit tag, if the reference carries one.
    ///
    /// A colon only starts a tag after the last `/`, so registry ports
    /// (`host:5000/app`) are not mistaken for tags.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        let (_, tag) = self.split();
        tag
    }

    /// Tag to request from the registry when pulling.
    ///
    /// Digest references return the digest; untagged references resolve to
    /// [`DEFAULT_TAG`].
    #[must_use]
    pub fn pull_tag(&self) -> &str {
        if let Some((_, digest)) = self.0.split_once('@') {
            return digest;
        }
        self.tag().unwrap_or(DEFAULT_TAG)
    }

    fn split(&self) -> (&str, Option<&str>) {
        if let Some((repo, _)) = self.0.split_once('@') {
            return (repo, None);
        }
        let name_start = self.0.rfind('/').map_or(0, |i| i + 1);
        match self.0[name_start..].rfind(':') {
            Some(i) => {
                let at = name_start + i;
                (&self.0[..at], Some(&self.0[at + 1..]))
            }
            None => (&self.0, None),
        }
    }
}

impl FromStr for ImageRef {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = FxError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned identifier of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve characters, as engines print ids.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binding of the container's internal TCP port to a host TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Port published on the host.
    pub host_port: u16,
}

impl PortBinding {
    /// Binds the fixed service port to `host_port`.
    #[must_use]
    pub const fn to_host(host_port: u16) -> Self {
        Self {
            container_port: crate::constants::CONTAINER_PORT,
            host_port,
        }
    }

    /// Engine port key, e.g. `3000/tcp`.
    #[must_use]
    pub fn container_port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }

    /// Host interface the port is published on.
    #[must_use]
    pub const fn host_ip(&self) -> &'static str {
        crate::constants::BIND_ALL_INTERFACES
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}/tcp",
            self.host_ip(),
            self.host_port,
            self.container_port
        )
    }
}

/// Lifecycle state of a container managed by fx.
///
/// Transitions only move forward; restarting requires a fresh create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Created by the engine but not yet started.
    Created,
    /// Started and presumed running.
    Started,
    /// Stopped, gracefully or by timeout.
    Stopped,
    /// Removed from the engine.
    Removed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Removed => write!(f, "removed"),
        }
    }
}
