//! System-wide constants.

use std::time::Duration;

/// Base images every supported runtime is built on, one per language.
pub const DEFAULT_BASE_IMAGES: [&str; 5] = [
    "metrue/fx-java-base",
    "metrue/fx-julia-base",
    "metrue/fx-python-base",
    "metrue/fx-node-base",
    "metrue/fx-d-base",
];

/// Port the function service listens on inside every container.
pub const CONTAINER_PORT: u16 = 3000;

/// Host interface published ports are bound to.
pub const BIND_ALL_INTERFACES: &str = "0.0.0.0";

/// Grace period given to a container before the engine kills it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Build descriptor expected at the root of every build context.
pub const BUILD_DESCRIPTOR: &str = "Dockerfile";

/// Label key marking images built by fx.
pub const OWNER_LABEL_KEY: &str = "belong-to";

/// Label value marking images built by fx.
pub const OWNER_LABEL_VALUE: &str = "fx";

/// Default number of concurrent pulls.
pub const DEFAULT_PULL_CONCURRENCY: usize = 4;

/// Default timeout for a single engine request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FX_CONFIG";

/// Application name used in CLI output.
pub const APP_NAME: &str = "fx";
