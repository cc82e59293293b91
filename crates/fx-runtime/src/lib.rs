//! # fx-runtime
//!
//! Orchestration on top of an [`EngineClient`](fx_engine::EngineClient):
//! - **Readiness**: whether every base image is present locally.
//! - **Puller**: pulling a base-image catalog through a bounded task pool.
//! - **Lifecycle**: driving containers from started to removed.
//! - **Session**: the provisioning sequence run by `fx init`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod lifecycle;
pub mod puller;
pub mod readiness;
pub mod session;

pub use lifecycle::{LifecycleManager, ManagedContainer};
pub use puller::{ImagePuller, PullOutcome, PullReport};
pub use readiness::is_ready;
pub use session::{Provisioner, Provisioning};
