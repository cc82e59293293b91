//! # fx-engine
//!
//! Client side of the container engine for fx.
//!
//! Handles:
//! - **Client**: The [`EngineClient`](client::EngineClient) contract every other crate talks to.
//! - **Context**: Packaging a directory into a tar build context.
//! - **Build log**: Decoding the engine's newline-delimited JSON build stream.
//! - **Docker**: The daemon-backed implementation over the Docker Engine API.
//! - **Fake**: An in-memory engine used as a test double.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod build_log;
pub mod client;
pub mod context;
pub mod docker;
pub mod fake;

pub use client::{DeployedContainer, EngineClient};
pub use docker::DockerEngine;
pub use fake::FakeEngine;
