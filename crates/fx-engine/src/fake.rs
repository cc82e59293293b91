//! In-memory engine used as a test double.
//!
//! [`FakeEngine`] keeps images and containers in memory, records every call
//! it receives, and can be told to fail specific operations. Builds still
//! package the real directory so context errors surface the same way they
//! do against a daemon.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fx_common::constants::STOP_TIMEOUT;
use fx_common::error::{FxError, Result};
use fx_common::types::{ContainerId, DEFAULT_TAG, ImageRef, PortBinding};
use parking_lot::Mutex;

use crate::build_log;
use crate::client::{DeployedContainer, EngineClient};
use crate::context::{self, Compression};

/// A call received by the fake engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `list_images_with_reference`.
    ListImages(String),
    /// `pull`.
    Pull(String),
    /// `build`.
    Build {
        /// Requested tag.
        name: String,
        /// Context directory.
        dir: PathBuf,
    },
    /// Container creation inside `deploy`.
    Create {
        /// Image the container was created from.
        image: String,
        /// Requested port binding.
        binding: PortBinding,
    },
    /// Container start inside `deploy`.
    Start(ContainerId),
    /// `stop`.
    Stop(ContainerId),
    /// `remove`.
    Remove(ContainerId),
    /// `remove_image`.
    RemoveImage(String),
    /// `is_running`.
    Info,
}

/// A container held by the fake engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    /// Image it was created from.
    pub image: String,
    /// Its single port binding.
    pub binding: PortBinding,
    /// Whether it is currently running.
    pub running: bool,
    /// Whether the last stop had to wait out the grace period.
    pub killed_after_timeout: bool,
}

#[derive(Debug, Default)]
struct Failures {
    unreachable: bool,
    list: HashSet<String>,
    pull: HashSet<String>,
    create: bool,
    start: bool,
    stop: bool,
    remove: bool,
}

#[derive(Debug, Default)]
struct State {
    repo_tags: Vec<String>,
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<EngineCall>,
}

/// In-memory [`EngineClient`].
#[derive(Debug)]
pub struct FakeEngine {
    state: Mutex<State>,
    failures: Failures,
    build_log: Option<String>,
    pull_delay: Duration,
    pull_tags_image: bool,
    ignores_stop_signal: bool,
    pulls_in_flight: AtomicUsize,
    max_pulls_in_flight: AtomicUsize,
    pulls_completed: AtomicUsize,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// An empty, healthy engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            failures: Failures::default(),
            build_log: None,
            pull_delay: Duration::ZERO,
            pull_tags_image: true,
            ignores_stop_signal: false,
            pulls_in_flight: AtomicUsize::new(0),
            max_pulls_in_flight: AtomicUsize::new(0),
            pulls_completed: AtomicUsize::new(0),
        }
    }

    /// Adds a local image tag such as `org/app:latest`.
    #[must_use]
    pub fn with_image(self, repo_tag: &str) -> Self {
        self.state.lock().repo_tags.push(repo_tag.to_string());
        self
    }

    /// Makes every call behave as if the daemon were down.
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.failures.unreachable = true;
        self
    }

    /// Makes listing `reference` fail.
    #[must_use]
    pub fn failing_list(mut self, reference: &str) -> Self {
        let _ = self.failures.list.insert(reference.to_string());
        self
    }

    /// Makes pulling `reference` fail.
    #[must_use]
    pub fn failing_pull(mut self, reference: &str) -> Self {
        let _ = self.failures.pull.insert(reference.to_string());
        self
    }

    /// Makes container creation fail.
    #[must_use]
    pub const fn failing_create(mut self) -> Self {
        self.failures.create = true;
        self
    }

    /// Makes container start fail after creation succeeded.
    #[must_use]
    pub const fn failing_start(mut self) -> Self {
        self.failures.start = true;
        self
    }

    /// Makes container stop fail.
    #[must_use]
    pub const fn failing_stop(mut self) -> Self {
        self.failures.stop = true;
        self
    }

    /// Makes container removal fail.
    #[must_use]
    pub const fn failing_remove(mut self) -> Self {
        self.failures.remove = true;
        self
    }

    /// Replaces the build response body with raw newline-delimited lines.
    #[must_use]
    pub fn with_build_log(mut self, body: &str) -> Self {
        self.build_log = Some(body.to_string());
        self
    }

    /// Makes each pull take `delay`.
    #[must_use]
    pub const fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = delay;
        self
    }

    /// Makes pulls succeed without the image showing up locally.
    #[must_use]
    pub const fn pulls_without_tagging(mut self) -> Self {
        self.pull_tags_image = false;
        self
    }

    /// Makes containers ignore the stop signal so stop waits out the timeout.
    #[must_use]
    pub const fn ignoring_stop_signal(mut self) -> Self {
        self.ignores_stop_signal = true;
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// References passed to `pull`, in call order.
    pub fn pulls(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Pull(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Containers currently known to the engine.
    pub fn containers(&self) -> BTreeMap<String, FakeContainer> {
        self.state.lock().containers.clone()
    }

    /// Local image tags.
    pub fn repo_tags(&self) -> Vec<String> {
        self.state.lock().repo_tags.clone()
    }

    /// Highest number of pulls observed running at once.
    pub fn max_concurrent_pulls(&self) -> usize {
        self.max_pulls_in_flight.load(Ordering::SeqCst)
    }

    /// Number of pulls that ran to completion, successful or not.
    pub fn completed_pulls(&self) -> usize {
        self.pulls_completed.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.failures.unreachable {
            return Err(FxError::EngineUnavailable {
                message: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn default_build_log(name: &str) -> String {
        let id = ContainerId::generate();
        [
            r#"{"stream":"Step 1/1 : FROM scratch\n"}"#.to_string(),
            format!(r#"{{"stream":"Successfully built {}\n"}}"#, id.short()),
            format!(r#"{{"stream":"Successfully tagged {name}\n"}}"#),
        ]
        .join("\n")
    }
}

/// Whether a local `repo:tag` satisfies a reference filter.
fn matches_reference(repo_tag: &str, reference: &ImageRef) -> bool {
    match reference.tag() {
        Some(_) => repo_tag == reference.as_str(),
        None => repo_tag
            .strip_prefix(reference.repository())
            .is_some_and(|rest| rest.starts_with(':')),
    }
}

fn tagged(reference: &ImageRef) -> String {
    match reference.tag() {
        Some(_) => reference.to_string(),
        None => format!("{}:{}", reference.repository(), DEFAULT_TAG),
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn list_images_with_reference(&self, reference: &ImageRef) -> Result<Vec<String>> {
        self.record(EngineCall::ListImages(reference.to_string()));
        self.check_reachable()?;
        if self.failures.list.contains(reference.as_str()) {
            return Err(FxError::EngineUnavailable {
                message: format!("listing {reference} failed"),
            });
        }
        Ok(self
            .state
            .lock()
            .repo_tags
            .iter()
            .filter(|t| matches_reference(t, reference))
            .cloned()
            .collect())
    }

    async fn pull(&self, reference: &ImageRef) -> Result<()> {
        self.record(EngineCall::Pull(reference.to_string()));
        let in_flight = self.pulls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_pulls_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.pull_delay.is_zero() {
            tokio::time::sleep(self.pull_delay).await;
        }

        let result = if self.failures.unreachable || self.failures.pull.contains(reference.as_str()) {
            Err(FxError::PullFailed {
                reference: reference.to_string(),
                message: "manifest unknown".into(),
            })
        } else {
            if self.pull_tags_image {
                let tag = tagged(reference);
                let mut state = self.state.lock();
                if !state.repo_tags.contains(&tag) {
                    state.repo_tags.push(tag);
                }
            }
            Ok(())
        };

        let _ = self.pulls_in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = self.pulls_completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn build(&self, name: &str, dir: &Path) -> Result<()> {
        self.record(EngineCall::Build {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        });
        let (context, _body) = context::prepare(name, dir, Compression::None).await?;
        self.check_reachable().map_err(|e| FxError::BuildFailed {
            image: name.to_string(),
            reason: e.to_string(),
        })?;

        let body = self
            .build_log
            .clone()
            .unwrap_or_else(|| Self::default_build_log(name));
        let _ = build_log::consume(name, futures::stream::iter(build_log::decode_lines(&body))).await?;
        drop(context);

        let reference = ImageRef::parse(name).map_err(|e| FxError::BuildFailed {
            image: name.to_string(),
            reason: e.to_string(),
        })?;
        let tag = tagged(&reference);
        let mut state = self.state.lock();
        if !state.repo_tags.contains(&tag) {
            state.repo_tags.push(tag);
        }
        Ok(())
    }

    async fn deploy(&self, name: &str, _dir: &Path, host_port: u16) -> Result<DeployedContainer> {
        let binding = PortBinding::to_host(host_port);
        self.record(EngineCall::Create {
            image: name.to_string(),
            binding,
        });
        if self.failures.unreachable || self.failures.create {
            return Err(FxError::ContainerCreateFailed {
                image: name.to_string(),
                message: format!("No such image: {name}"),
            });
        }

        let id = ContainerId::generate();
        let _ = self.state.lock().containers.insert(
            id.to_string(),
            FakeContainer {
                image: name.to_string(),
                binding,
                running: false,
                killed_after_timeout: false,
            },
        );

        self.record(EngineCall::Start(id.clone()));
        if self.failures.start {
            return Err(FxError::ContainerStartFailed {
                id,
                message: "port is already allocated".into(),
            });
        }
        if let Some(container) = self.state.lock().containers.get_mut(id.as_str()) {
            container.running = true;
        }

        Ok(DeployedContainer {
            id,
            image: name.to_string(),
            binding,
            warnings: Vec::new(),
        })
    }

    async fn stop(&self, id: &ContainerId) -> Result<()> {
        self.record(EngineCall::Stop(id.clone()));
        let fail = |message: &str| FxError::ContainerOpFailed {
            op: "stop",
            id: id.clone(),
            message: message.to_string(),
        };
        if self.failures.unreachable || self.failures.stop {
            return Err(fail("daemon error"));
        }

        let was_running = {
            let state = self.state.lock();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| fail("No such container"))?;
            container.running
        };
        let timed_out = was_running && self.ignores_stop_signal;
        if timed_out {
            tokio::time::sleep(STOP_TIMEOUT).await;
        }

        if let Some(container) = self.state.lock().containers.get_mut(id.as_str()) {
            container.running = false;
            container.killed_after_timeout = timed_out;
        }
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        self.record(EngineCall::Remove(id.clone()));
        let fail = |message: &str| FxError::ContainerOpFailed {
            op: "remove",
            id: id.clone(),
            message: message.to_string(),
        };
        if self.failures.unreachable || self.failures.remove {
            return Err(fail("daemon error"));
        }
        self.state
            .lock()
            .containers
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| fail("No such container"))
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.record(EngineCall::RemoveImage(image.to_string()));
        let fail = |message: String| FxError::ImageRemoveFailed {
            image: image.to_string(),
            message,
        };
        self.check_reachable().map_err(|e| fail(e.to_string()))?;
        let reference = ImageRef::parse(image).map_err(|e| fail(e.to_string()))?;

        let mut state = self.state.lock();
        let before = state.repo_tags.len();
        state.repo_tags.retain(|t| !matches_reference(t, &reference));
        if state.repo_tags.len() == before {
            return Err(fail(format!("No such image: {image}")));
        }
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.record(EngineCall::Info);
        !self.failures.unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(s: &str) -> ImageRef {
        ImageRef::parse(s).expect("valid reference")
    }

    fn context_dir(root: &Path) -> PathBuf {
        let dir = root.join("fn");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("Dockerfile"), "FROM scratch\n").expect("write");
        dir
    }

    #[test]
    fn untagged_reference_matches_any_tag_of_repo() {
        assert!(matches_reference("org/a:latest", &reference("org/a")));
        assert!(matches_reference("org/a:1.0", &reference("org/a")));
        assert!(!matches_reference("org/ab:latest", &reference("org/a")));
        assert!(!matches_reference("org/a:1.0", &reference("org/a:latest")));
    }

    #[tokio::test]
    async fn list_returns_empty_for_absent_image() {
        let engine = FakeEngine::new().with_image("org/a-base:latest");
        let found = engine
            .list_images_with_reference(&reference("org/b-base"))
            .await
            .expect("list");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn unreachable_engine_fails_listing() {
        let engine = FakeEngine::new().unreachable();
        let err = engine
            .list_images_with_reference(&reference("org/a-base"))
            .await
            .expect_err("unreachable");
        assert_eq!(err.kind(), "engine_unavailable");
        assert!(!engine.is_running().await);
    }

    #[tokio::test]
    async fn pull_adds_latest_tag() {
        let engine = FakeEngine::new();
        engine.pull(&reference("org/a-base")).await.expect("pull");
        assert_eq!(engine.repo_tags(), vec!["org/a-base:latest".to_string()]);
        assert_eq!(engine.completed_pulls(), 1);
    }

    #[tokio::test]
    async fn build_tags_image_and_removes_archive() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = context_dir(root.path());
        let engine = FakeEngine::new();

        engine.build("fx/hello", &dir).await.expect("build");
        assert!(engine.repo_tags().contains(&"fx/hello:latest".to_string()));
        assert!(!root.path().join("fn.tar").exists());
    }

    #[tokio::test]
    async fn deploy_then_remove_forgets_container() {
        let engine = FakeEngine::new();
        let deployed = engine
            .deploy("fx/hello", Path::new("."), 8080)
            .await
            .expect("deploy");
        assert!(engine.containers()[deployed.id.as_str()].running);

        engine.remove(&deployed.id).await.expect("remove");
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn remove_image_drops_matching_tags() {
        let engine = FakeEngine::new()
            .with_image("fx/hello:latest")
            .with_image("org/a-base:latest");
        engine.remove_image("fx/hello").await.expect("remove image");
        assert_eq!(engine.repo_tags(), vec!["org/a-base:latest".to_string()]);

        let err = engine.remove_image("fx/hello").await.expect_err("gone");
        assert_eq!(err.kind(), "image_remove_failed");
    }
}
