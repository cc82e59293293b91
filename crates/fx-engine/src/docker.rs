//! Docker Engine API implementation of [`EngineClient`].

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{BuildImageOptions, CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{BuildInfo, HostConfig, PortBinding as DockerPortBinding};
use futures::StreamExt;
use fx_common::config::FxConfig;
use fx_common::constants::{BUILD_DESCRIPTOR, OWNER_LABEL_KEY, OWNER_LABEL_VALUE, STOP_TIMEOUT};
use fx_common::error::{FxError, Result};
use fx_common::types::{ContainerId, ImageRef, PortBinding};

use crate::build_log::{self, BuildLogLine, MalformedLine};
use crate::client::{DeployedContainer, EngineClient};
use crate::context::{self, Compression};

/// Engine client backed by a Docker daemon connection.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
    compression: Compression,
}

impl DockerEngine {
    /// Connects to the engine described by `config`.
    ///
    /// Without an explicit `docker_host`, the local defaults apply
    /// (`DOCKER_HOST` or the platform socket). Connecting does not contact
    /// the daemon; use [`EngineClient::is_running`] for that.
    ///
    /// # Errors
    ///
    /// Returns `FxError::EngineUnavailable` if the connection cannot be set up.
    pub fn connect(config: &FxConfig) -> Result<Self> {
        let timeout = config.request_timeout_secs;
        let docker = match config.docker_host.as_deref() {
            None => Docker::connect_with_local_defaults()
                .map(|d| d.with_timeout(config.request_timeout())),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, timeout, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(host, timeout, bollard::API_DEFAULT_VERSION),
        }
        .map_err(unavailable)?;

        tracing::debug!(host = ?config.docker_host, "engine client configured");
        Ok(Self::from_docker(docker)
            .with_compression(Compression::from_flag(config.compress_build_context)))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub const fn from_docker(docker: Docker) -> Self {
        Self {
            docker,
            compression: Compression::None,
        }
    }

    /// Sets how build contexts are encoded.
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

#[async_trait]
impl EngineClient for DockerEngine {
    async fn list_images_with_reference(&self, reference: &ImageRef) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        let _ = filters.insert("reference".to_string(), vec![reference.to_string()]);
        let options = ListImagesOptions {
            filters,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(unavailable)?;
        let tags: Vec<String> = images.into_iter().flat_map(|i| i.repo_tags).collect();
        tracing::debug!(reference = %reference, found = tags.len(), "listed images");
        Ok(tags)
    }

    async fn pull(&self, reference: &ImageRef) -> Result<()> {
        tracing::info!(reference = %reference, "pulling image");
        let options = CreateImageOptions {
            from_image: reference.repository().to_string(),
            tag: reference.pull_tag().to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!(reference = %reference, status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(FxError::PullFailed {
                        reference: reference.to_string(),
                        message: daemon_message(e),
                    });
                }
            }
        }
        Ok(())
    }

    async fn build(&self, name: &str, dir: &Path) -> Result<()> {
        let (context, body) = context::prepare(name, dir, self.compression).await?;
        tracing::info!(image = name, dir = %context.dir().display(), "building image");

        let stream = self
            .docker
            .build_image(build_options(name), None, Some(body))
            .map(|item| build_item(name, item));
        let result = build_log::consume(name, stream).await.map(|_| ());
        drop(context);
        result
    }

    async fn deploy(&self, name: &str, dir: &Path, host_port: u16) -> Result<DeployedContainer> {
        let binding = PortBinding::to_host(host_port);
        let created = self
            .docker
            .create_container(
                None::<CreateContainerOptions<String>>,
                container_config(name, binding),
            )
            .await
            .map_err(|e| FxError::ContainerCreateFailed {
                image: name.to_string(),
                message: daemon_message(e),
            })?;
        let id = ContainerId::new(created.id);
        tracing::info!(id = %id, image = name, dir = %dir.display(), "container created");

        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| FxError::ContainerStartFailed {
                id: id.clone(),
                message: daemon_message(e),
            })?;
        tracing::info!(id = %id, binding = %binding, "container started");

        Ok(DeployedContainer {
            id,
            image: name.to_string(),
            binding,
            warnings: created.warnings,
        })
    }

    async fn stop(&self, id: &ContainerId) -> Result<()> {
        match self
            .docker
            .stop_container(id.as_str(), Some(stop_options()))
            .await
        {
            // 304: already stopped.
            Ok(())
            | Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                tracing::info!(id = %id, "container stopped");
                Ok(())
            }
            Err(e) => Err(FxError::ContainerOpFailed {
                op: "stop",
                id: id.clone(),
                message: daemon_message(e),
            }),
        }
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| FxError::ContainerOpFailed {
                op: "remove",
                id: id.clone(),
                message: daemon_message(e),
            })?;
        tracing::info!(id = %id, "container removed");
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        let deleted = self
            .docker
            .remove_image(image, Some(options), None)
            .await
            .map_err(|e| FxError::ImageRemoveFailed {
                image: image.to_string(),
                message: daemon_message(e),
            })?;
        tracing::info!(image, entries = deleted.len(), "image removed");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        match self.docker.info().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "engine liveness query failed");
                false
            }
        }
    }
}

/// Build request for image `name` from the `Dockerfile` at the context root.
fn build_options(name: &str) -> BuildImageOptions<String> {
    let mut labels = HashMap::new();
    let _ = labels.insert(OWNER_LABEL_KEY.to_string(), OWNER_LABEL_VALUE.to_string());
    BuildImageOptions {
        dockerfile: BUILD_DESCRIPTOR.to_string(),
        t: name.to_string(),
        labels,
        rm: true,
        ..Default::default()
    }
}

/// Container spec exposing the service port and publishing it per `binding`.
fn container_config(name: &str, binding: PortBinding) -> Config<String> {
    let port_key = binding.container_port_key();

    let mut exposed_ports = HashMap::new();
    let _ = exposed_ports.insert(port_key.clone(), HashMap::new());
    let mut port_bindings = HashMap::new();
    let _ = port_bindings.insert(
        port_key,
        Some(vec![DockerPortBinding {
            host_ip: Some(binding.host_ip().to_string()),
            host_port: Some(binding.host_port.to_string()),
        }]),
    );
    Config {
        image: Some(name.to_string()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn stop_options() -> StopContainerOptions {
    StopContainerOptions {
        t: STOP_TIMEOUT.as_secs() as i64,
    }
}

/// Maps one decoded build response item onto a build log line.
///
/// An `error` object in the stream arrives as `DockerStreamError` and is
/// handed on as a line carrying that error. Decode errors and transport
/// failures mid-stream surface as malformed lines.
fn build_item(
    image: &str,
    item: std::result::Result<BuildInfo, DockerError>,
) -> std::result::Result<BuildLogLine, MalformedLine> {
    match item {
        Ok(info) => Ok(BuildLogLine {
            stream: info.stream,
            error: info.error,
        }),
        Err(DockerError::DockerStreamError { error }) => Ok(BuildLogLine {
            stream: None,
            error: Some(error),
        }),
        Err(DockerError::JsonDataError { message, .. }) => Err(MalformedLine { reason: message }),
        Err(e) => {
            tracing::debug!(image, error = %e, "build stream interrupted");
            Err(MalformedLine {
                reason: daemon_message(e),
            })
        }
    }
}

/// The daemon's own text for an error, rather than bollard's summary.
fn daemon_message(e: DockerError) -> String {
    match e {
        DockerError::DockerStreamError { error } => error,
        other => other.to_string(),
    }
}

fn unavailable(e: DockerError) -> FxError {
    FxError::EngineUnavailable {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// A daemon stand-in answering one scripted response per connection and
    /// recording each request as `head\r\n\r\nbody`.
    struct MockDaemon {
        host: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl MockDaemon {
        async fn start(responses: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let host = format!("tcp://{}", listener.local_addr().expect("addr"));
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);
            let _ = tokio::spawn(async move {
                for (status, body) in responses {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let request = read_request(&mut socket).await;
                    seen.lock().push(request);
                    let reply = format!(
                        "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self { host, requests }
        }

        fn engine(&self) -> DockerEngine {
            let config = FxConfig {
                docker_host: Some(self.host.clone()),
                request_timeout_secs: 5,
                ..FxConfig::default()
            };
            DockerEngine::connect(&config).expect("connect")
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 {
                return String::from_utf8_lossy(&buf).into_owned();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).into_owned();
                let length = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + length {
                    let n = socket.read(&mut chunk).await.expect("read");
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[end + 4..]).into_owned();
                return format!("{head}\r\n\r\n{body}");
            }
        }
    }

    fn context_dir(root: &std::path::Path) -> PathBuf {
        let dir = root.join("hello");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(BUILD_DESCRIPTOR), "FROM scratch\n").expect("write");
        dir
    }

    #[test]
    fn build_item_keeps_stream_text() {
        let info = BuildInfo {
            stream: Some("Step 1/2\n".into()),
            ..Default::default()
        };
        let line = build_item("fx/a", Ok(info)).expect("well formed");
        assert_eq!(line.stream.as_deref(), Some("Step 1/2\n"));
        assert!(line.error.is_none());
    }

    #[test]
    fn build_item_turns_daemon_error_object_into_error_line() {
        let err = DockerError::DockerStreamError {
            error: "COPY failed: file not found".into(),
        };
        let line = build_item("fx/a", Err(err)).expect("error objects are not malformed");
        assert_eq!(line.error.as_deref(), Some("COPY failed: file not found"));
        assert!(line.stream.is_none());
    }

    #[test]
    fn build_item_maps_transport_error_to_malformed_line() {
        let malformed = build_item("fx/a", Err(DockerError::RequestTimeoutError))
            .expect_err("malformed");
        assert!(!malformed.reason.is_empty());
    }

    #[test]
    fn daemon_message_keeps_stream_error_text() {
        let err = DockerError::DockerStreamError {
            error: "unauthorized: authentication required".into(),
        };
        assert_eq!(daemon_message(err), "unauthorized: authentication required");
    }

    #[test]
    fn build_options_tag_descriptor_and_owner_label() {
        let options = build_options("fx/hello");
        assert_eq!(options.t, "fx/hello");
        assert_eq!(options.dockerfile, "Dockerfile");
        assert_eq!(options.labels.get("belong-to").map(String::as_str), Some("fx"));
        assert!(options.rm);
    }

    #[test]
    fn container_config_publishes_service_port_on_all_interfaces() {
        let config = container_config("fx/hello", PortBinding::to_host(8080));
        assert_eq!(config.image.as_deref(), Some("fx/hello"));

        let exposed = config.exposed_ports.expect("exposed ports");
        assert_eq!(exposed.keys().collect::<Vec<_>>(), vec!["3000/tcp"]);

        let bindings = config
            .host_config
            .and_then(|h| h.port_bindings)
            .expect("port bindings");
        assert_eq!(bindings.len(), 1);
        let published = bindings["3000/tcp"].as_ref().expect("binding list");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(published[0].host_port.as_deref(), Some("8080"));
    }

    #[test]
    fn stop_options_use_one_second_grace() {
        assert_eq!(stop_options().t, 1);
    }

    #[test]
    fn connect_with_explicit_http_host_does_not_contact_daemon() {
        let config = FxConfig {
            docker_host: Some("tcp://127.0.0.1:1".into()),
            ..FxConfig::default()
        };
        assert!(DockerEngine::connect(&config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_engine_is_not_running() {
        let config = FxConfig {
            docker_host: Some("tcp://127.0.0.1:1".into()),
            request_timeout_secs: 2,
            ..FxConfig::default()
        };
        let engine = DockerEngine::connect(&config).expect("connect");
        assert!(!engine.is_running().await);
    }

    #[tokio::test]
    async fn pull_failure_carries_registry_message() {
        let daemon = MockDaemon::start(vec![(
            200,
            "{\"error\":\"manifest for org/a:latest not found\"}\n",
        )])
        .await;

        let err = daemon
            .engine()
            .pull(&ImageRef::parse("org/a").expect("ref"))
            .await
            .expect_err("pull fails");
        assert_eq!(err.kind(), "pull_failed");
        assert!(err.to_string().contains("manifest for org/a:latest not found"));

        let requests = daemon.requests();
        assert!(requests[0].starts_with("POST "));
        assert!(requests[0].contains("/images/create?"));
        assert!(requests[0].contains("fromImage=org%2Fa"));
        assert!(requests[0].contains("tag=latest"));
    }

    #[tokio::test]
    async fn build_tolerates_error_object_in_stream() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = context_dir(root.path());
        let daemon = MockDaemon::start(vec![(
            200,
            "{\"stream\":\"Step 1/1 : FROM scratch\"}\n{\"error\":\"COPY failed\"}\n",
        )])
        .await;

        daemon
            .engine()
            .build("fx/hello", &dir)
            .await
            .expect("error object does not fail the build");
        assert!(!root.path().join("hello.tar").exists());

        let requests = daemon.requests();
        assert!(requests[0].contains("/build?"));
        assert!(requests[0].contains("dockerfile=Dockerfile"));
        assert!(requests[0].contains("t=fx%2Fhello"));
    }

    #[tokio::test]
    async fn build_fails_on_malformed_stream() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = context_dir(root.path());
        let daemon = MockDaemon::start(vec![(200, "{\"stream\":\"Step 1/1\"}\nnot json\n")]).await;

        let err = daemon
            .engine()
            .build("fx/hello", &dir)
            .await
            .expect_err("malformed stream");
        assert_eq!(err.kind(), "build_failed");
    }

    #[tokio::test]
    async fn deploy_creates_then_starts_with_port_binding() {
        let daemon = MockDaemon::start(vec![
            (201, "{\"Id\":\"c0ffee1234567890\",\"Warnings\":[]}"),
            (204, ""),
        ])
        .await;

        let deployed = daemon
            .engine()
            .deploy("fx/hello", std::path::Path::new("hello"), 8080)
            .await
            .expect("deploy");
        assert_eq!(deployed.id.as_str(), "c0ffee1234567890");
        assert_eq!(deployed.binding, PortBinding::to_host(8080));

        let requests = daemon.requests();
        assert!(requests[0].contains("/containers/create"));
        assert!(requests[0].contains("\"3000/tcp\""));
        assert!(requests[0].contains("\"HostIp\":\"0.0.0.0\""));
        assert!(requests[0].contains("\"HostPort\":\"8080\""));
        assert!(requests[1].contains("/containers/c0ffee1234567890/start"));
    }

    #[tokio::test]
    async fn start_failure_carries_created_id() {
        let daemon = MockDaemon::start(vec![
            (201, "{\"Id\":\"abc\",\"Warnings\":[]}"),
            (500, "{\"message\":\"port is already allocated\"}"),
        ])
        .await;

        let err = daemon
            .engine()
            .deploy("fx/hello", std::path::Path::new("hello"), 8080)
            .await
            .expect_err("start fails");
        match err {
            FxError::ContainerStartFailed { id, message } => {
                assert_eq!(id.as_str(), "abc");
                assert!(message.contains("port is already allocated"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_and_remove_send_timeout_and_force() {
        let daemon = MockDaemon::start(vec![(204, ""), (304, ""), (204, "")]).await;
        let engine = daemon.engine();
        let id = ContainerId::new("abc");

        engine.stop(&id).await.expect("stop");
        engine.stop(&id).await.expect("already stopped counts as stopped");
        engine.remove(&id).await.expect("remove");

        let requests = daemon.requests();
        assert!(requests[0].contains("/containers/abc/stop?t=1"));
        assert!(requests[2].starts_with("DELETE "));
        assert!(requests[2].contains("force=true"));
    }
}
