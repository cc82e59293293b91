//! Build response decoding.
//!
//! The engine answers a build request with newline-delimited JSON objects,
//! one per progress line. A build is considered successful once the whole
//! stream has been read without a malformed line.

use futures::{Stream, StreamExt};
use fx_common::error::{FxError, Result};
use serde::Deserialize;

/// One decoded line of a build response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildLogLine {
    /// Build output text.
    #[serde(default)]
    pub stream: Option<String>,
    /// Error text reported by the engine.
    #[serde(default)]
    pub error: Option<String>,
}

/// A line of the build response that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// What was wrong with the line.
    pub reason: String,
}

impl BuildLogLine {
    /// Decodes one raw response line.
    ///
    /// Returns `Ok(None)` for blank lines, which carry no record.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedLine`] if the line is not a JSON object.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, MalformedLine> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('{') {
            return Err(MalformedLine {
                reason: format!("expected a JSON object, got {}", preview(line)),
            });
        }
        serde_json::from_str(line).map(Some).map_err(|e| MalformedLine {
            reason: format!("{e} in {}", preview(line)),
        })
    }
}

/// Decodes a full response body split on newlines.
///
/// Lines are yielded lazily, so a consumer that stops at the first
/// malformed line never decodes the rest.
pub fn decode_lines(
    body: &str,
) -> impl Iterator<Item = std::result::Result<BuildLogLine, MalformedLine>> + '_ {
    body.lines()
        .filter_map(|line| BuildLogLine::parse(line).transpose())
}

/// Reads a build response stream to the end.
///
/// Returns the number of lines consumed. Stops at the first malformed line.
/// Lines carrying an `error` field are logged but do not fail the build.
///
/// # Errors
///
/// Returns `FxError::BuildFailed` naming the 1-based position of the first
/// malformed line.
pub async fn consume<S>(image: &str, stream: S) -> Result<usize>
where
    S: Stream<Item = std::result::Result<BuildLogLine, MalformedLine>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut count = 0usize;
    while let Some(item) = stream.next().await {
        count += 1;
        match item {
            Ok(line) => {
                if let Some(text) = line.stream.as_deref() {
                    let text = text.trim_end();
                    if !text.is_empty() {
                        tracing::debug!(image, "{text}");
                    }
                }
                if let Some(error) = line.error.as_deref() {
                    tracing::warn!(image, error, "engine reported a build error");
                }
            }
            Err(malformed) => {
                return Err(FxError::BuildFailed {
                    image: image.to_string(),
                    reason: format!("malformed build log line {count}: {}", malformed.reason),
                });
            }
        }
    }
    tracing::info!(image, lines = count, "build stream consumed");
    Ok(count)
}

fn preview(line: &str) -> String {
    const MAX: usize = 64;
    match line.char_indices().nth(MAX) {
        Some((at, _)) => format!("{:?}...", &line[..at]),
        None => format!("{line:?}"),
    }
}
