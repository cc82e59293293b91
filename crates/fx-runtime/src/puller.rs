//! Parallel base-image puller.
//!
//! Every catalog reference is pulled by its own task. Tasks run through a
//! semaphore-gated pool and [`ImagePuller::pull_all`] returns only once all
//! of them have finished.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fx_common::config::BaseImageCatalog;
use fx_common::error::FxError;
use fx_common::types::ImageRef;
use fx_engine::EngineClient;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Result of pulling one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    /// The pull stream completed without an error.
    Pulled,
    /// The pull failed.
    Failed {
        /// Why it failed.
        message: String,
    },
}

impl PullOutcome {
    /// Whether the pull succeeded.
    #[must_use]
    pub const fn is_pulled(&self) -> bool {
        matches!(self, Self::Pulled)
    }
}

/// Per-reference outcomes of a [`ImagePuller::pull_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    outcomes: BTreeMap<ImageRef, PullOutcome>,
}

impl PullReport {
    /// Outcome for every reference that was requested.
    #[must_use]
    pub const fn outcomes(&self) -> &BTreeMap<ImageRef, PullOutcome> {
        &self.outcomes
    }

    /// Outcome for one reference.
    #[must_use]
    pub fn get(&self, reference: &ImageRef) -> Option<&PullOutcome> {
        self.outcomes.get(reference)
    }

    /// Whether every requested reference was pulled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(PullOutcome::is_pulled)
    }

    /// References that failed, with their messages.
    #[must_use]
    pub fn failures(&self) -> Vec<(&ImageRef, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(reference, outcome)| match outcome {
                PullOutcome::Pulled => None,
                PullOutcome::Failed { message } => Some((reference, message.as_str())),
            })
            .collect()
    }

    /// Number of references pulled successfully.
    #[must_use]
    pub fn pulled(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_pulled()).count()
    }

    /// Number of references requested.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Pulls catalogs through a bounded pool of concurrent tasks.
#[derive(Clone)]
pub struct ImagePuller {
    engine: Arc<dyn EngineClient>,
    concurrency: NonZeroUsize,
}

impl std::fmt::Debug for ImagePuller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePuller")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ImagePuller {
    /// Creates a puller allowing at most `concurrency` pulls in flight.
    #[must_use]
    pub fn new(engine: Arc<dyn EngineClient>, concurrency: NonZeroUsize) -> Self {
        Self {
            engine,
            concurrency,
        }
    }

    /// Pulls every reference in `catalog` and waits for all of them.
    ///
    /// Readiness is not consulted; present images are pulled again. A task
    /// that dies without reporting leaves its reference marked failed.
    pub async fn pull_all(&self, catalog: &BaseImageCatalog) -> PullReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut outcomes: BTreeMap<ImageRef, PullOutcome> = catalog
            .into_iter()
            .map(|reference| {
                (
                    reference.clone(),
                    PullOutcome::Failed {
                        message: "pull task did not complete".into(),
                    },
                )
            })
            .collect();

        tracing::info!(
            images = catalog.len(),
            concurrency = self.concurrency.get(),
            "pulling base images"
        );

        let mut tasks = JoinSet::new();
        for reference in catalog {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let reference = reference.clone();
            let _ = tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let result = engine.pull(&reference).await;
                        drop(permit);
                        result
                    }
                    Err(e) => Err(FxError::PullFailed {
                        reference: reference.to_string(),
                        message: e.to_string(),
                    }),
                };
                (reference, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((reference, Ok(()))) => {
                    tracing::info!(reference = %reference, "pulled image");
                    let _ = outcomes.insert(reference, PullOutcome::Pulled);
                }
                Ok((reference, Err(e))) => {
                    tracing::error!(reference = %reference, error = %e, "image pull failed");
                    let _ = outcomes.insert(
                        reference,
                        PullOutcome::Failed {
                            message: e.to_string(),
                        },
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "pull task aborted");
                }
            }
        }

        let report = PullReport { outcomes };
        tracing::info!(
            pulled = report.pulled(),
            failed = report.len() - report.pulled(),
            "base image pull finished"
        );
        report
    }
}
