//! Base-image readiness check.

use fx_common::config::BaseImageCatalog;
use fx_engine::EngineClient;

/// Whether every image in `catalog` has at least one local tag.
///
/// Queries the engine once per reference in catalog order and stops at the
/// first reference that is missing or cannot be listed. The answer is only
/// valid at the moment it is computed.
pub async fn is_ready(engine: &dyn EngineClient, catalog: &BaseImageCatalog) -> bool {
    for reference in catalog {
        match engine.list_images_with_reference(reference).await {
            Ok(tags) if !tags.is_empty() => {
                tracing::debug!(reference = %reference, tags = tags.len(), "base image present");
            }
            Ok(_) => {
                tracing::info!(reference = %reference, "base image missing");
                return false;
            }
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "base image lookup failed");
                return false;
            }
        }
    }
    true
}
