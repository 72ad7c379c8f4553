// Moderator backends. `BackendModeratorFactory` picks one from the config.

pub mod azure_client;

pub use azure_client::AzureContentSafetyClient;

use crate::core::moderation::{BackendConfig, BackendKind, ConfigError, Moderator, ModeratorFactory};
use std::sync::Arc;

/// Builds the moderator named by `MODERATION_BACKEND`.
pub struct BackendModeratorFactory;

impl ModeratorFactory for BackendModeratorFactory {
    fn build(&self, backend: &BackendConfig) -> Result<Arc<dyn Moderator>, ConfigError> {
        match backend.kind {
            BackendKind::Azure => {
                let moderator = AzureContentSafetyClient::new(&backend.endpoint, &backend.api_key)
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to create Azure moderator");
                        e
                    })?;

                tracing::info!(endpoint = %backend.endpoint, "Azure AI Content Safety moderator initialized");
                Ok(Arc::new(moderator))
            }
        }
    }
}
