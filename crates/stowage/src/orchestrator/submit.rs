//! Cold-storage job submission.

use crate::backend::{BackendError, StorageBackend, StorageConfig};

/// Deal parameters that override the backend defaults when configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealOverrides {
    pub deal_min_duration: Option<i64>,
    pub max_price: Option<u64>,
}

impl DealOverrides {
    pub fn is_empty(&self) -> bool {
        self.deal_min_duration.is_none() && self.max_price.is_none()
    }

    /// Applies the overrides to the Filecoin section. Returns whether the
    /// configuration changed and should be written back.
    fn apply(&self, config: &mut StorageConfig) -> bool {
        if self.is_empty() {
            return false;
        }
        let Some(filecoin) = config.cold.filecoin.as_mut() else {
            return false;
        };
        if let Some(duration) = self.deal_min_duration {
            filecoin.deal_min_duration = duration;
        }
        if let Some(price) = self.max_price {
            filecoin.max_price = price;
        }
        true
    }
}

/// Pushes a cold-storage job for `content_address` and returns its job id.
///
/// When overrides are configured, the backend's default storage
/// configuration is refreshed with them first. That round trip is best
/// effort; only the push itself can fail the submission.
pub async fn submit_cold_storage_job(
    backend: &dyn StorageBackend,
    overrides: &DealOverrides,
    content_address: &str,
) -> Result<String, BackendError> {
    if !overrides.is_empty() {
        write_overrides(backend, overrides, content_address).await;
    }

    let job_id = backend.push_storage_config(content_address).await?;
    log::info!("Pushed cold storage job {} for {}", job_id, content_address);
    Ok(job_id)
}

async fn write_overrides(
    backend: &dyn StorageBackend,
    overrides: &DealOverrides,
    content_address: &str,
) {
    match backend.default_storage_config().await {
        Ok(mut config) => {
            if overrides.apply(&mut config) {
                if let Err(e) = backend.set_default_storage_config(&config).await {
                    log::warn!(
                        "Failed to update default storage config before pushing {}: {}",
                        content_address,
                        e
                    );
                }
            }
        }
        Err(e) => {
            log::warn!(
                "Failed to read default storage config before pushing {}: {}",
                content_address,
                e
            );
        }
    }
}
