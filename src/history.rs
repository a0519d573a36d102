use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use tracing::debug;

use crate::error::AppError;
use crate::traits::PredictionStore;

/// Keeps only the most recent prediction, stamped with when it was made.
pub(crate) struct FilePredictionStore {
    path: PathBuf,
}

impl FilePredictionStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PredictionStore for FilePredictionStore {
    async fn record(&self, prediction: &str) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Persistence(format!("{}: {e}", parent.display())))?;
        }
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        tokio::fs::write(&self.path, format!("{stamp}\n{prediction}\n"))
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "Prediction recorded");
        Ok(())
    }
}
