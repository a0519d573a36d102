//! One prediction run: forecast, prompt, generate, record, classify, notify.

use tracing::{info, warn};

use crate::delivery::RetryPolicy;
use crate::dispatch::{dispatch, Pacing};
use crate::error::AppError;
use crate::helpers::truncate;
use crate::message::PreparedMessage;
use crate::prompt::{build_prediction_prompt, local_now, pick_theme};
use crate::recipients::dedupe;
use crate::state::State;
use crate::stats::BatchStats;
use crate::weather::extract_relevant_fields;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSummary {
    /// The classifier judged the prediction at or above the threshold.
    pub(crate) should_send: bool,
    /// Testing mode sent regardless of the classifier.
    pub(crate) forced: bool,
    /// `None` when nothing was dispatched.
    pub(crate) report: Option<BatchStats>,
}

pub(crate) async fn run_prediction(state: &State) -> Result<RunSummary, AppError> {
    let config = &state.config;

    let forecast = state
        .weather
        .fetch_forecast(&config.zip_code, config.weather.days, config.weather.include_alerts)
        .await?;
    let fields = extract_relevant_fields(&forecast);
    info!(fields = fields.len(), missing = fields.missing.len(), "Forecast extracted");

    let policy = read_policy(state).await;
    let now = local_now(&config.school.timezone)?;
    let theme = pick_theme(&config.llm.themes, &now);
    let prompt = build_prediction_prompt(&fields, &policy, &config.school, &config.zip_code, &now, theme);

    let prediction = state.llm.complete(&prompt).await?;
    info!(prediction = %truncate(&prediction, 120), "Prediction generated");

    if let Err(e) = state.history.record(&prediction).await {
        warn!("{e}");
    }

    let should_send = state.llm.classify(&prediction, config.llm.threshold).await?;
    let forced = !should_send && config.testing_mode;
    info!(should_send, forced, threshold = config.llm.threshold, "Prediction classified");

    if !should_send && !forced {
        info!("Below threshold, no notifications sent");
        return Ok(RunSummary {
            should_send,
            forced,
            report: None,
        });
    }

    let recipients = dedupe(state.fetch_recipients().await?);
    info!(recipients = recipients.len(), testing = config.testing_mode, "Recipients loaded");

    if recipients.is_empty() {
        warn!("No recipients to notify");
        return Ok(RunSummary {
            should_send,
            forced,
            report: None,
        });
    }
    if state.dry_run {
        for r in &recipients {
            info!(recipient = %r.address(), "Dry run, not sending");
        }
        return Ok(RunSummary {
            should_send,
            forced,
            report: None,
        });
    }

    let delivery = &config.delivery;
    let message = PreparedMessage::new(&prediction, delivery.sms_chunk_len, &delivery.signoff)?;
    let policy = RetryPolicy::new(delivery.max_retries, delivery.retry_delay())?;
    let pacing = Pacing::from_config(delivery);

    let report = dispatch(state.transport.as_ref(), &recipients, &message, &policy, &pacing).await?;
    Ok(RunSummary {
        should_send,
        forced,
        report: Some(report),
    })
}

/// The school's closure policy text, or empty when none is configured or readable.
async fn read_policy(state: &State) -> String {
    let Some(path) = &state.config.policy_path else {
        return String::new();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), "Cannot read snow day policy: {e}");
            String::new()
        }
    }
}
