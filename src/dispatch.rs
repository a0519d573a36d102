use std::time::Duration;
use tracing::{info, warn};

use crate::config::DeliveryConfig;
use crate::delivery::{deliver_one, RetryPolicy};
use crate::error::AppError;
use crate::message::PreparedMessage;
use crate::recipients::Recipient;
use crate::stats::{build_stats_json, BatchStats};
use crate::traits::{Transport, TransportFactory};

/// Courtesy pauses that keep the batch under the transport's rate limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pacing {
    pub(crate) inter_message: Duration,
    pub(crate) inter_recipient: Duration,
}

impl Pacing {
    pub(crate) fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            inter_message: config.inter_message_delay(),
            inter_recipient: config.inter_recipient_delay(),
        }
    }
}

/// Deliver `message` to every recipient over a single transport connection.
///
/// Recipients are served in order and each one's units go out back to back. A unit that
/// cannot be delivered is logged and counted; only a failure to open the connection
/// aborts the batch.
pub(crate) async fn dispatch(
    factory: &dyn TransportFactory,
    recipients: &[Recipient],
    message: &PreparedMessage,
    policy: &RetryPolicy,
    pacing: &Pacing,
) -> Result<BatchStats, AppError> {
    info!(
        recipients = recipients.len(),
        max_retries = policy.max_retries(),
        "Starting delivery batch"
    );

    // A connect failure aborts the whole batch; the caller reports it once.
    let mut transport = factory.connect().await?;

    let stats = send_all(transport.as_mut(), recipients, message, policy, pacing).await;

    if let Err(e) = transport.close().await {
        warn!("Closing transport: {e}");
    }

    info!(stats = %build_stats_json(&stats), "Delivery batch finished");
    Ok(stats)
}

async fn send_all(
    transport: &mut dyn Transport,
    recipients: &[Recipient],
    message: &PreparedMessage,
    policy: &RetryPolicy,
    pacing: &Pacing,
) -> BatchStats {
    let mut stats = BatchStats {
        recipients: recipients.len(),
        ..Default::default()
    };

    for (i, recipient) in recipients.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pacing.inter_recipient).await;
        }

        let units = message.units_for(recipient);
        info!(recipient = %recipient.address(), units = units.len(), "Sending prediction");

        for unit in &units {
            let outcome = deliver_one(transport, unit, policy).await;
            stats.record(recipient.address(), outcome);
            tokio::time::sleep(pacing.inter_message).await;
        }
    }

    stats
}
