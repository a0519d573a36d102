use std::time::Duration;
use tracing::{error, info, warn};

use crate::constants::SMTP_OK;
use crate::error::AppError;
use crate::message::OutgoingMessage;
use crate::traits::Transport;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, delay: Duration) -> Result<Self, AppError> {
        if max_retries == 0 {
            return Err(AppError::InvalidInput("max_retries must be greater than zero".into()));
        }
        Ok(Self { max_retries, delay })
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeliveryOutcome {
    pub(crate) delivered: bool,
    pub(crate) attempts: u32,
}

/// Send one unit, retrying until the transport confirms it or attempts run out.
///
/// Delivery is confirmed only by an OK reply to the post-send health probe: a send that
/// returns without error may still sit undelivered in the server's buffer. Failures are
/// logged and reported in the outcome, never returned to the caller.
pub(crate) async fn deliver_one(
    transport: &mut dyn Transport,
    message: &OutgoingMessage,
    policy: &RetryPolicy,
) -> DeliveryOutcome {
    let mut attempts = 0;

    while attempts < policy.max_retries {
        attempts += 1;

        match send_and_confirm(transport, message).await {
            Ok(()) => {
                info!(recipient = %message.to, attempts, "Message delivered");
                return DeliveryOutcome {
                    delivered: true,
                    attempts,
                };
            }
            Err(e) => {
                warn!(
                    recipient = %message.to,
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    "Delivery failed: {e}"
                );
            }
        }

        if attempts < policy.max_retries {
            tokio::time::sleep(policy.delay).await;
        }
    }

    error!(
        recipient = %message.to,
        retries = policy.max_retries,
        "Delivery failed after {} retries",
        policy.max_retries
    );
    DeliveryOutcome {
        delivered: false,
        attempts,
    }
}

async fn send_and_confirm(transport: &mut dyn Transport, message: &OutgoingMessage) -> Result<(), AppError> {
    transport.send(message).await?;
    let status = transport.probe_health().await?;
    if status == SMTP_OK {
        Ok(())
    } else {
        Err(AppError::Transport(format!("health probe returned {status}")))
    }
}
