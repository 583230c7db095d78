//! Delivery client: bounded retry around a [`ChatSender`].
//!
//! Transport and server failures consume the attempt budget with
//! exponential backoff in between. Rate-limit replies are waited out without
//! consuming it, up to `max_rate_limit_waits` in a row. A rejection stops
//! immediately.

use std::sync::Arc;

use herald_common::error::{DeliveryError, SendError};
use herald_common::types::DeliveryAttempt;

use crate::ChatSender;
use crate::retry::{RetryConfig, Sleeper, TokioSleeper};

pub struct DeliveryClient {
    sender: Arc<dyn ChatSender>,
    sleeper: Arc<dyn Sleeper>,
    config: RetryConfig,
}

impl DeliveryClient {
    pub fn new(sender: Arc<dyn ChatSender>, config: RetryConfig) -> Self {
        Self::with_sleeper(sender, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        sender: Arc<dyn ChatSender>,
        config: RetryConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            sender,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Deliver `text`, retrying as configured.
    pub async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.send_tracked(text).await.map(|_| ())
    }

    /// Like [`DeliveryClient::send`], returning the attempt bookkeeping on success.
    pub async fn send_tracked(&self, text: &str) -> Result<DeliveryAttempt, DeliveryError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = DeliveryAttempt::new(text);
        let mut consecutive_waits = 0u32;

        loop {
            let err = match self.sender.send_text(&attempt.text).await {
                Ok(()) => {
                    if attempt.retries > 0 || attempt.rate_limit_waits > 0 {
                        tracing::info!(
                            retries = attempt.retries,
                            rate_limit_waits = attempt.rate_limit_waits,
                            "Delivered after retry"
                        );
                    }
                    return Ok(attempt);
                }
                Err(err) => err,
            };
            attempt.last_error = Some(err.to_string());

            match err {
                SendError::RateLimited { retry_after } => {
                    consecutive_waits += 1;
                    attempt.rate_limit_waits += 1;
                    if consecutive_waits > self.config.max_rate_limit_waits {
                        tracing::error!(waits = consecutive_waits - 1, "Giving up on rate limit");
                        return Err(DeliveryError::RateLimited {
                            waits: consecutive_waits - 1,
                        });
                    }

                    let wait = self.config.rate_limit_wait(retry_after);
                    tracing::warn!(
                        wait_ms = wait.as_millis() as u64,
                        consecutive_waits,
                        "Rate limited, waiting before retry"
                    );
                    self.sleeper.sleep(wait).await;
                }
                SendError::Rejected { .. } => {
                    tracing::error!(error = %err, "Delivery rejected");
                    return Err(DeliveryError::Rejected(err.to_string()));
                }
                SendError::Connection(_) | SendError::Server { .. } => {
                    consecutive_waits = 0;
                    let attempts_made = attempt.retries + 1;
                    if attempts_made >= max_attempts {
                        tracing::error!(attempts = attempts_made, error = %err, "Delivery failed");
                        return Err(DeliveryError::Exhausted {
                            attempts: attempts_made,
                            last_error: err.to_string(),
                        });
                    }

                    attempt.retries += 1;
                    let delay = self.config.backoff_delay(attempt.retries);
                    tracing::warn!(
                        attempt = attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Send failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}
