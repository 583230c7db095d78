pub mod delivery;
pub mod retry;
pub mod telegram;

use async_trait::async_trait;

use herald_common::error::SendError;

pub use delivery::DeliveryClient;
pub use retry::{RetryConfig, Sleeper, TokioSleeper};
pub use telegram::TelegramSender;

/// Capability to post one text message to the configured chat.
///
/// One call is one attempt; retrying is the [`DeliveryClient`]'s job.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), SendError>;
}
