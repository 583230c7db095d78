use async_trait::async_trait;

use herald_common::error::MailboxError;
use herald_common::types::RawMessage;

/// Source of new messages, polled once per tick.
///
/// A tick calls [`Mailbox::fetch_unseen`], then [`Mailbox::mark_seen`] for the
/// ids it handled, then [`Mailbox::close`].
#[async_trait]
pub trait Mailbox: Send {
    /// Messages not yet marked seen, in arrival order.
    async fn fetch_unseen(&mut self) -> Result<Vec<RawMessage>, MailboxError>;

    /// Flag handled messages so they stop showing up as unseen.
    async fn mark_seen(&mut self, _ids: &[String]) -> Result<(), MailboxError> {
        Ok(())
    }

    /// Release any connection held since the fetch.
    async fn close(&mut self) -> Result<(), MailboxError> {
        Ok(())
    }
}
