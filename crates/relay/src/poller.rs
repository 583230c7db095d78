use std::collections::HashSet;
use std::sync::Arc;

use herald_common::error::DeliveryError;
use herald_common::types::RawMessage;
use herald_engine::{DedupStore, MessageFormatter};
use herald_notifier::DeliveryClient;
use herald_parser::AlertParser;

use crate::mailbox::Mailbox;

/// Outcome of one poll tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Messages returned by the mailbox.
    pub fetched: usize,
    /// Messages skipped because their id was already relayed.
    pub already_relayed: usize,
    pub delivered: usize,
    /// Messages whose delivery gave up; they stay unseen for a later tick.
    pub failed: usize,
    pub fetch_error: Option<String>,
    pub persist_error: Option<String>,
}

impl TickReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }

    /// A tick is unhealthy when the fetch or a persist failed, or when every
    /// attempted delivery failed.
    pub fn is_healthy(&self) -> bool {
        self.fetch_error.is_none()
            && self.persist_error.is_none()
            && !(self.attempted() > 0 && self.delivered == 0)
    }
}

/// Fetches unseen messages and relays the new ones, one tick at a time.
pub struct MailboxPoller<M> {
    mailbox: M,
    parser: AlertParser,
    formatter: MessageFormatter,
    delivery: Arc<DeliveryClient>,
}

impl<M: Mailbox> MailboxPoller<M> {
    pub fn new(
        mailbox: M,
        parser: AlertParser,
        formatter: MessageFormatter,
        delivery: Arc<DeliveryClient>,
    ) -> Self {
        Self {
            mailbox,
            parser,
            formatter,
            delivery,
        }
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    /// Run one fetch → filter → parse → format → deliver pass.
    ///
    /// An id is recorded and persisted only after its delivery succeeded.
    /// Errors never escape a tick; they are reported in the [`TickReport`].
    pub async fn tick(&mut self, store: &mut DedupStore) -> TickReport {
        let mut report = TickReport::default();

        let messages = match self.mailbox.fetch_unseen().await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Mailbox fetch failed");
                report.fetch_error = Some(e.to_string());
                if let Err(e) = self.mailbox.close().await {
                    tracing::debug!(error = %e, "Mailbox close failed");
                }
                return report;
            }
        };
        report.fetched = messages.len();

        let mut seen_this_tick = HashSet::new();
        let mut handled = Vec::new();

        for message in messages {
            if !seen_this_tick.insert(message.id.clone()) {
                tracing::debug!(id = %message.id, "Duplicate id in fetch result");
                continue;
            }

            if store.contains(&message.id) {
                tracing::debug!(id = %message.id, "Already relayed, skipping");
                report.already_relayed += 1;
                handled.push(message.id);
                continue;
            }

            match self.relay(&message).await {
                Ok(()) => {
                    report.delivered += 1;
                    store.record(message.id.clone());
                    if let Err(e) = store.persist() {
                        tracing::error!(
                            id = %message.id,
                            path = %store.path().display(),
                            error = %e,
                            "Failed to persist dedup state"
                        );
                        report.persist_error = Some(e.to_string());
                    }
                    handled.push(message.id);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        id = %message.id,
                        subject = %message.subject,
                        error = %e,
                        "Delivery failed, message left for next tick"
                    );
                }
            }
        }

        if !handled.is_empty()
            && let Err(e) = self.mailbox.mark_seen(&handled).await
        {
            tracing::warn!(count = handled.len(), error = %e, "Failed to mark messages seen");
        }

        if let Err(e) = self.mailbox.close().await {
            tracing::debug!(error = %e, "Mailbox close failed");
        }

        if report.fetched > 0 {
            tracing::info!(
                fetched = report.fetched,
                delivered = report.delivered,
                failed = report.failed,
                already_relayed = report.already_relayed,
                "Tick complete"
            );
        }

        report
    }

    async fn relay(&self, message: &RawMessage) -> Result<(), DeliveryError> {
        let alert = self.parser.parse(message);
        let text = self.formatter.format(&alert);

        tracing::info!(
            id = %message.id,
            severity = %alert.severity(),
            templated = alert.is_templated(),
            title = %alert.title(),
            "Relaying message"
        );

        self.delivery.send(&text).await
    }
}
