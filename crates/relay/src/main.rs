use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use herald_common::config::AppConfig;
use herald_engine::{DedupLimits, MessageFormatter};
use herald_notifier::{DeliveryClient, RetryConfig, TelegramSender};
use herald_parser::AlertParser;
use herald_relay::imap::{ImapMailbox, ImapSettings};
use herald_relay::poller::MailboxPoller;
use herald_relay::signal::wait_for_shutdown_signal;
use herald_relay::supervisor::{Supervisor, SupervisorSettings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_relay=info,herald_notifier=info,herald_parser=info,herald_engine=info"
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("Herald mail relay starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(config = ?config, "Configuration loaded");

    let sender = TelegramSender::new(
        &config.telegram_token,
        config.telegram_chat_id.clone(),
        config.network_timeout(),
    )?;
    let delivery = Arc::new(DeliveryClient::new(
        Arc::new(sender),
        RetryConfig {
            max_attempts: config.delivery_max_attempts,
            base_delay: Duration::from_millis(config.delivery_backoff_base_ms),
            max_delay: Duration::from_millis(config.delivery_backoff_max_ms),
            default_rate_limit_wait: Duration::from_secs(config.rate_limit_default_secs),
            ..RetryConfig::default()
        },
    ));

    let imap = ImapSettings::from_config(&config);
    let settings = SupervisorSettings {
        poll_interval: config.poll_interval(),
        state_file: config.state_file.clone(),
        dedup_limits: DedupLimits::new(config.dedup_cap, config.dedup_retain)?,
        health_failure_threshold: config.health_failure_threshold,
        mailbox_label: imap.label(),
    };

    let poller = MailboxPoller::new(
        ImapMailbox::new(imap),
        AlertParser::new(config.generic_body_chars),
        MessageFormatter::new(),
        delivery.clone(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let mut supervisor = Supervisor::new(poller, delivery, settings, shutdown);
    supervisor.run().await;

    tracing::info!("Herald mail relay stopped.");
    Ok(())
}
