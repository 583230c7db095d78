use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder value shipped in sample env files; never a real chat.
const CHAT_ID_PLACEHOLDER: &str = "YOUR_CHAT_ID_HERE";

/// Older deployments name the mailbox credentials after the provider.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("IMAP_USER", "ZOHO_USER"),
    ("IMAP_PASSWORD", "ZOHO_PASS"),
];

/// Global application configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    /// Mailbox login (usually the address itself)
    pub imap_user: String,

    /// Mailbox password or app password
    pub imap_password: String,

    /// IMAP server host (default: imap.zoho.eu)
    pub imap_host: String,

    /// IMAP implicit-TLS port (default: 993)
    pub imap_port: u16,

    /// Folder to poll (default: INBOX)
    pub imap_mailbox: String,

    /// Set `\Seen` on messages once they are relayed (default: true)
    pub imap_mark_seen: bool,

    /// Telegram bot token
    pub telegram_token: String,

    /// Destination chat identifier
    pub telegram_chat_id: String,

    /// Mailbox polling interval in seconds (default: 10)
    pub poll_interval_secs: u64,

    /// Send attempts per message before giving up (default: 5)
    pub delivery_max_attempts: u32,

    /// First retry delay in milliseconds, doubled per failure (default: 1000)
    pub delivery_backoff_base_ms: u64,

    /// Retry delay ceiling in milliseconds (default: 30000)
    pub delivery_backoff_max_ms: u64,

    /// Wait used when a rate-limit response has no retry-after (default: 5)
    pub rate_limit_default_secs: u64,

    /// Maximum number of remembered message ids (default: 50)
    pub dedup_cap: usize,

    /// Ids kept after the cap is exceeded (default: 25)
    pub dedup_retain: usize,

    /// Path of the persisted dedup record
    pub state_file: PathBuf,

    /// Consecutive failed ticks before a health notification (default: 5)
    pub health_failure_threshold: u32,

    /// Connect/read timeout for network calls in seconds (default: 30)
    pub network_timeout_secs: u64,

    /// Characters of body text kept for non-alert messages (default: 300)
    pub generic_body_chars: usize,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup_set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get = |key: &str| {
            lookup_set(key).or_else(|| {
                LEGACY_ALIASES
                    .iter()
                    .find(|(current, _)| *current == key)
                    .and_then(|(_, legacy)| lookup_set(legacy))
            })
        };

        let required = ["IMAP_USER", "IMAP_PASSWORD", "TG_TOKEN", "TG_CHAT_ID"];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        }

        let telegram_chat_id = get("TG_CHAT_ID").unwrap_or_default();
        if telegram_chat_id == CHAT_ID_PLACEHOLDER {
            anyhow::bail!(
                "TG_CHAT_ID is still the placeholder value; send a message to the bot and read the chat id from getUpdates"
            );
        }

        let dedup_cap: usize = parse_or(&get, "DEDUP_CAP", 50)?;
        let dedup_retain: usize = parse_or(&get, "DEDUP_RETAIN", 25)?;
        if dedup_retain == 0 || dedup_retain > dedup_cap {
            anyhow::bail!("DEDUP_RETAIN must be between 1 and DEDUP_CAP ({dedup_cap})");
        }

        let delivery_max_attempts: u32 = parse_or(&get, "DELIVERY_MAX_ATTEMPTS", 5)?;
        if delivery_max_attempts == 0 {
            anyhow::bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            imap_user: get("IMAP_USER").unwrap_or_default(),
            imap_password: get("IMAP_PASSWORD").unwrap_or_default(),
            imap_host: get("IMAP_HOST").unwrap_or_else(|| "imap.zoho.eu".to_string()),
            imap_port: parse_or(&get, "IMAP_PORT", 993)?,
            imap_mailbox: get("IMAP_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            imap_mark_seen: parse_or(&get, "IMAP_MARK_SEEN", true)?,
            telegram_token: get("TG_TOKEN").unwrap_or_default(),
            telegram_chat_id,
            poll_interval_secs: parse_or(&get, "POLL_INTERVAL_SECS", 10)?,
            delivery_max_attempts,
            delivery_backoff_base_ms: parse_or(&get, "DELIVERY_BACKOFF_BASE_MS", 1000)?,
            delivery_backoff_max_ms: parse_or(&get, "DELIVERY_BACKOFF_MAX_MS", 30_000)?,
            rate_limit_default_secs: parse_or(&get, "RATE_LIMIT_DEFAULT_SECS", 5)?,
            dedup_cap,
            dedup_retain,
            state_file: get("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/last_check.json")),
            health_failure_threshold: parse_or(&get, "HEALTH_FAILURE_THRESHOLD", 5)?,
            network_timeout_secs: parse_or(&get, "NETWORK_TIMEOUT_SECS", 30)?,
            generic_body_chars: parse_or(&get, "GENERIC_BODY_CHARS", 300)?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

// Secrets stay out of logs and panic messages.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("imap_user", &self.imap_user)
            .field("imap_password", &"<redacted>")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("imap_mailbox", &self.imap_mailbox)
            .field("imap_mark_seen", &self.imap_mark_seen)
            .field("telegram_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("delivery_max_attempts", &self.delivery_max_attempts)
            .field("dedup_cap", &self.dedup_cap)
            .field("dedup_retain", &self.dedup_retain)
            .field("state_file", &self.state_file)
            .field("health_failure_threshold", &self.health_failure_threshold)
            .finish_non_exhaustive()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("IMAP_USER", "alerts@example.com"),
            ("IMAP_PASSWORD", "hunter2"),
            ("TG_TOKEN", "123:ABC"),
            ("TG_CHAT_ID", "-100200300"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&required())).unwrap();
        assert_eq!(config.imap_host, "imap.zoho.eu");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.imap_mailbox, "INBOX");
        assert!(config.imap_mark_seen);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.delivery_max_attempts, 5);
        assert_eq!(config.dedup_cap, 50);
        assert_eq!(config.dedup_retain, 25);
        assert_eq!(config.state_file, PathBuf::from("data/last_check.json"));
        assert_eq!(config.network_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_all_missing_variables_reported() {
        let err = AppConfig::from_lookup(lookup_from(&[("IMAP_USER", "a@b.c")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("IMAP_PASSWORD"));
        assert!(msg.contains("TG_TOKEN"));
        assert!(msg.contains("TG_CHAT_ID"));
        assert!(!msg.contains("IMAP_USER"));
    }

    #[test]
    fn test_placeholder_chat_id_rejected() {
        let mut pairs = required();
        pairs[3] = ("TG_CHAT_ID", "YOUR_CHAT_ID_HERE");
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let mut pairs = required();
        pairs.push(("POLL_INTERVAL_SECS", "soon"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_retain_must_not_exceed_cap() {
        let mut pairs = required();
        pairs.push(("DEDUP_CAP", "10"));
        pairs.push(("DEDUP_RETAIN", "20"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_legacy_credential_names_accepted() {
        let pairs = [
            ("ZOHO_USER", "old@example.com"),
            ("ZOHO_PASS", "legacy-pass"),
            ("TG_TOKEN", "123:ABC"),
            ("TG_CHAT_ID", "-100200300"),
        ];
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.imap_user, "old@example.com");
        assert_eq!(config.imap_password, "legacy-pass");
    }

    #[test]
    fn test_current_name_wins_over_legacy() {
        let mut pairs = required();
        pairs.push(("ZOHO_USER", "old@example.com"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.imap_user, "alerts@example.com");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig::from_lookup(lookup_from(&required())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("123:ABC"));
    }
}
