use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity, derived from the impact image embedded in alert emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Map the color token from an impact image filename (`cc-impact-sm-<token>.png`).
    ///
    /// The provider uses both full color names and three-letter abbreviations.
    pub fn from_impact_token(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "red" => Severity::Critical,
            "orange" | "ora" => Severity::High,
            "yellow" | "yel" => Severity::Medium,
            "grey" | "gray" | "gry" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decoded message body. HTML is kept verbatim for template matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum MessageBody {
    Html(String),
    Plain(String),
}

impl MessageBody {
    pub fn as_str(&self) -> &str {
        match self {
            MessageBody::Html(s) | MessageBody::Plain(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, MessageBody::Html(_))
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        MessageBody::Plain(String::new())
    }
}

/// A message fetched from the mailbox, owned by the poller for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Stable identifier, unique within the mailbox (the IMAP UID).
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}

/// Alert recognized from a known provider template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatedAlert {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub link: Option<String>,
    /// Name of the template that produced this alert (for logging).
    pub template: String,
}

/// Fallback rendering of a message no template recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericAlert {
    pub title: String,
    pub body: String,
}

/// Structured content extracted from a [`RawMessage`], ready for formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedAlert {
    Templated(TemplatedAlert),
    Generic(GenericAlert),
}

impl ParsedAlert {
    pub fn title(&self) -> &str {
        match self {
            ParsedAlert::Templated(a) => &a.title,
            ParsedAlert::Generic(a) => &a.title,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ParsedAlert::Templated(a) => &a.body,
            ParsedAlert::Generic(a) => &a.body,
        }
    }

    /// Generic alerts carry no severity indicator.
    pub fn severity(&self) -> Severity {
        match self {
            ParsedAlert::Templated(a) => a.severity,
            ParsedAlert::Generic(_) => Severity::Unknown,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            ParsedAlert::Templated(a) => a.link.as_deref(),
            ParsedAlert::Generic(_) => None,
        }
    }

    pub fn is_templated(&self) -> bool {
        matches!(self, ParsedAlert::Templated(_))
    }
}

/// State of a single send operation, kept only while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub text: String,
    /// Failed attempts so far (rate-limit waits are not counted).
    pub retries: u32,
    /// Rate-limit waits so far.
    pub rate_limit_waits: u32,
    pub last_error: Option<String>,
}

impl DeliveryAttempt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            retries: 0,
            rate_limit_waits: 0,
            last_error: None,
        }
    }
}
