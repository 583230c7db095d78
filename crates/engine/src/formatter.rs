//! Message formatter: renders a parsed alert as chat text.
//!
//! Output layout:
//!
//! ```text
//! <symbol> <title>
//!
//! <body>
//!
//! 📖 [Read more](<link>)
//! ```
//!
//! The body and link sections are omitted when empty. Length is measured in
//! UTF-16 code units, the unit the chat platform counts its limit in.

use herald_common::types::{ParsedAlert, Severity};

/// Maximum message length accepted by the chat platform.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Appended when a message had to be cut.
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Deterministic alert-to-text renderer.
pub struct MessageFormatter {
    max_len: usize,
}

impl MessageFormatter {
    pub fn new() -> Self {
        Self::with_max_len(MAX_MESSAGE_LEN)
    }

    /// Formatter with a custom length cap (never below the marker length).
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(utf16_len(TRUNCATION_MARKER)),
        }
    }

    /// Leading symbol for a severity.
    pub fn severity_symbol(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => "🔴",
            Severity::High => "🟠",
            Severity::Medium => "🟡",
            Severity::Low | Severity::Unknown => "⚪",
        }
    }

    pub fn format(&self, alert: &ParsedAlert) -> String {
        let mut text = format!(
            "{} {}",
            Self::severity_symbol(alert.severity()),
            alert.title()
        );

        if !alert.body().is_empty() {
            text.push_str("\n\n");
            text.push_str(alert.body());
        }

        if let Some(link) = alert.link() {
            text.push_str("\n\n📖 [Read more](");
            text.push_str(link);
            text.push(')');
        }

        self.truncate(text)
    }

    /// Cut `text` so that it fits the cap, marker included.
    pub fn truncate(&self, text: String) -> String {
        if utf16_len(&text) <= self.max_len {
            return text;
        }

        let budget = self.max_len - utf16_len(TRUNCATION_MARKER);
        let mut used = 0;
        let mut cut = 0;
        for (idx, ch) in text.char_indices() {
            if used + ch.len_utf16() > budget {
                break;
            }
            used += ch.len_utf16();
            cut = idx + ch.len_utf8();
        }

        let mut truncated = text[..cut].to_string();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    }
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Length in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use herald_common::types::{GenericAlert, TemplatedAlert};

    use super::*;

    fn templated(severity: Severity, body: &str, link: Option<&str>) -> ParsedAlert {
        ParsedAlert::Templated(TemplatedAlert {
            title: "Breaking: Successful deployment test".to_string(),
            body: body.to_string(),
            severity,
            link: link.map(str::to_string),
            template: "impact-html".to_string(),
        })
    }

    #[test]
    fn test_full_layout() {
        let text = MessageFormatter::new().format(&templated(
            Severity::Critical,
            "This is a test.",
            Some("https://example.com"),
        ));
        assert_eq!(
            text,
            "🔴 Breaking: Successful deployment test\n\nThis is a test.\n\n📖 [Read more](https://example.com)"
        );
    }

    #[test]
    fn test_link_line_omitted_without_link() {
        let text = MessageFormatter::new().format(&templated(Severity::High, "Body", None));
        assert_eq!(text, "🟠 Breaking: Successful deployment test\n\nBody");
    }

    #[test]
    fn test_empty_body_section_omitted() {
        let text = MessageFormatter::new().format(&templated(
            Severity::Medium,
            "",
            Some("https://e.com"),
        ));
        assert_eq!(
            text,
            "🟡 Breaking: Successful deployment test\n\n📖 [Read more](https://e.com)"
        );
    }

    #[test]
    fn test_symbols() {
        assert_eq!(MessageFormatter::severity_symbol(Severity::Critical), "🔴");
        assert_eq!(MessageFormatter::severity_symbol(Severity::High), "🟠");
        assert_eq!(MessageFormatter::severity_symbol(Severity::Medium), "🟡");
        assert_eq!(MessageFormatter::severity_symbol(Severity::Low), "⚪");
        assert_eq!(MessageFormatter::severity_symbol(Severity::Unknown), "⚪");
    }

    #[test]
    fn test_generic_alert() {
        let alert = ParsedAlert::Generic(GenericAlert {
            title: "Weekly digest".to_string(),
            body: "Lots of news".to_string(),
        });
        assert_eq!(
            MessageFormatter::new().format(&alert),
            "⚪ Weekly digest\n\nLots of news"
        );
    }

    #[test]
    fn test_deterministic() {
        let formatter = MessageFormatter::new();
        let alert = templated(Severity::Low, "Body", Some("https://e.com"));
        assert_eq!(formatter.format(&alert), formatter.format(&alert.clone()));
    }

    #[test]
    fn test_truncation_fits_limit() {
        let formatter = MessageFormatter::new();
        let body = "x".repeat(10_000);
        let text = formatter.format(&templated(Severity::Critical, &body, Some("https://e.com")));
        assert_eq!(utf16_len(&text), MAX_MESSAGE_LEN);
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert!(text.starts_with("🔴 Breaking:"));
    }

    #[test]
    fn test_truncation_never_splits_surrogate_pairs() {
        let formatter = MessageFormatter::with_max_len(20);
        // Each emoji is two UTF-16 units; budget after the marker is 5 units.
        let text = formatter.truncate("🔴🔴🔴🔴🔴🔴".to_string());
        assert_eq!(text, "🔴🔴... (truncated)");
        assert!(utf16_len(&text) <= 20);
    }

    #[test]
    fn test_short_text_untouched() {
        let formatter = MessageFormatter::with_max_len(100);
        assert_eq!(formatter.truncate("short".to_string()), "short");
    }
}
