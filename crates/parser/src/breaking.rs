use std::sync::LazyLock;

use regex::Regex;

use herald_common::error::ParseError;
use herald_common::types::{MessageBody, RawMessage, Severity, TemplatedAlert};

use crate::AlertTemplate;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>()"']+"#).expect("url pattern is valid"));

const HEADLINE_MARKER: &str = "Breaking:";

/// Body lines kept after the headline.
const MAX_BODY_LINES: usize = 5;

/// Lines shorter than this after the headline are layout noise.
const MIN_BODY_LINE_CHARS: usize = 10;

/// Leftovers of inlined CSS in text renderings of HTML mail.
const STYLE_HINTS: &[&str] = &[
    "font-family",
    "margin",
    "padding",
    "css",
    "style",
    "mso-",
    "webkit",
];

/// The footer starts at the first line mentioning one of these.
const FOOTER_HINTS: &[&str] = &["unsubscribe", "contact", "opted", "view story"];

/// Plain-text rendering of a provider alert: a `Breaking:` headline followed
/// by a few lines of body and a story URL somewhere in the text.
///
/// Plain text carries no impact image, so severity is always unknown.
pub struct BreakingTextTemplate;

impl BreakingTextTemplate {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BreakingTextTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertTemplate for BreakingTextTemplate {
    fn name(&self) -> &'static str {
        "breaking-text"
    }

    fn matches(&self, message: &RawMessage) -> bool {
        matches!(&message.body, MessageBody::Plain(text) if text.contains(HEADLINE_MARKER))
    }

    fn parse(&self, message: &RawMessage) -> Result<TemplatedAlert, ParseError> {
        let text = message.body.as_str();
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                let lower = line.to_lowercase();
                !STYLE_HINTS.iter().any(|hint| lower.contains(hint))
            });

        let title = lines
            .by_ref()
            .find_map(|line| line.find(HEADLINE_MARKER).map(|pos| line[pos..].to_string()))
            .ok_or(ParseError::MissingField {
                template: "breaking-text",
                field: "title",
            })?;

        let body_lines: Vec<&str> = lines
            .take_while(|line| {
                let lower = line.to_lowercase();
                !FOOTER_HINTS.iter().any(|hint| lower.contains(hint))
            })
            .filter(|line| line.chars().count() > MIN_BODY_LINE_CHARS)
            .filter(|line| !URL.is_match(line) || line.contains(' '))
            .take(MAX_BODY_LINES)
            .collect();

        Ok(TemplatedAlert {
            title,
            body: body_lines.join("\n"),
            severity: Severity::Unknown,
            link: URL.find(text).map(|m| m.as_str().to_string()),
            template: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn plain(text: &str) -> RawMessage {
        RawMessage {
            id: "1".to_string(),
            subject: "Alert".to_string(),
            sender: "alerts@example.com".to_string(),
            body: MessageBody::Plain(text.to_string()),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_headline_body_and_link() {
        let msg = plain(
            "CryptoCraft\n\nBreaking: Exchange halts withdrawals\n\nThe exchange paused all withdrawals this morning.\nMore details are expected soon.\n\nView Story: https://www.example.com/news/42\nUnsubscribe here\n",
        );
        let template = BreakingTextTemplate::new();
        assert!(template.matches(&msg));

        let alert = template.parse(&msg).unwrap();
        assert_eq!(alert.title, "Breaking: Exchange halts withdrawals");
        assert_eq!(
            alert.body,
            "The exchange paused all withdrawals this morning.\nMore details are expected soon."
        );
        assert_eq!(alert.link.as_deref(), Some("https://www.example.com/news/42"));
        assert_eq!(alert.severity, Severity::Unknown);
    }

    #[test]
    fn test_css_lines_skipped() {
        let msg = plain("Breaking: Test\nfont-family: Arial, sans-serif;\nActual body text line here");
        let alert = BreakingTextTemplate::new().parse(&msg).unwrap();
        assert_eq!(alert.body, "Actual body text line here");
        assert!(alert.link.is_none());
    }

    #[test]
    fn test_html_body_not_matched() {
        let mut msg = plain("x");
        msg.body = MessageBody::Html("<p>Breaking: x</p>".to_string());
        assert!(!BreakingTextTemplate::new().matches(&msg));
    }
}
