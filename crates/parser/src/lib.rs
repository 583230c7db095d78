pub mod breaking;
pub mod generic;
pub mod html;
pub mod impact;
pub mod mime;

#[cfg(test)]
mod parser_tests;

use herald_common::error::ParseError;
use herald_common::types::{ParsedAlert, RawMessage, TemplatedAlert};

use crate::generic::GenericParser;

/// Trait that every provider-specific alert template implements.
pub trait AlertTemplate: Send + Sync {
    /// Human-readable name for this template (e.g., "impact-html").
    fn name(&self) -> &'static str;

    /// Whether the message carries this template's distinguishing marker.
    fn matches(&self, message: &RawMessage) -> bool;

    /// Extract the alert. Only called when [`AlertTemplate::matches`] is true.
    fn parse(&self, message: &RawMessage) -> Result<TemplatedAlert, ParseError>;
}

/// Registry of alert templates with a generic fallback, used by the poller.
///
/// Parsing never fails: a message no template recognizes, or one whose
/// template extraction fails, is rendered by the generic fallback.
pub struct AlertParser {
    templates: Vec<Box<dyn AlertTemplate>>,
    generic: GenericParser,
}

impl AlertParser {
    /// Create a parser with all known templates.
    ///
    /// `generic_body_chars` bounds the body of fallback alerts.
    pub fn new(generic_body_chars: usize) -> Self {
        Self::with_templates(
            vec![
                Box::new(impact::ImpactTemplate::new()),
                Box::new(breaking::BreakingTextTemplate::new()),
            ],
            generic_body_chars,
        )
    }

    /// Create a parser with a custom template list, tried in order.
    pub fn with_templates(
        templates: Vec<Box<dyn AlertTemplate>>,
        generic_body_chars: usize,
    ) -> Self {
        Self {
            templates,
            generic: GenericParser::new(generic_body_chars),
        }
    }

    /// Parse a message with the first matching template, else the fallback.
    pub fn parse(&self, message: &RawMessage) -> ParsedAlert {
        for template in self.templates.iter().filter(|t| t.matches(message)) {
            match template.parse(message) {
                Ok(alert) => {
                    tracing::debug!(
                        id = %message.id,
                        template = template.name(),
                        severity = %alert.severity,
                        "Parsed templated alert"
                    );
                    return ParsedAlert::Templated(alert);
                }
                Err(e) => {
                    tracing::warn!(
                        id = %message.id,
                        template = template.name(),
                        error = %e,
                        "Template matched but extraction failed"
                    );
                }
            }
        }

        tracing::debug!(id = %message.id, "No template matched, using generic fallback");
        ParsedAlert::Generic(self.generic.parse(message))
    }
}

impl Default for AlertParser {
    fn default() -> Self {
        Self::new(300)
    }
}
