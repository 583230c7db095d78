use std::sync::LazyLock;

use regex::Regex;

use herald_common::error::ParseError;
use herald_common::types::{MessageBody, RawMessage, Severity, TemplatedAlert};

use crate::AlertTemplate;
use crate::html::{Anchor, Document, TextBlock};

/// Impact image embedded by the alert provider, e.g. `cc-impact-sm-red.png`.
static IMPACT_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cc-impact-sm-([a-z]+)\.png").expect("impact image pattern is valid")
});

/// Marker the provider puts in front of every alert headline.
const HEADLINE_MARKER: &str = "Breaking:";

/// Anchor texts that point at the full story.
const STORY_LINK_TEXTS: &[&str] = &["view story", "read more"];

/// HTML alert template recognized by its impact image.
///
/// Severity comes from the color token in the image filename; title, body and
/// link come from the first headline block, paragraph and story anchor.
pub struct ImpactTemplate;

impl ImpactTemplate {
    pub fn new() -> Self {
        Self
    }

    /// Severity of the first impact image in the document, if any.
    pub fn detect_severity(html: &str) -> Option<Severity> {
        IMPACT_IMAGE
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|token| Severity::from_impact_token(token.as_str()))
    }

    fn find_title(doc: &Document) -> Option<(usize, String)> {
        let blocks: Vec<&TextBlock> = doc.blocks().collect();

        let marked = blocks.iter().enumerate().find_map(|(idx, block)| {
            block
                .text
                .find(HEADLINE_MARKER)
                .map(|pos| (idx, block.text[pos..].trim().to_string()))
        });

        marked.or_else(|| {
            blocks
                .iter()
                .enumerate()
                .find(|(_, block)| block.is_heading() || block.tag == "div")
                .map(|(idx, block)| (idx, block.text.clone()))
        })
    }

    fn find_link(anchors: &[Anchor]) -> Option<String> {
        let usable = |a: &&Anchor| !a.href.is_empty() && !a.href.starts_with('#');

        anchors
            .iter()
            .filter(usable)
            .find(|a| {
                let text = a.text.to_lowercase();
                STORY_LINK_TEXTS.iter().any(|t| text.contains(t))
            })
            .or_else(|| anchors.iter().find(usable))
            .map(|a| a.href.clone())
    }
}

impl Default for ImpactTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertTemplate for ImpactTemplate {
    fn name(&self) -> &'static str {
        "impact-html"
    }

    fn matches(&self, message: &RawMessage) -> bool {
        matches!(&message.body, MessageBody::Html(html) if IMPACT_IMAGE.is_match(html))
    }

    fn parse(&self, message: &RawMessage) -> Result<TemplatedAlert, ParseError> {
        let html = message.body.as_str();
        let severity = Self::detect_severity(html).unwrap_or(Severity::Unknown);
        let doc = Document::parse(html);

        let (title_idx, title) = Self::find_title(&doc).ok_or(ParseError::MissingField {
            template: "impact-html",
            field: "title",
        })?;

        let body = doc
            .blocks()
            .enumerate()
            .find(|(idx, block)| *idx != title_idx && block.tag == "p")
            .map(|(_, block)| block.text.clone())
            .unwrap_or_default();

        Ok(TemplatedAlert {
            title,
            body,
            severity,
            link: Self::find_link(doc.anchors()),
            template: self.name().to_string(),
        })
    }
}
