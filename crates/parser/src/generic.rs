use herald_common::types::{GenericAlert, MessageBody, RawMessage};

use crate::html::{collapse_whitespace, strip_html};

/// Title used when a message has no subject.
const NO_SUBJECT: &str = "(no subject)";

/// Generic fallback for messages no template recognizes.
///
/// The subject becomes the title and the first `body_chars` characters of the
/// stripped body become the body. Severity and link are never inferred.
pub struct GenericParser {
    body_chars: usize,
}

impl GenericParser {
    pub fn new(body_chars: usize) -> Self {
        Self { body_chars }
    }

    pub fn parse(&self, message: &RawMessage) -> GenericAlert {
        let title = match message.subject.trim() {
            "" => NO_SUBJECT.to_string(),
            subject => collapse_whitespace(subject),
        };

        let text = match &message.body {
            MessageBody::Html(html) => strip_html(html),
            MessageBody::Plain(plain) => collapse_whitespace(plain),
        };

        GenericAlert {
            title,
            body: text.chars().take(self.body_chars).collect(),
        }
    }
}
