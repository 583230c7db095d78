//! RFC 822 / MIME extraction.
//!
//! Turns the raw bytes fetched from the mailbox into a [`RawMessage`]. Only
//! what the relay needs is extracted: subject, sender and the first HTML (or
//! plain text) body. Transfer encodings, charsets and encoded-word headers
//! are decoded by `mail_parser`; a message it cannot parse becomes an empty
//! one instead of failing the poll.

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, PartType};

use herald_common::types::{MessageBody, RawMessage};

/// Build a [`RawMessage`] from an RFC 822 message.
///
/// `received_at` is the server's arrival time when known; otherwise the
/// `Date` header is used, and failing that the current time.
pub fn parse_message(
    id: impl Into<String>,
    raw: &[u8],
    received_at: Option<DateTime<Utc>>,
) -> RawMessage {
    let id = id.into();

    let Some(message) = MessageParser::default().parse(raw) else {
        tracing::debug!(%id, bytes = raw.len(), "Unparseable message, keeping it empty");
        return RawMessage {
            id,
            subject: String::new(),
            sender: String::new(),
            body: MessageBody::default(),
            received_at: received_at.unwrap_or_else(Utc::now),
        };
    };

    let received_at = received_at
        .or_else(|| {
            message
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        })
        .unwrap_or_else(Utc::now);

    RawMessage {
        id,
        subject: message.subject().unwrap_or_default().trim().to_string(),
        sender: sender(&message),
        body: body(&message),
        received_at,
    }
}

/// `Name <address>`, or whichever half is present.
fn sender(message: &Message<'_>) -> String {
    let Some(addr) = message.from().and_then(|from| from.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) if !name.trim().is_empty() => {
            format!("{} <{address}>", name.trim())
        }
        (_, Some(address)) => address.to_string(),
        (Some(name), None) => name.trim().to_string(),
        (None, None) => String::new(),
    }
}

/// The first real HTML part, else the first plain text part.
///
/// `mail_parser` lists an HTML part among the text bodies (and the reverse)
/// when the other kind is missing, so the part type is checked.
fn body(message: &Message<'_>) -> MessageBody {
    let html = message.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });
    if let Some(html) = html {
        return MessageBody::Html(html);
    }

    let plain = message.text_part(0).and_then(|part| match &part.body {
        PartType::Text(text) => Some(text.to_string()),
        _ => None,
    });
    plain.map(MessageBody::Plain).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_html() {
        let raw = b"From: alerts@example.com\r\nSubject: Breaking: Test Alert\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<div>Hello</div>";
        let msg = parse_message("7", raw, None);
        assert_eq!(msg.id, "7");
        assert_eq!(msg.subject, "Breaking: Test Alert");
        assert_eq!(msg.sender, "alerts@example.com");
        assert_eq!(msg.body, MessageBody::Html("<div>Hello</div>".to_string()));
    }

    #[test]
    fn test_display_name_kept_in_sender() {
        let raw = b"From: CryptoCraft <alerts@cryptocraft.com>\r\nSubject: x\r\n\r\nbody";
        let msg = parse_message("1", raw, None);
        assert_eq!(msg.sender, "CryptoCraft <alerts@cryptocraft.com>");
    }

    #[test]
    fn test_missing_content_type_is_plain() {
        let msg = parse_message("1", b"Subject: hi\n\nplain body", None);
        assert_eq!(msg.body, MessageBody::Plain("plain body".to_string()));
    }

    #[test]
    fn test_multipart_prefers_html() {
        let raw = concat!(
            "Subject: Multi\r\n",
            "Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain version\r\n",
            "--XYZ\r\n",
            "Content-Type: text/html\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "<p>html =3D version</p>\r\n",
            "--XYZ--\r\n",
        );
        let msg = parse_message("2", raw.as_bytes(), None);
        assert!(msg.body.is_html());
        assert_eq!(msg.body.as_str().trim_end(), "<p>html = version</p>");
    }

    #[test]
    fn test_nested_multipart_and_base64() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=inner\n",
            "\n",
            "--inner\n",
            "Content-Type: text/plain; charset=utf-8\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "SGVsbG8g\n",
            "d29ybGQ=\n",
            "--inner--\n",
            "--outer\n",
            "Content-Type: text/plain\n",
            "Content-Disposition: attachment; filename=a.txt\n",
            "\n",
            "attachment text\n",
            "--outer--\n",
        );
        let msg = parse_message("3", raw.as_bytes(), None);
        assert_eq!(msg.body, MessageBody::Plain("Hello world".to_string()));
    }

    #[test]
    fn test_folded_and_encoded_subject() {
        let raw = b"Subject: =?UTF-8?B?8J+UtCBCcmVha2luZw==?=\r\n =?utf-8?Q?:_Test?=\r\n\r\nbody";
        let msg = parse_message("4", raw, None);
        assert_eq!(msg.subject, "\u{1F534} Breaking: Test");
    }

    #[test]
    fn test_date_header_used_when_no_internal_date() {
        let raw = b"Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n\r\nx";
        let msg = parse_message("5", raw, None);
        assert_eq!(msg.received_at.to_rfc3339(), "2025-07-01T08:52:37+00:00");
    }

    #[test]
    fn test_internal_date_wins_over_header() {
        let raw = b"Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n\r\nx";
        let internal = "2025-07-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_message("5", raw, Some(internal)).received_at, internal);
    }

    #[test]
    fn test_latin1_charset() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xe9";
        let msg = parse_message("6", raw, None);
        assert_eq!(msg.body.as_str(), "caf\u{e9}");
    }

    #[test]
    fn test_windows_1252_punctuation() {
        let raw = b"Content-Type: text/plain; charset=windows-1252\r\n\r\n\x93Fed\x94 \x96 \x80100";
        let msg = parse_message("6", raw, None);
        assert_eq!(msg.body.as_str(), "\u{201C}Fed\u{201D} \u{2013} \u{20AC}100");
    }

    #[test]
    fn test_empty_message() {
        let msg = parse_message("8", b"", None);
        assert!(msg.body.is_empty());
        assert_eq!(msg.subject, "");
        assert_eq!(msg.id, "8");
    }
}
