//! Fixture tests for the alert templates and the `AlertParser` routing.
//!
//! Fixtures mirror the layouts seen in real provider emails: a full HTML
//! alert, one padded with styles and scripts, truncated markup, plain-text
//! renderings and unrelated mail.

use chrono::Utc;

use herald_common::types::{MessageBody, ParsedAlert, RawMessage, Severity};

use crate::AlertParser;
use crate::mime::parse_message;

// ───────────────────────────── helpers ──────────────────────────────

fn html_message(subject: &str, html: &str) -> RawMessage {
    RawMessage {
        id: "101".to_string(),
        subject: subject.to_string(),
        sender: "CryptoCraft <alerts@cryptocraft.com>".to_string(),
        body: MessageBody::Html(html.to_string()),
        received_at: Utc::now(),
    }
}

fn templated(alert: ParsedAlert) -> herald_common::types::TemplatedAlert {
    match alert {
        ParsedAlert::Templated(a) => a,
        ParsedAlert::Generic(g) => panic!("expected templated alert, got generic: {g:?}"),
    }
}

const TYPICAL: &str = r#"
    <html>
        <img src="cc-impact-sm-red.png">
        <div>Breaking: Successful deployment test</div>
        <p>This is a test.</p>
        <a href="https://example.com">View Story</a>
    </html>
"#;

const EDGE: &str = r#"
    <html>
        <img src='cc-impact-sm-yel.png'>
        <style>body {font-family: 'Arial';}</style>
        <script>alert('Hello');</script>
        <div>Breaking: Edge Case Scenario</div>
        <span>View Story</span>
    </html>
"#;

const MALFORMED: &str = r#"
    <html>
        <img src='cc-impact-sm-ora.png'>
        <div>Breaking</div>
    </malformed>
"#;

// ═══════════════════════════════════════════════════════════════════
//  Impact HTML template
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_typical_alert() {
    let parser = AlertParser::default();
    let alert = templated(parser.parse(&html_message("Breaking: Test Alert", TYPICAL)));

    assert_eq!(alert.title, "Breaking: Successful deployment test");
    assert_eq!(alert.body, "This is a test.");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.link.as_deref(), Some("https://example.com"));
    assert_eq!(alert.template, "impact-html");
}

#[test]
fn test_styles_scripts_and_missing_anchor() {
    let parser = AlertParser::default();
    let alert = templated(parser.parse(&html_message("Breaking: Edge", EDGE)));

    assert_eq!(alert.title, "Breaking: Edge Case Scenario");
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.body, "");
    assert!(alert.link.is_none(), "a span is not a link");
}

#[test]
fn test_malformed_markup_is_best_effort() {
    let parser = AlertParser::default();
    let alert = templated(parser.parse(&html_message("Breaking", MALFORMED)));

    assert_eq!(alert.title, "Breaking");
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.link.is_none());
}

#[test]
fn test_unknown_color_token() {
    let parser = AlertParser::default();
    let html = TYPICAL.replace("cc-impact-sm-red.png", "cc-impact-sm-teal.png");
    let alert = parser.parse(&html_message("x", &html));
    assert_eq!(alert.severity(), Severity::Unknown);
}

#[test]
fn test_headline_inside_table_cell_with_entities() {
    let html = r#"
        <table><tr><td><img src="https://cdn.example/cc-impact-sm-grey.png"></td>
        <td style="font-size:18px">&#x1F6A8; Breaking: Fed&nbsp;holds <b>rates</b></td></tr></table>
        <p>Policy makers kept rates unchanged &amp; signalled patience.</p>
        <p>Second paragraph</p>
        <a href="https://cryptocraft.com/news/1?utm=mail&amp;x=1">View Story</a>
        <a href="https://cryptocraft.com/unsubscribe">Unsubscribe</a>
    "#;
    let parser = AlertParser::default();
    let alert = templated(parser.parse(&html_message("Breaking: Fed", html)));

    assert_eq!(alert.title, "Breaking: Fed holds rates");
    assert_eq!(alert.body, "Policy makers kept rates unchanged & signalled patience.");
    assert_eq!(alert.severity, Severity::Low);
    assert_eq!(
        alert.link.as_deref(),
        Some("https://cryptocraft.com/news/1?utm=mail&x=1")
    );
}

#[test]
fn test_template_without_title_falls_back_to_generic() {
    let parser = AlertParser::default();
    let html = r#"<img src="cc-impact-sm-red.png"><p>only a paragraph</p>"#;
    let alert = parser.parse(&html_message("Subject line", html));

    match alert {
        ParsedAlert::Generic(g) => {
            assert_eq!(g.title, "Subject line");
            assert_eq!(g.body, "only a paragraph");
        }
        other => panic!("expected generic fallback, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Fallback routing
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_unrecognized_html_is_generic() {
    let parser = AlertParser::default();
    let alert = parser.parse(&html_message(
        "Your invoice",
        "<h1>Invoice</h1><p>Amount due: 10 EUR</p><a href='https://billing.example'>Pay</a>",
    ));

    assert!(!alert.is_templated());
    assert_eq!(alert.title(), "Your invoice");
    assert_eq!(alert.body(), "Invoice Amount due: 10 EUR Pay");
    assert_eq!(alert.severity(), Severity::Unknown);
    assert!(alert.link().is_none());
}

#[test]
fn test_empty_body_is_not_an_error() {
    let parser = AlertParser::default();
    let mut msg = html_message("Empty", "");
    msg.body = MessageBody::Plain(String::new());
    let alert = parser.parse(&msg);
    assert_eq!(alert.title(), "Empty");
    assert_eq!(alert.body(), "");
}

#[test]
fn test_plain_text_alert_uses_text_template() {
    let parser = AlertParser::default();
    let mut msg = html_message("Breaking: x", "");
    msg.body = MessageBody::Plain(
        "Breaking: Stablecoin depegs\nThe stablecoin fell below one dollar overnight.\nhttps://example.com/s/9".to_string(),
    );
    let alert = templated(parser.parse(&msg));
    assert_eq!(alert.template, "breaking-text");
    assert_eq!(alert.link.as_deref(), Some("https://example.com/s/9"));
}

#[test]
fn test_generic_body_budget_is_configurable() {
    let parser = AlertParser::new(4);
    let mut msg = html_message("Hello", "");
    msg.body = MessageBody::Plain("abcdefgh".to_string());
    assert_eq!(parser.parse(&msg).body(), "abcd");
}

// ═══════════════════════════════════════════════════════════════════
//  Raw RFC 822 → ParsedAlert
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_rfc822_alert_end_to_end() {
    let raw = concat!(
        "From: CryptoCraft <alerts@cryptocraft.com>\r\n",
        "Subject: Breaking: Test Alert\r\n",
        "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
        "\r\n",
        "--b1\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Breaking: Successful deployment test\r\n",
        "--b1\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "<img src=3D\"cc-impact-sm-red.png\"><div>Breaking: Successful deployment=\r\n",
        " test</div><p>This is a test.</p><a href=3D\"https://example.com\">View Story</a>\r\n",
        "--b1--\r\n",
    );

    let msg = parse_message("42", raw.as_bytes(), None);
    assert!(msg.body.is_html());

    let alert = templated(AlertParser::default().parse(&msg));
    assert_eq!(alert.title, "Breaking: Successful deployment test");
    assert_eq!(alert.body, "This is a test.");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.link.as_deref(), Some("https://example.com"));
}
