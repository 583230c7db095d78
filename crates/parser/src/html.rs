//! HTML text extraction for alert emails.
//!
//! Produces the text of every block-level element in document order plus the
//! anchors found along the way. Markup is parsed with html5ever through
//! `scraper`, so malformed input is recovered the way a browser would and
//! entities are already decoded.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose content is never rendered.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "title", "head", "template", "noscript"];

/// Elements that start a new text block.
const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "body",
    "center",
    "div",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "html",
    "li",
    "p",
    "section",
    "table",
    "td",
    "th",
    "tr",
];

static BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&BLOCK_ELEMENTS.join(", ")).expect("block selector is valid")
});

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Text owned directly by one block element (inline children included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub tag: String,
    pub text: String,
}

impl TextBlock {
    pub fn is_heading(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

/// Text content of a parsed HTML document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    blocks: Vec<TextBlock>,
    anchors: Vec<Anchor>,
    text: String,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);

        let blocks = parsed
            .select(&BLOCKS)
            .filter(|el| !inside_skipped(*el))
            .map(|el| {
                let mut text = String::new();
                render(el, &mut text, Scope::OwnBlock);
                TextBlock {
                    tag: el.value().name().to_string(),
                    text: collapse_whitespace(&text),
                }
            })
            .collect();

        let anchors = parsed
            .select(&ANCHORS)
            .filter(|el| !inside_skipped(*el))
            .map(|el| {
                let mut text = String::new();
                render(el, &mut text, Scope::All);
                Anchor {
                    href: el.value().attr("href").unwrap_or_default().trim().to_string(),
                    text: collapse_whitespace(&text),
                }
            })
            .collect();

        let mut text = String::new();
        render(parsed.root_element(), &mut text, Scope::All);

        Self {
            blocks,
            anchors,
            text: collapse_whitespace(&text),
        }
    }

    /// Non-empty text blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.blocks.iter().filter(|b| !b.text.is_empty())
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// All rendered text, whitespace collapsed.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Strip tags, drop scripts/styles, decode entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    Document::parse(html).text
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Everything below the element.
    All,
    /// Stop at nested blocks; they own their text.
    OwnBlock,
}

/// Append the rendered text below `element`. Block boundaries and `<br>`
/// become spaces so adjacent words never merge.
fn render(element: ElementRef<'_>, out: &mut String, scope: Scope) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push(' ');
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };

                if BLOCK_ELEMENTS.contains(&name) {
                    out.push(' ');
                    if scope == Scope::All {
                        render(child, out, scope);
                        out.push(' ');
                    }
                } else {
                    render(child, out, scope);
                }
            }
            _ => {}
        }
    }
}

fn inside_skipped(element: ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
    })
}

/// Collapse every whitespace run into a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
