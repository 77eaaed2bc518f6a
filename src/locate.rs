//! Content location: pick the region of a rendered page most likely to be the article body.
//!
//! Candidates are tried in a fixed order and the first one whose inner text reaches
//! [MIN_CONTENT_CHARS] wins; nothing is scored. When no candidate qualifies the whole `body`
//! is returned, however short. This never fails.

use crate::model::ExtractedContent;
use crate::render::RenderedPage;
use scraper::{ElementRef, Html, Selector};

/// Region descriptors in priority order.
pub const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "main",
    "[role=\"main\"]",
    ".article-content",
    ".post-content",
    ".entry-content",
    "#content",
];

/// A region with at least this many inner-text characters is accepted.
pub const MIN_CONTENT_CHARS: usize = 200;

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start a new line of inner text.
const BLOCK_ELEMENTS: [&str; 24] = [
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main", "p", "pre",
    "section",
];

/// Where the extracted content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// One of [CONTENT_SELECTORS].
    Candidate(&'static str),
    /// Fallback: the document body (or root when there is no body).
    Body,
}

/// Extracted content plus the region it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub content: ExtractedContent,
    pub region: Region,
}

/// Locate the article content of a rendered page.
pub fn locate(page: &RenderedPage) -> ExtractedContent {
    locate_html(page.html()).content
}

/// Locate the article content in a full HTML document.
pub fn locate_html(html: &str) -> Located {
    let doc = Html::parse_document(html);

    for selector in CONTENT_SELECTORS {
        let Some(element) = first_match(&doc, selector) else {
            continue;
        };
        let content = extract(element);
        let chars = content.text.chars().count();
        if chars >= MIN_CONTENT_CHARS {
            tracing::info!(selector, chars, "content found");
            return Located {
                content,
                region: Region::Candidate(selector),
            };
        }
        tracing::debug!(selector, chars, "candidate too short");
    }

    tracing::warn!("no article-specific content found, using full page body");
    let body = first_match(&doc, "body").unwrap_or_else(|| doc.root_element());
    Located {
        content: extract(body),
        region: Region::Body,
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(sel) => doc.select(&sel).next(),
        Err(e) => {
            tracing::warn!(selector, error = %e, "skipping invalid selector");
            None
        }
    }
}

fn extract(element: ElementRef<'_>) -> ExtractedContent {
    ExtractedContent {
        html: element.inner_html(),
        text: inner_text(element),
    }
}

/// Rendered text of an element: no script/style text, whitespace collapsed per line,
/// block elements on their own lines, blank lines dropped.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push('\n');
            }
            push_text(child_el, out);
            if block {
                out.push('\n');
            }
        }
    }
}
