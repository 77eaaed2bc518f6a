//! Restricted-markdown to minimal XHTML. A line-oriented textual rewrite, not a parser.
//!
//! Transforms run in a fixed order: headings, bold, italic, links, then paragraph
//! segmentation. Anything the dialect does not cover stays literal. The input is untrusted:
//! `&`, `<` and `>` are escaped first, and a span whose contents would interleave with tags
//! inserted by an earlier transform is left as literal text, so the output is always well formed.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Brackets a shielded link target while emphasis runs. Private-use code points.
const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

static LINK_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\(([^)\n]+)\)").expect("LINK_TARGET_RE should compile"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,3}) (.*)$").expect("HEADING_RE should compile"));
static BOLD_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("BOLD_STAR_RE should compile"));
static BOLD_UNDERSCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").expect("BOLD_UNDERSCORE_RE should compile"));
static ITALIC_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.+?)\*").expect("ITALIC_STAR_RE should compile"));
static ITALIC_UNDERSCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(.+?)_").expect("ITALIC_UNDERSCORE_RE should compile"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]\n]+)\]\(\x{E000}(\d+)\x{E001}\)").expect("LINK_RE should compile")
});
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{E000}(\d+)\x{E001}").expect("TOKEN_RE should compile"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)(strong|em|a)(?:\s[^>]*)?>").expect("TAG_RE should compile")
});
static HEADING_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<h[1-3]>.*</h[1-3]>$").expect("HEADING_LINE_RE should compile"));

/// Convert restricted markdown to XHTML. Pure and infallible.
pub fn normalize(markdown: &str) -> String {
    let text = escape_text(
        &markdown
            .replace("\r\n", "\n")
            .replace([TOKEN_OPEN, TOKEN_CLOSE], ""),
    );

    let mut targets = Vec::new();
    let text = shield_link_targets(&text, &mut targets);

    let text = HEADING_RE
        .replace_all(&text, |caps: &Captures| {
            let level = caps[1].len();
            format!("<h{level}>{}</h{level}>", &caps[2])
        })
        .into_owned();

    let text = wrap_spans(&text, &BOLD_STAR_RE, "strong");
    let text = wrap_spans(&text, &BOLD_UNDERSCORE_RE, "strong");
    let text = wrap_spans(&text, &ITALIC_STAR_RE, "em");
    let text = wrap_spans(&text, &ITALIC_UNDERSCORE_RE, "em");

    let text = link_spans(&text, &targets);
    let text = restore_targets(&text, &targets);

    paragraphs(&text)
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Swap each `](target)` for a numbered token so emphasis cannot reach into URLs.
fn shield_link_targets(text: &str, targets: &mut Vec<String>) -> String {
    LINK_TARGET_RE
        .replace_all(text, |caps: &Captures| {
            targets.push(caps[1].to_string());
            format!("]({}{}{})", TOKEN_OPEN, targets.len() - 1, TOKEN_CLOSE)
        })
        .into_owned()
}

fn target<'a>(targets: &'a [String], index: &str) -> Option<&'a str> {
    index
        .parse::<usize>()
        .ok()
        .and_then(|i| targets.get(i))
        .map(String::as_str)
}

fn wrap_spans(text: &str, re: &Regex, tag: &str) -> String {
    re.replace_all(text, |caps: &Captures| {
        let inner = &caps[1];
        if tags_balanced(inner) {
            format!("<{tag}>{inner}</{tag}>")
        } else {
            caps[0].to_string()
        }
    })
    .into_owned()
}

fn link_spans(text: &str, targets: &[String]) -> String {
    LINK_RE
        .replace_all(text, |caps: &Captures| {
            let label = &caps[1];
            match target(targets, &caps[2]) {
                Some(href) if tags_balanced(label) => {
                    format!("<a href=\"{}\">{}</a>", href.replace('"', "&quot;"), label)
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Put back targets that did not become links.
fn restore_targets(text: &str, targets: &[String]) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &Captures| {
            target(targets, &caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// True when every inline tag opened in `s` is closed in `s`, in order.
fn tags_balanced(s: &str) -> bool {
    let mut open: Vec<&str> = Vec::new();
    for caps in TAG_RE.captures_iter(s) {
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            if open.pop() != Some(name) {
                return false;
            }
        } else {
            open.push(name);
        }
    }
    open.is_empty()
}

/// Blank-line separated blocks become paragraphs; single newlines become `<br/>`.
/// Heading lines stand on their own instead of nesting inside `<p>`.
fn paragraphs(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.split('\n').chain(std::iter::once("")) {
        if line.trim().is_empty() {
            flush_paragraph(&mut lines, &mut out);
        } else if HEADING_LINE_RE.is_match(line) {
            flush_paragraph(&mut lines, &mut out);
            out.push(line.to_string());
        } else {
            lines.push(line);
        }
    }
    out.join("\n")
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if !lines.is_empty() {
        out.push(format!("<p>{}</p>", lines.join("<br/>")));
        lines.clear();
    }
}
