//! Plain-text rendering of an article and the facts read from prose.

use std::sync::LazyLock;

use regex::Regex;

use crate::infobox::clean_text;

/// Cap on acquisitions taken from one article.
const MAX_ACQUISITIONS: usize = 50;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|\*|_)([^*_]+)(\*\*|__|\*|_)").expect("valid regex"));
static KNOWN_AS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:commonly|also|colloquially|simply|better) known as\s+["“]?([A-Z][\w&'.\-]*(?:\s+[A-Z][\w&'.\-]*)*)"#,
    )
    .expect("valid regex")
});
static ACQUIRED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bacquired\s+(?:the\s+)?([A-Z][\w&'\-]*(?:\s+[A-Z][\w&'\-]*)*)")
        .expect("valid regex")
});

/// Words that start a capitalized run without naming a company.
const NOT_A_NAME: &[&str] = &["In", "On", "The", "It", "Its", "A", "An", "By", "For"];

/// Render article HTML as readable plain text.
///
/// Tables, references and media are skipped; Markdown link and emphasis
/// syntax is unwrapped so regexes see the prose only.
pub fn html_to_text(html: &str) -> String {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "table", "sup", "figure", "img", "nav", "noscript",
        ])
        .build();

    let markdown = match converter.convert(html) {
        Ok(md) => md,
        Err(e) => {
            tracing::debug!(error = %e, "htmd conversion failed, using empty text");
            return String::new();
        }
    };

    let unlinked = LINK_RE.replace_all(&markdown, "$1");
    let plain = EMPHASIS_RE.replace_all(&unlinked, "$2");

    plain
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name introduced by "commonly known as", "also known as" and similar.
pub fn colloquial_name(lead: &str) -> Option<String> {
    let caps = KNOWN_AS_RE.captures(lead)?;
    let name = caps[1].trim_end_matches(['.', ',']).to_string();
    (!name.is_empty()).then_some(name)
}

/// Companies named as the object of "acquired", in order of appearance.
pub fn acquisitions(text: &str, own_names: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for caps in ACQUIRED_RE.captures_iter(text) {
        let name = clean_text(caps[1].trim_end_matches(['.', ',']));
        let first_word = name.split_whitespace().next().unwrap_or_default();
        if name.is_empty() || NOT_A_NAME.contains(&first_word) {
            continue;
        }
        if own_names.iter().any(|own| own.eq_ignore_ascii_case(&name)) {
            continue;
        }
        if !found.contains(&name) {
            found.push(name);
        }
        if found.len() == MAX_ACQUISITIONS {
            break;
        }
    }
    found
}
