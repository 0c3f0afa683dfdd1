//! Company facts from a Wikipedia article's HTML.
//!
//! The infobox (`table.infobox`) carries most of what we need: the formal
//! name, former names, website, subsidiaries, products, parent and the usual
//! corporate vitals. External links contribute additional candidate domains.

use std::sync::LazyLock;

use corpscope_shared::CompanyFacts;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// TLDs whose hosts count as company domains when linked from the article.
const DOMAIN_TLDS: &[&str] = &[".com", ".org", ".net", ".io", ".co"];

/// Hosts that are reference infrastructure, never company assets.
const EXCLUDED_HOSTS: &[&str] = &[
    "wikipedia.org",
    "wikimedia.org",
    "wikidata.org",
    "mediawiki.org",
    "wiktionary.org",
    "archive.org",
    "doi.org",
    "worldcat.org",
];

static INFOBOX: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.infobox").expect("valid selector"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".infobox-above, caption.infobox-title, .infobox-title").expect("valid selector")
});
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.infobox-label, th").expect("valid selector"));
static DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.infobox-data, td").expect("valid selector"));
static LIST_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li").expect("valid selector"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:\d+|[a-z]|note \d+|citation needed)\]").expect("valid regex"));
static PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("valid regex"));
static BARE_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:[a-z0-9-]+\.)+[a-z]{2,})\b").expect("valid regex")
});

/// Extract structured facts from article HTML.
///
/// Domains are the infobox website first, then external-link hosts, without
/// duplicates.
pub fn extract_facts(html: &str) -> CompanyFacts {
    let doc = Html::parse_document(html);
    let mut facts = CompanyFacts::default();

    if let Some(infobox) = doc.select(&INFOBOX).next() {
        read_infobox(infobox, &mut facts);
    }

    for domain in external_domains(&doc) {
        push_unique(&mut facts.domains, domain);
    }

    facts
}

fn read_infobox(infobox: ElementRef<'_>, facts: &mut CompanyFacts) {
    if let Some(title) = infobox.select(&TITLE).next() {
        let name = clean_text(&inline_text(title));
        if !name.is_empty() {
            facts.legal_name = Some(name);
        }
    }

    for row in infobox.select(&ROW) {
        let (Some(label), Some(cell)) = (row.select(&LABEL).next(), row.select(&DATA).next())
        else {
            continue;
        };
        let label = clean_text(&inline_text(label)).to_lowercase();

        match label.as_str() {
            "formerly" | "former names" | "also known as" => {
                extend_unique(&mut facts.aliases, split_names(cell_items(cell)));
            }
            "trade name" => {
                facts.colloquial_name = cell_items(cell).into_iter().next();
            }
            "website" => {
                extend_unique(&mut facts.domains, website_domains(cell));
            }
            "subsidiaries" => {
                extend_unique(&mut facts.subsidiaries, split_names(cell_items(cell)));
            }
            "products" | "brands" => {
                extend_unique(&mut facts.brands, split_names(cell_items(cell)));
            }
            "parent" => facts.parent = first_item(cell),
            "founded" => facts.founded = joined_items(cell),
            "headquarters" => facts.headquarters = joined_items(cell),
            "key people" => extend_unique(&mut facts.key_people, cell_items(cell)),
            "revenue" => facts.revenue = first_item(cell),
            "number of employees" => facts.employees = first_item(cell),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Cell reading
// ---------------------------------------------------------------------------

/// Split a data cell into its logical entries: list items when present,
/// otherwise segments separated by `<br>` or block elements.
fn cell_items(cell: ElementRef<'_>) -> Vec<String> {
    let items: Vec<String> = cell
        .select(&LIST_ITEM)
        .map(|li| clean_text(&inline_text(li)))
        .filter(|s| !s.is_empty())
        .collect();
    if !items.is_empty() {
        return items;
    }

    let mut items = Vec::new();
    let mut current = String::new();
    collect_segments(cell, &mut current, &mut items);
    flush_segment(&mut current, &mut items);
    items
}

fn collect_segments(el: ElementRef<'_>, current: &mut String, items: &mut Vec<String>) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            current.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            match child_el.value().name() {
                "br" => flush_segment(current, items),
                "sup" | "style" | "script" => {}
                "div" | "p" => {
                    flush_segment(current, items);
                    collect_segments(child_el, current, items);
                    flush_segment(current, items);
                }
                _ => collect_segments(child_el, current, items),
            }
        }
    }
}

fn flush_segment(current: &mut String, items: &mut Vec<String>) {
    let cleaned = clean_text(current);
    if !cleaned.is_empty() {
        items.push(cleaned);
    }
    current.clear();
}

/// Element text without reference markers or embedded styles.
fn inline_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            match child_el.value().name() {
                "sup" | "style" | "script" => {}
                "br" => out.push(' '),
                _ => out.push_str(&inline_text(child_el)),
            }
        }
    }
    out
}

fn first_item(cell: ElementRef<'_>) -> Option<String> {
    cell_items(cell).into_iter().next()
}

fn joined_items(cell: ElementRef<'_>) -> Option<String> {
    let items = cell_items(cell);
    (!items.is_empty()).then(|| items.join(", "))
}

/// Break comma lists apart, drop parentheticals and "List of ..." pointers.
fn split_names(items: Vec<String>) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split([',', ';']))
        .map(|part| clean_text(&PAREN_RE.replace_all(part, "")))
        .filter(|part| !part.is_empty())
        .filter(|part| {
            let lower = part.to_lowercase();
            !lower.starts_with("list of") && !lower.starts_with("see ")
        })
        .collect()
}

fn website_domains(cell: ElementRef<'_>) -> Vec<String> {
    let mut domains: Vec<String> = cell
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(host_of)
        .collect();

    if domains.is_empty() {
        let text = inline_text(cell);
        domains.extend(
            BARE_DOMAIN_RE
                .captures_iter(&text)
                .map(|caps| normalize_host(&caps[1])),
        );
    }
    domains
}

// ---------------------------------------------------------------------------
// External links
// ---------------------------------------------------------------------------

fn external_domains(doc: &Html) -> Vec<String> {
    let mut domains = Vec::new();
    for href in doc.select(&LINK).filter_map(|a| a.value().attr("href")) {
        let Some(host) = host_of(href) else {
            continue;
        };
        if !DOMAIN_TLDS.iter().any(|tld| host.ends_with(tld)) {
            continue;
        }
        if EXCLUDED_HOSTS
            .iter()
            .any(|excluded| host == *excluded || host.ends_with(&format!(".{excluded}")))
        {
            continue;
        }
        push_unique(&mut domains, host);
    }
    domains
}

/// Host of an absolute or protocol-relative link, normalized.
fn host_of(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        return None;
    };
    let url = Url::parse(&absolute).ok()?;
    url.host_str().map(normalize_host)
}

/// Lowercase, without a leading `www.` or trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Remove reference markers and collapse whitespace.
pub(crate) fn clean_text(raw: &str) -> String {
    let without_refs = REFERENCE_RE.replace_all(raw, "");
    without_refs
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == ';' || c == ':')
        .trim()
        .to_string()
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn extend_unique(list: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        push_unique(list, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
<html><body>
<table class="infobox vcard">
  <caption class="infobox-title">Alphabet Inc.</caption>
  <tr><th class="infobox-label">Formerly</th><td class="infobox-data">Google Inc. (2015)</td></tr>
  <tr><th class="infobox-label">Founded</th><td class="infobox-data">October 2, 2015<sup>[1]</sup></td></tr>
  <tr><th class="infobox-label">Headquarters</th><td class="infobox-data">Mountain View,<br>California</td></tr>
  <tr><th class="infobox-label">Key&nbsp;people</th><td class="infobox-data">
      <div class="plainlist"><ul><li>Larry Page (co-founder)</li><li>Sundar Pichai (CEO)</li></ul></div></td></tr>
  <tr><th class="infobox-label">Revenue</th><td class="infobox-data">US$307.4 billion<sup>[2]</sup><br>(2023)</td></tr>
  <tr><th class="infobox-label">Number of employees</th><td class="infobox-data">182,502 (2023)</td></tr>
  <tr><th class="infobox-label">Parent</th><td class="infobox-data"><a href="./XXVI_Holdings">XXVI Holdings</a></td></tr>
  <tr><th class="infobox-label">Subsidiaries</th><td class="infobox-data">
      <div class="plainlist"><ul><li><a href="./Google">Google</a></li><li>Waymo</li><li><a href="./List_of_subsidiaries">List of subsidiaries</a></li></ul></div></td></tr>
  <tr><th class="infobox-label">Website</th><td class="infobox-data"><a rel="mw:ExtLink" href="https://www.abc.xyz/">abc.xyz</a></td></tr>
</table>
<p>Alphabet Inc. is an American multinational technology conglomerate.</p>
<p><a rel="mw:ExtLink" href="https://www.google.com/about">Google</a>
   <a rel="mw:ExtLink" href="https://en.wikipedia.org/wiki/Alphabet">self</a>
   <a rel="mw:ExtLink" href="//web.archive.org/web/2015/abc.xyz">archived</a>
   <a rel="mw:ExtLink" href="https://www.nytimes.com/2015/08/10/google.html">news</a></p>
</body></html>
"#;

    #[test]
    fn reads_infobox_rows() {
        let facts = extract_facts(ARTICLE);
        assert_eq!(facts.legal_name.as_deref(), Some("Alphabet Inc."));
        assert_eq!(facts.aliases, vec!["Google Inc."]);
        assert_eq!(facts.founded.as_deref(), Some("October 2, 2015"));
        assert_eq!(facts.headquarters.as_deref(), Some("Mountain View, California"));
        assert_eq!(
            facts.key_people,
            vec!["Larry Page (co-founder)", "Sundar Pichai (CEO)"]
        );
        assert_eq!(facts.revenue.as_deref(), Some("US$307.4 billion"));
        assert_eq!(facts.employees.as_deref(), Some("182,502 (2023)"));
        assert_eq!(facts.parent.as_deref(), Some("XXVI Holdings"));
        assert_eq!(facts.subsidiaries, vec!["Google", "Waymo"]);
    }

    #[test]
    fn website_first_then_external_links() {
        let facts = extract_facts(ARTICLE);
        assert_eq!(facts.domains, vec!["abc.xyz", "google.com", "nytimes.com"]);
    }

    #[test]
    fn article_without_infobox_yields_links_only() {
        let html = r#"<p><a href="https://example.io/">x</a><a href="/wiki/Other">y</a></p>"#;
        let facts = extract_facts(html);
        assert!(facts.legal_name.is_none());
        assert_eq!(facts.domains, vec!["example.io"]);
    }

    #[test]
    fn normalize_host_strips_www_and_case() {
        assert_eq!(normalize_host("WWW.Google.COM."), "google.com");
        assert_eq!(normalize_host("mail.google.com"), "mail.google.com");
    }

    #[test]
    fn clean_text_removes_references() {
        assert_eq!(clean_text("  Mountain   View[3][a] , "), "Mountain View");
    }
}
