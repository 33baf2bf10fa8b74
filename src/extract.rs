use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use url::Url;

use crate::scoring::StructuredSignals;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static META_DESC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static PRE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre").unwrap());
static CODE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("code").unwrap());
static TABLES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static SCHEMA: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"], [itemscope], [itemtype]"#).unwrap()
});
static FORMS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static IMAGES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img, picture").unwrap());

const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "svg", "template", "iframe", "head",
];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "aside", "li", "ul", "ol", "dl", "dt",
    "dd", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th", "table", "pre", "blockquote",
    "br", "figure", "figcaption",
];
const MIN_INLINE_CODE_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

/// Everything pulled out of one HTML document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: String,
    pub links: Vec<Link>,
    pub code_blocks: Vec<String>,
    /// Tables as rows of cell texts.
    pub tables: Vec<Vec<Vec<String>>>,
    pub has_schema_metadata: bool,
    pub has_forms: bool,
    pub has_images: bool,
    pub word_count: usize,
}

impl ExtractedPage {
    pub fn signals(&self) -> StructuredSignals {
        StructuredSignals {
            text_length: self.word_count,
            has_tables: !self.tables.is_empty(),
            has_code_blocks: !self.code_blocks.is_empty(),
            link_count: self.links.len(),
            has_schema_metadata: self.has_schema_metadata,
            has_forms: self.has_forms,
            has_images: self.has_images,
        }
    }
}

/// Parse a full HTML document. Relative links are resolved against `base_url`.
pub fn parse_page(html: &str, base_url: Option<&str>) -> ExtractedPage {
    let doc = Html::parse_document(html);
    let base = base_url.and_then(|u| Url::parse(u).ok());

    let title = first_text(&doc, &TITLE).or_else(|| first_text(&doc, &H1));
    let description = doc
        .select(&META_DESC)
        .filter_map(|m| m.value().attr("content"))
        .map(normalize_inline)
        .find(|d| !d.is_empty());

    let text = match doc.select(&BODY).next() {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    };
    let word_count = text.split_whitespace().count();

    ExtractedPage {
        title,
        description,
        links: extract_links(&doc, base.as_ref()),
        code_blocks: extract_code(&doc),
        tables: extract_tables(&doc),
        has_schema_metadata: doc.select(&SCHEMA).next().is_some(),
        has_forms: doc.select(&FORMS).next().is_some(),
        has_images: doc.select(&IMAGES).next().is_some(),
        word_count,
        text,
    }
}

/// Reduce an HTML fragment (e.g. a feed summary) to plain text.
pub fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    visible_text(doc.root_element())
}

/// Visible text of an element, one line per block, whitespace collapsed.
pub fn visible_text(root: ElementRef) -> String {
    let mut raw = String::new();
    collect_text(root, &mut raw);
    raw.lines()
        .map(normalize_inline)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            // Source line breaks inside a text node are not block boundaries.
            Node::Text(t) => out.push_str(&t.replace(['\n', '\r'], " ")),
            Node::Element(e) => {
                let name = e.name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_el, out);
                if block {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn normalize_inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|el| normalize_inline(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn extract_links(doc: &Html, base: Option<&Url>) -> Vec<Link> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for a in doc.select(&ANCHORS) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        let url = match (Url::parse(href), base) {
            (Ok(u), _) => u.to_string(),
            (Err(_), Some(b)) => match b.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            (Err(_), None) => href.to_string(),
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        links.push(Link {
            url,
            text: normalize_inline(&a.text().collect::<String>()),
        });
    }

    links
}

fn extract_code(doc: &Html) -> Vec<String> {
    let mut blocks: Vec<String> = doc
        .select(&PRE)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    // Inline <code> only counts when it is substantial and not already inside <pre>.
    for el in doc.select(&CODE) {
        let inside_pre = el
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| e.name() == "pre"));
        if inside_pre {
            continue;
        }
        let text = el.text().collect::<String>().trim().to_string();
        if text.contains('\n') || text.chars().count() >= MIN_INLINE_CODE_CHARS {
            blocks.push(text);
        }
    }

    blocks
}

fn extract_tables(doc: &Html) -> Vec<Vec<Vec<String>>> {
    doc.select(&TABLES)
        .map(|table| {
            table
                .select(&ROWS)
                .map(|row| {
                    row.select(&CELLS)
                        .map(|c| normalize_inline(&c.text().collect::<String>()))
                        .collect::<Vec<_>>()
                })
                .filter(|cells| cells.iter().any(|c| !c.is_empty()))
                .collect::<Vec<_>>()
        })
        .filter(|rows| !rows.is_empty())
        .collect()
}

// ── Tests ──
