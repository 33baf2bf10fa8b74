use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::extract::html_to_text;

/// One entry of an RSS 2.0 or Atom feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// Plain text; any HTML in the feed is reduced to text.
    pub summary: String,
    pub published: Option<String>,
}

impl FeedItem {
    /// Title and summary as one scoring input.
    pub fn text(&self) -> String {
        match (self.title.is_empty(), self.summary.is_empty()) {
            (false, false) => format!("{}\n{}", self.title, self.summary),
            (false, true) => self.title.clone(),
            _ => self.summary.clone(),
        }
    }

    /// RSS uses RFC 2822 dates, Atom uses RFC 3339.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.published.as_deref()?.trim();
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Summary,
    Published,
    Guid,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Summary),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
        b"guid" | b"id" => Some(Field::Guid),
        _ => None,
    }
}

#[derive(Default)]
struct Draft {
    item: FeedItem,
    guid: String,
    published: String,
}

impl Draft {
    /// First occurrence of each field wins (e.g. `description` over `content:encoded`).
    fn is_filled(&self, field: Field) -> bool {
        match field {
            Field::Title => !self.item.title.is_empty(),
            Field::Link => !self.item.link.is_empty(),
            Field::Summary => !self.item.summary.is_empty(),
            Field::Published => !self.published.is_empty(),
            Field::Guid => !self.guid.is_empty(),
        }
    }

    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.item.title,
            Field::Link => &mut self.item.link,
            Field::Summary => &mut self.item.summary,
            Field::Published => &mut self.published,
            Field::Guid => &mut self.guid,
        };
        target.push_str(text);
    }

    fn finish(self) -> Option<FeedItem> {
        let Draft {
            mut item,
            guid,
            published,
        } = self;
        item.title = item.title.split_whitespace().collect::<Vec<_>>().join(" ");
        item.summary = html_to_text(&item.summary);
        item.link = item.link.trim().to_string();
        if item.link.is_empty() && guid.trim().starts_with("http") {
            item.link = guid.trim().to_string();
        }
        let published = published.trim();
        item.published = (!published.is_empty()).then(|| published.to_string());

        if item.title.is_empty() && item.summary.is_empty() {
            None
        } else {
            Some(item)
        }
    }
}

/// Atom `<link>`: the `href` of an alternate (or rel-less) link.
fn atom_href(e: &BytesStart) -> Result<Option<String>> {
    if let Some(rel) = e.try_get_attribute("rel")? {
        if rel.unescape_value()? != "alternate" {
            return Ok(None);
        }
    }
    match e.try_get_attribute("href")? {
        Some(href) => Ok(Some(href.unescape_value()?.to_string())),
        None => Ok(None),
    }
}

/// Parse RSS `<item>`s or Atom `<entry>`s.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut items = Vec::new();
    let mut draft: Option<Draft> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    draft = Some(Draft::default());
                    field = None;
                }
                name => {
                    if let Some(d) = draft.as_mut() {
                        if let Some(f) = field_for(name) {
                            field = (!d.is_filled(f)).then_some(f);
                            if f == Field::Link && field.is_some() {
                                if let Some(href) = atom_href(&e)? {
                                    d.push(Field::Link, &href);
                                }
                            }
                        }
                    }
                }
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"link" => {
                if let Some(d) = draft.as_mut() {
                    if !d.is_filled(Field::Link) {
                        if let Some(href) = atom_href(&e)? {
                            d.push(Field::Link, &href);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(d), Some(f)) = (draft.as_mut(), field) {
                    d.push(f, &e.unescape()?);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(d), Some(f)) = (draft.as_mut(), field) {
                    d.push(f, &String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(item) = draft.take().and_then(Draft::finish) {
                        items.push(item);
                    }
                    field = None;
                }
                name if field_for(name).is_some() => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

// ── Tests ──
