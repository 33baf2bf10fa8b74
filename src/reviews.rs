use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::extract::visible_text;
use crate::scoring::{extract_rating, extract_sentiment, Sentiment};

static REVIEW_BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[itemprop="review"], [data-testid*="review"], .review, .review-card, .paper--review, [class*="review-content"]"#,
    )
    .unwrap()
});
static RATING_VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="ratingValue"], [data-rating]"#).unwrap());
static FALLBACK_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li, blockquote").unwrap());

const MIN_SNIPPET_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSnippet {
    pub text: String,
    pub rating: Option<f64>,
    pub sentiment: Sentiment,
}

/// Review snippets from a third-party review page.
///
/// Looks for review containers first; pages without recognizable markup fall
/// back to paragraphs that carry a rating or talk about a review.
pub fn extract_reviews(html: &str) -> Vec<ReviewSnippet> {
    let doc = Html::parse_document(html);

    let containers: Vec<ElementRef> = doc
        .select(&REVIEW_BLOCKS)
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| REVIEW_BLOCKS.matches(&a))
        })
        .collect();

    let mut seen = HashSet::new();
    let mut snippets = Vec::new();

    if containers.is_empty() {
        for el in doc.select(&FALLBACK_BLOCKS) {
            let text = visible_text(el).replace('\n', " ");
            let mentions_review = text.to_lowercase().contains("review");
            let rating = extract_rating(&text);
            if text.chars().count() < MIN_SNIPPET_CHARS || (rating.is_none() && !mentions_review) {
                continue;
            }
            if seen.insert(text.clone()) {
                snippets.push(snippet(text, rating));
            }
        }
        return snippets;
    }

    for el in containers {
        let text = visible_text(el).replace('\n', " ");
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }
        let rating = structured_rating(el).or_else(|| extract_rating(&text));
        snippets.push(snippet(text, rating));
    }
    snippets
}

fn snippet(text: String, rating: Option<f64>) -> ReviewSnippet {
    ReviewSnippet {
        sentiment: extract_sentiment(&text),
        rating,
        text,
    }
}

/// Rating from microdata or `data-rating`, if present and within [0, 10].
fn structured_rating(el: ElementRef) -> Option<f64> {
    el.select(&RATING_VALUE).find_map(|r| {
        let v = r.value();
        let raw = v
            .attr("content")
            .or_else(|| v.attr("data-rating"))
            .map(str::to_string)
            .unwrap_or_else(|| r.text().collect::<String>());
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|x| (0.0..=10.0).contains(x))
    })
}

pub fn combined_text(snippets: &[ReviewSnippet]) -> String {
    snippets
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn mean_rating(snippets: &[ReviewSnippet]) -> Option<f64> {
    let ratings: Vec<f64> = snippets.iter().filter_map(|s| s.rating).collect();
    if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn review_page() -> Vec<ReviewSnippet> {
        let html = std::fs::read_to_string("tests/fixtures/review_page.html").unwrap();
        extract_reviews(&html)
    }

    #[test]
    fn containers_are_found_once() {
        let reviews = review_page();
        assert_eq!(reviews.len(), 3);
        assert!(reviews[0].text.contains("API is excellent"));
    }

    #[test]
    fn ratings_from_markup_then_text() {
        let reviews = review_page();
        assert_eq!(reviews[0].rating, Some(4.5));
        assert_eq!(reviews[1].rating, Some(2.0));
        assert_eq!(reviews[2].rating, None);
        assert_eq!(mean_rating(&reviews), Some(3.25));
    }

    #[test]
    fn sentiment_per_snippet() {
        let reviews = review_page();
        assert_eq!(reviews[0].sentiment, Sentiment::Positive);
        assert_eq!(reviews[1].sentiment, Sentiment::Negative);
    }

    #[test]
    fn paragraphs_when_no_review_markup() {
        let html = r#"<html><body>
            <p>Short.</p>
            <p>We moved our whole CRM here and would rate it 9/10 for flexibility.</p>
            <p>This paragraph is long enough but says nothing about the product quality.</p>
            <p>In my review the automation builder was confusing and slow to load.</p>
        </body></html>"#;
        let reviews = extract_reviews(html);
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].rating, Some(9.0));
        assert_eq!(reviews[1].sentiment, Sentiment::Negative);
    }

    #[test]
    fn nothing_on_blank_page() {
        assert!(extract_reviews("").is_empty());
        assert_eq!(mean_rating(&[]), None);
        assert_eq!(combined_text(&[]), "");
    }
}
