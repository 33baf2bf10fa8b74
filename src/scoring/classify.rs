use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Documentation,
    ApiReference,
    Blog,
    Changelog,
    Pricing,
    Review,
    Marketing,
}

impl ContentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Documentation => "documentation",
            ContentCategory::ApiReference => "api_reference",
            ContentCategory::Blog => "blog",
            ContentCategory::Changelog => "changelog",
            ContentCategory::Pricing => "pricing",
            ContentCategory::Review => "review",
            ContentCategory::Marketing => "marketing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "documentation" => Some(ContentCategory::Documentation),
            "api_reference" => Some(ContentCategory::ApiReference),
            "blog" => Some(ContentCategory::Blog),
            "changelog" => Some(ContentCategory::Changelog),
            "pricing" => Some(ContentCategory::Pricing),
            "review" => Some(ContentCategory::Review),
            "marketing" => Some(ContentCategory::Marketing),
            _ => None,
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first hit decides.
const URL_CUES: &[(&str, ContentCategory)] = &[
    ("g2.com", ContentCategory::Review),
    ("capterra.", ContentCategory::Review),
    ("trustradius.com", ContentCategory::Review),
    ("/reviews", ContentCategory::Review),
    ("/changelog", ContentCategory::Changelog),
    ("/release-notes", ContentCategory::Changelog),
    ("/whats-new", ContentCategory::Changelog),
    ("/pricing", ContentCategory::Pricing),
    ("/plans", ContentCategory::Pricing),
    ("/api", ContentCategory::ApiReference),
    ("/reference", ContentCategory::ApiReference),
    ("/developers", ContentCategory::ApiReference),
    ("/docs", ContentCategory::Documentation),
    ("/help", ContentCategory::Documentation),
    ("/support", ContentCategory::Documentation),
    ("/guide", ContentCategory::Documentation),
    ("/blog", ContentCategory::Blog),
    ("/news", ContentCategory::Blog),
    ("/feed", ContentCategory::Blog),
    ("/rss", ContentCategory::Blog),
];

const TEXT_SAMPLE_CHARS: usize = 4000;

/// Coarse page type from URL path cues, then text cues.
pub fn classify_content(url: &str, text: &str) -> ContentCategory {
    let url = url.to_lowercase();
    if let Some((_, category)) = URL_CUES.iter().find(|(cue, _)| url.contains(cue)) {
        return *category;
    }

    let sample: String = text.chars().take(TEXT_SAMPLE_CHARS).collect::<String>().to_lowercase();
    let has = |needle: &str| sample.contains(needle);

    if has("release notes") || has("changelog") {
        ContentCategory::Changelog
    } else if (has("per month") || has("/mo")) && has("plan") {
        ContentCategory::Pricing
    } else if has("curl ") || (has("endpoint") && has("request")) {
        ContentCategory::ApiReference
    } else if has("stars") && has("review") {
        ContentCategory::Review
    } else if has("getting started") || has("step 1") {
        ContentCategory::Documentation
    } else {
        ContentCategory::Marketing
    }
}

// ── Tests ──
