use std::sync::LazyLock;

use regex::Regex;

const MIN_RATING: f64 = 0.0;
const MAX_RATING: f64 = 10.0;

// Priority order: earlier patterns win even if a later one would also match.
static RATING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\d+(?:\.\d+)?)\s*(?:stars?|/\s*10\b|out of 10\b)",
        r"(?i)(\d+(?:\.\d+)?)\s*(?:/\s*5\b|out of 5\b)",
        r"(?i)rating[:\s]*(\d+(?:\.\d+)?)",
        r"(?i)rated[:\s]*(\d+(?:\.\d+)?)",
        r"(?i)score[:\s]*(\d+(?:\.\d+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// First pattern whose first match parses to a value in [0, 10].
pub fn extract_rating(text: &str) -> Option<f64> {
    RATING_PATTERNS.iter().find_map(|re| {
        let value: f64 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
        (MIN_RATING..=MAX_RATING).contains(&value).then_some(value)
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_win_over_out_of_five() {
        assert_eq!(extract_rating("This product gets 4.5 stars out of 5"), Some(4.5));
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(extract_rating("no mention of rating"), None);
        assert_eq!(extract_rating(""), None);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(extract_rating("rating: 15"), None);
        assert_eq!(extract_rating("42 stars on GitHub"), None);
    }

    #[test]
    fn other_forms() {
        assert_eq!(extract_rating("Overall 8/10, would buy again"), Some(8.0));
        assert_eq!(extract_rating("I'd give it 7 out of 10"), Some(7.0));
        assert_eq!(extract_rating("4.2/5 from 1,300 reviews"), Some(4.2));
        assert_eq!(extract_rating("Rating: 3.8"), Some(3.8));
        assert_eq!(extract_rating("Rated 4 by our team"), Some(4.0));
        assert_eq!(extract_rating("Ease of use score: 9.1"), Some(9.1));
        assert_eq!(extract_rating("1 star. Avoid."), Some(1.0));
    }

    #[test]
    fn earlier_pattern_takes_priority() {
        // `rating:` appears first in the text, but the stars pattern ranks higher.
        assert_eq!(extract_rating("Rating: 9 -- my friend said 3 stars"), Some(3.0));
    }

    #[test]
    fn falls_through_when_higher_pattern_is_out_of_range() {
        assert_eq!(extract_rating("12 stars? No. Rating: 6.5"), Some(6.5));
    }

    #[test]
    fn api_rate_limits_are_not_ratings() {
        assert_eq!(extract_rating("Rate limit: 1000/hour."), None);
    }
}
