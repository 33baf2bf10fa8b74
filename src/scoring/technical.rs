use serde::{Deserialize, Serialize};

pub const MAX_TECHNICAL_SCORE: f64 = 10.0;

/// Structural features of an extracted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredSignals {
    /// Length of the visible text, in words.
    pub text_length: usize,
    pub has_tables: bool,
    pub has_code_blocks: bool,
    pub link_count: usize,
    pub has_schema_metadata: bool,
    pub has_forms: bool,
    pub has_images: bool,
}

/// Weighted additive score in [0, 10]. Breakpoints must stay stable so scores
/// already in the store remain comparable.
pub fn score_technical_content(s: &StructuredSignals) -> f64 {
    let length: f64 = match s.text_length {
        n if n > 1000 => 4.0,
        n if n > 500 => 3.0,
        n if n > 100 => 2.0,
        _ => 1.0,
    };

    let links = match s.link_count {
        n if n > 10 => 1.0,
        n if n > 5 => 0.5,
        _ => 0.0,
    };

    let mut score = length + links;
    if s.has_tables {
        score += 1.5;
    }
    if s.has_code_blocks {
        score += 1.5;
    }
    if s.has_schema_metadata {
        score += 1.0;
    }
    if s.has_forms {
        score += 0.5;
    }
    if s.has_images {
        score += 0.5;
    }

    score.min(MAX_TECHNICAL_SCORE)
}

// ── Tests ──
