//! Plausible reading range per meter type

use serde::{Deserialize, Serialize};

/// Inclusive bounds for a believable meter reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingRange {
    pub min: u64,
    pub max: u64,
}

impl Default for ReadingRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: 99_999_999,
        }
    }
}

impl ReadingRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Parse `text` and check it against the bounds
    pub fn contains_text(&self, text: &str) -> bool {
        parse_reading(text).is_some_and(|v| self.contains(v))
    }
}

/// Parse a meter reading: ASCII digits only, surrounding whitespace ignored
pub fn parse_reading(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
