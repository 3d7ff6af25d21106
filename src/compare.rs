//! Before/after text comparison
//!
//! Counts are in Unicode scalar values, not bytes.

use serde::{Deserialize, Serialize};

/// Character-level comparison of two texts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextComparison {
    pub before_chars: usize,
    pub after_chars: usize,
    /// after - before
    pub char_delta: i64,
    /// Signed percentage change; `None` when `before` is empty
    pub percent_change: Option<f64>,
}

impl TextComparison {
    pub fn between(before: &str, after: &str) -> Self {
        let before_chars = before.chars().count();
        let after_chars = after.chars().count();
        let char_delta = after_chars as i64 - before_chars as i64;
        let percent_change =
            (before_chars > 0).then(|| char_delta as f64 / before_chars as f64 * 100.0);
        Self {
            before_chars,
            after_chars,
            char_delta,
            percent_change,
        }
    }

    /// `+12 (+4.3%)` style summary
    pub fn summary(&self) -> String {
        match self.percent_change {
            Some(p) => format!("{:+} ({:+.1}%)", self.char_delta, p),
            None => format!("{:+} (n/a)", self.char_delta),
        }
    }
}

/// Shape of a block of text
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextStatistics {
    pub chars: usize,
    /// Non-blank lines
    pub lines: usize,
    pub words: usize,
    pub avg_words_per_line: f64,
}

impl TextStatistics {
    pub fn from_text(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let words = text.split_whitespace().count();
        let avg_words_per_line = if lines.is_empty() {
            0.0
        } else {
            words as f64 / lines.len() as f64
        };
        Self {
            chars: text.chars().count(),
            lines: lines.len(),
            words,
            avg_words_per_line,
        }
    }
}
