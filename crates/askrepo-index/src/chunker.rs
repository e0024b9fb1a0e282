//! Line-window chunking with bounded overlap.

use serde::{Deserialize, Serialize};

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Character budget per window, counting one separator per line (default: 1500).
    pub max_chars: usize,
    /// Character budget for lines repeated at the start of the next window (default: 200).
    pub overlap_chars: usize,
    /// Upper bound on repeated lines regardless of `overlap_chars` (default: 3).
    pub max_overlap_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            overlap_chars: 200,
            max_overlap_lines: 3,
        }
    }
}

/// A contiguous run of lines. Line numbers are 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Sanitize raw file bytes, then chunk them.
    #[must_use]
    pub fn chunk_bytes(&self, bytes: &[u8]) -> Vec<Chunk> {
        self.chunk(&sanitize(bytes))
    }

    /// Split `text` into windows of whole lines.
    ///
    /// A window grows while its size stays within `max_chars`; a single line longer
    /// than the budget becomes a window on its own. Each window after the first
    /// repeats up to `max_overlap_lines` trailing lines of its predecessor, but
    /// always starts strictly after the predecessor's start.
    ///
    /// Windows made only of whitespace are not emitted, so blank text yields no
    /// chunks at all.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = text.lines().collect();
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count() + 1).collect();
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < lines.len() {
            let mut end = start;
            let mut size = widths[start];
            while end + 1 < lines.len() && size + widths[end + 1] <= self.config.max_chars {
                end += 1;
                size += widths[end];
            }

            if lines[start..=end].iter().any(|l| !l.trim().is_empty()) {
                chunks.push(Chunk {
                    text: lines[start..=end].join("\n"),
                    start_line: start,
                    end_line: end,
                });
            }

            if end + 1 >= lines.len() {
                break;
            }
            let overlap = self.overlap_lines(&widths[start..=end]);
            start = end + 1 - overlap;
        }

        chunks
    }

    /// Trailing lines of `window` to repeat, always fewer than the window holds.
    fn overlap_lines(&self, window: &[usize]) -> usize {
        let cap = self
            .config
            .max_overlap_lines
            .min(window.len().saturating_sub(1));
        let mut taken = 0;
        let mut budget = 0;
        for width in window.iter().rev().take(cap) {
            if budget + width > self.config.overlap_chars {
                break;
            }
            budget += width;
            taken += 1;
        }
        taken
    }
}

const MOJIBAKE: &[(&str, &str)] = &[
    ("\u{e2}\u{20ac}\u{2122}", "'"),
    ("\u{e2}\u{20ac}\u{2dc}", "'"),
    ("\u{e2}\u{20ac}\u{153}", "\""),
    ("\u{e2}\u{20ac}\u{9d}", "\""),
    ("\u{e2}\u{20ac}\u{201c}", "-"),
    ("\u{e2}\u{20ac}\u{201d}", "-"),
    ("\u{e2}\u{20ac}\u{a6}", "..."),
    ("\u{c2}\u{a0}", " "),
];

const PLACEHOLDER: char = '?';

/// Decode file bytes into chunkable text.
///
/// Valid UTF-8 has double-encoded quotes, dashes and ellipses repaired and a
/// leading BOM removed. Anything else keeps its ASCII bytes and maps every
/// other byte to `?`.
#[must_use]
pub fn sanitize(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => repair_mojibake(text.strip_prefix('\u{feff}').unwrap_or(text)),
        Err(_) => bytes
            .iter()
            .map(|&b| if b.is_ascii() { char::from(b) } else { PLACEHOLDER })
            .collect(),
    }
}

fn repair_mojibake(text: &str) -> String {
    if !text.contains(['\u{e2}', '\u{c2}']) {
        return text.to_owned();
    }
    MOJIBAKE
        .iter()
        .fold(text.to_owned(), |acc, (bad, good)| acc.replace(bad, good))
}
