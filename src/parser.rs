//! Reply parsing
//!
//! Assistant replies end with a numbered list of follow-up choices, either as
//! `[1] Send it` or `1. Send it`, one per line. [`parse_reply`] lifts those
//! lines into [`DynamicOptions`] and returns the remaining prose as the body.

use crate::keypad::Digit;

/// Words that mark option `0` as "go back to the menu"
const BACK_SYNONYMS: &[&str] = &["back", "menu", "done", "exit", "cancel"];

/// A numbered follow-up choice taken from a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicOption {
    pub key: Digit,
    pub text: String,
}

/// Options of the latest reply, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicOptions {
    options: Vec<DynamicOption>,
}

impl DynamicOptions {
    /// Insert or overwrite; an overwritten key keeps its original position
    fn upsert(&mut self, key: Digit, text: String) {
        if let Some(existing) = self.options.iter_mut().find(|o| o.key == key) {
            existing.text = text;
        } else {
            self.options.push(DynamicOption { key, text });
        }
    }

    #[must_use]
    pub fn get(&self, key: Digit) -> Option<&DynamicOption> {
        self.options.iter().find(|o| o.key == key)
    }

    #[must_use]
    pub fn contains(&self, key: Digit) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicOption> {
        self.options.iter()
    }

    pub fn clear(&mut self) {
        self.options.clear();
    }

    /// Option `0`, if present and worded as a way back
    #[must_use]
    pub fn back_option(&self) -> Option<&DynamicOption> {
        Digit::new(0)
            .and_then(|zero| self.get(zero))
            .filter(|o| is_back_text(&o.text))
    }

    /// One `[k] text` line per option
    #[must_use]
    pub fn render(&self) -> String {
        self.options
            .iter()
            .map(|o| format!("[{}] {}", o.key, o.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A reply split into prose and options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub body: String,
    pub options: DynamicOptions,
}

/// Split a raw reply into body text and numbered options
///
/// Duplicate keys keep the last text. With no option lines the body is the
/// input trimmed; otherwise every option line is dropped from the body.
#[must_use]
pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut options = DynamicOptions::default();
    let mut body_lines = Vec::new();

    for line in raw.split('\n') {
        match classify_line(line) {
            Some((key, text)) => options.upsert(key, text.to_string()),
            None => body_lines.push(line),
        }
    }

    let body = if options.is_empty() {
        raw.trim().to_string()
    } else {
        body_lines.join("\n").trim().to_string()
    };

    ParsedReply { body, options }
}

/// Match `[d] text` or `d. text` at the start of a line
///
/// The text stops at the next `[` and must be non-empty after trimming.
fn classify_line(line: &str) -> Option<(Digit, &str)> {
    let line = line.trim_start();
    let mut chars = line.char_indices();

    let (key, rest) = match chars.next()? {
        (_, '[') => {
            let (_, d) = chars.next()?;
            let (close, c) = chars.next()?;
            if c != ']' {
                return None;
            }
            (Digit::from_char(d)?, &line[close + 1..])
        }
        (_, d) => {
            let key = Digit::from_char(d)?;
            let (dot, c) = chars.next()?;
            if c != '.' {
                return None;
            }
            (key, &line[dot + 1..])
        }
    };

    let text = rest.split('[').next().unwrap_or_default().trim();
    if text.is_empty() {
        return None;
    }

    Some((key, text))
}

/// Case-insensitive match against the back-navigation words
#[must_use]
pub fn is_back_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    BACK_SYNONYMS.iter().any(|word| lower.contains(word))
}
