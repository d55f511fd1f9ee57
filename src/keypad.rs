//! Keypad symbols
//!
//! The client is driven by a twelve-key pad plus a dedicated back button.
//! Raw input (terminal characters, words) is decoded into [`Key`] before it
//! reaches the session.

use std::fmt;

/// A single decimal digit, `0` through `9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digit(u8);

impl Digit {
    /// Build a digit from its numeric value
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= 9 { Some(Self(value)) } else { None }
    }

    /// Parse an ASCII digit character
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        c.to_digit(10).and_then(|d| u8::try_from(d).ok()).map(Self)
    }

    /// Parse a string holding exactly one ASCII digit
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => None,
        }
    }

    /// Numeric value
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The digit as a character
    #[must_use]
    pub const fn as_char(self) -> char {
        (b'0' + self.0) as char
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded keypad event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Number key
    Digit(Digit),
    /// `*` key, toggles speech output
    Star,
    /// `#` key, replays the last reply
    Pound,
    /// Dedicated back button
    Back,
}

impl Key {
    /// Shorthand for a digit key; `None` if `value > 9`
    #[must_use]
    pub const fn digit(value: u8) -> Option<Self> {
        match Digit::new(value) {
            Some(d) => Some(Self::Digit(d)),
            None => None,
        }
    }

    /// Decode a single input character
    ///
    /// `b` and `q` stand in for the hardware back button on a keyboard.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Self::Star),
            '#' => Some(Self::Pound),
            'b' | 'B' | 'q' | 'Q' => Some(Self::Back),
            _ => Digit::from_char(c).map(Self::Digit),
        }
    }

    /// Decode one line of terminal input into keys
    ///
    /// A line reading `back` is a single back press; otherwise each
    /// recognized character is one key press and everything else is dropped.
    #[must_use]
    pub fn decode_line(line: &str) -> Vec<Self> {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("back") {
            return vec![Self::Back];
        }
        trimmed.chars().filter_map(Self::from_char).collect()
    }

    /// `true` for the `0` key or the back button
    #[must_use]
    pub const fn is_back(self) -> bool {
        matches!(self, Self::Back | Self::Digit(Digit(0)))
    }

    /// The digit carried by this key, if any
    #[must_use]
    pub const fn as_digit(self) -> Option<Digit> {
        match self {
            Self::Digit(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digit(d) => write!(f, "{d}"),
            Self::Star => f.write_str("*"),
            Self::Pound => f.write_str("#"),
            Self::Back => f.write_str("BACK"),
        }
    }
}
