//! Pending utterance assembled from one or more recordings

/// Text of the utterance being composed
///
/// A fresh recording replaces the text, "add more" appends to it with a single
/// space, and redo/cancel/send clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    text: String,
}

impl TranscriptBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    /// Replace the buffer with `text`
    pub fn replace(&mut self, text: &str) {
        text.clone_into(&mut self.text);
    }

    /// Append `text`, space-joined when the buffer already holds something
    ///
    /// Appending an empty fragment leaves the buffer unchanged.
    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Move the text out, leaving the buffer empty
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
