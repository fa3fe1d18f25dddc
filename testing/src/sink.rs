//! Shared text output for handlers under test
//!
//! Handlers registered in a test usually need somewhere observable to write.
//! [`TextSink`] is a cloneable, thread-safe line buffer: hand one clone to the
//! handler and assert on another.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable in-memory text buffer.
///
/// # Example
///
/// ```
/// use observr_testing::TextSink;
///
/// let sink = TextSink::new();
/// let writer = sink.clone();
/// writer.write_line("Ping Pong");
///
/// assert_eq!(sink.contents(), "Ping Pong\n");
/// assert_eq!(sink.lines(), vec!["Ping Pong"]);
/// ```
#[derive(Clone, Default)]
pub struct TextSink {
    buffer: Arc<Mutex<String>>,
}

impl TextSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` followed by a newline.
    pub fn write_line(&self, text: impl fmt::Display) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push_str(&text.to_string());
        buffer.push('\n');
    }

    /// Append `text` as is.
    pub fn write(&self, text: impl fmt::Display) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(&text.to_string());
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Written lines, without terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Discard everything written so far.
    pub fn clear(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for TextSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextSink").field(&self.contents()).finish()
    }
}
