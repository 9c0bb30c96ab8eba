// Diagnostic output shown in the Output pane

use std::sync::{Arc, Mutex, PoisonError};

/// Append-only text log shared between the foreground and background loads.
///
/// Clones share the same buffer. Every line is also emitted as a `tracing`
/// event so it ends up in the log file.
#[derive(Debug, Clone, Default)]
pub struct Scrollback {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Scrollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text; embedded newlines start new lines
    pub fn write(&self, text: &str) {
        tracing::info!(target: "varscope::scrollback", "{}", text);
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        for line in text.trim_end_matches('\n').split('\n') {
            lines.push(line.to_string());
        }
    }

    /// Append a line describing a failure
    pub fn error(&self, text: &str) {
        tracing::warn!(target: "varscope::scrollback", "{}", text);
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push(text.to_string());
    }

    /// Get all lines as a vector of strings
    pub fn get_output(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
