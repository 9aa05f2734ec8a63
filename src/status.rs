use chrono::{DateTime, Local, Utc};

/// Human-readable activity trail, newest line first.
#[derive(Debug, Default, Clone)]
pub struct StatusLine {
    lines: Vec<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl AsRef<str>, at: DateTime<Utc>) {
        let text = text.as_ref();
        tracing::info!(target: "status", "{text}");
        let stamp = at.with_timezone(&Local).format("%H:%M:%S");
        self.lines.insert(0, format!("[{stamp}] {text}"));
    }

    pub fn latest(&self, n: usize) -> &[String] {
        &self.lines[..n.min(self.lines.len())]
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
