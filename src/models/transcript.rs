use super::events::Severity;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use std::fs;

/// One displayed line and its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub text: String,
    pub severity: Severity,
}

/// Everything currently shown in an output pane.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>, severity: Severity) {
        self.lines.push(TranscriptLine {
            text: text.into(),
            severity,
        });
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Plain text, one line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Write the rendered transcript as UTF-8.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to save log: {}", path))?;

        tracing::info!("Saved {} transcript lines to {}", self.lines.len(), path);
        Ok(())
    }
}

/// Formats serial monitor lines for display.
#[derive(Debug, Clone, Copy)]
pub struct LinePresenter {
    pub timestamps: bool,
}

impl LinePresenter {
    pub fn new(timestamps: bool) -> Self {
        Self { timestamps }
    }

    /// Format with the current wall-clock time.
    pub fn format(&self, message: &str) -> Option<String> {
        self.format_at(message, Local::now())
    }

    /// Trim the message and add the `[HH:MM:SS.mmm] ` prefix when enabled.
    /// Returns `None` for lines that are blank after trimming.
    pub fn format_at(&self, message: &str, now: DateTime<Local>) -> Option<String> {
        let cleaned = message.trim();
        if cleaned.is_empty() {
            return None;
        }

        if self.timestamps {
            Some(format!("[{}] {}", now.format("%H:%M:%S%.3f"), cleaned))
        } else {
            Some(cleaned.to_string())
        }
    }
}
