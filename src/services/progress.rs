use regex::Regex;

/// Markers used when no configuration overrides them.
pub const DEFAULT_PROGRESS_MARKERS: [&str; 2] = ["Writing at", "write_flash"];

/// Extracts write progress from flashing-tool output.
///
/// A line only counts as a progress report if it contains one of the
/// configured markers; the percentage itself is taken from the first
/// `(NN %)` group on the line and clamped to 100.
///
/// # Example
/// ```
/// use espforge::services::ProgressParser;
///
/// let parser = ProgressParser::new();
/// assert_eq!(parser.parse("Writing at 0x00010000... (42 %)"), Some(42));
/// assert_eq!(parser.parse("Hash of data verified."), None);
/// ```
#[derive(Debug, Clone)]
pub struct ProgressParser {
    /// Matches `(N %)`, `(NN %)` or `(NNN %)`
    percent_pattern: Regex,

    markers: Vec<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_PROGRESS_MARKERS)
    }

    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            percent_pattern: Regex::new(r"\((\d{1,3}) %\)").expect("Invalid progress regex"),
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn is_progress_line(&self, line: &str) -> bool {
        self.markers.iter().any(|m| line.contains(m.as_str()))
    }

    /// Percentage from the `(NN %)` group, regardless of markers.
    pub fn extract_percentage(&self, line: &str) -> Option<u8> {
        let captures = self.percent_pattern.captures(line)?;
        let value: u16 = captures.get(1)?.as_str().parse().ok()?;
        Some(value.min(100) as u8)
    }

    /// Percentage for a marked progress line, `None` for anything else.
    pub fn parse(&self, line: &str) -> Option<u8> {
        if !self.is_progress_line(line) {
            return None;
        }
        self.extract_percentage(line)
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}
