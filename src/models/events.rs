use std::fmt;

/// Display class of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Info,
    Error,
    Success,
}

impl Severity {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
            Severity::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Item on the task runner's output queue.
///
/// `Completion` is the deferred "task finished" action: it carries no UI
/// reference and is applied by whoever drains the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Line { message: String, severity: Severity },
    Progress(u8),
    Completion { success: bool },
}

impl OutputEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Line {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Line {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::Line {
            message: message.into(),
            severity: Severity::Success,
        }
    }
}

/// Item on the serial bridge's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    Connected { port: String, baud: u32 },
    ConnectFailed(String),
    Line(String),
    Disconnected(String),
}
