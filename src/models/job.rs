use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;

/// Bad or missing user input, reported before any background work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select a valid serial port.")]
    NoPort,

    #[error("File not found:\n{0}")]
    FileNotFound(String),

    #[error("Invalid flash address: {0}")]
    InvalidAddress(String),

    #[error("No files selected to flash.")]
    NoFiles,

    #[error("Unknown chip type: {0}")]
    UnknownChip(String),

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(String),
}

/// The three flashing-tool operations the front end can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Flash,
    Erase,
    ChipInfo,
}

impl Operation {
    /// First line written to the transcript when the operation starts.
    pub fn banner(&self) -> &'static str {
        match self {
            Operation::Flash => "Starting multi-file flash...",
            Operation::Erase => "Starting flash erase...",
            Operation::ChipInfo => "Getting chip info...",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Flash => "flash",
            Operation::Erase => "erase",
            Operation::ChipInfo => "chip-info",
        })
    }
}

/// Parse a flash offset. Accepts `0x`-prefixed or bare hexadecimal.
pub fn parse_address(text: &str) -> Result<u32, ValidationError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(ValidationError::InvalidAddress(text.to_string()));
    }

    u32::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidAddress(text.to_string()))
}

/// Reject the empty selection and the "No ports found" placeholder.
pub fn validate_port(port: &str) -> Result<&str, ValidationError> {
    let port = port.trim();
    if port.is_empty() || port.contains("No ports") {
        return Err(ValidationError::NoPort);
    }
    Ok(port)
}

/// One image to write at one offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSegment {
    pub address: u32,
    pub path: Utf8PathBuf,
}

impl FlashSegment {
    pub fn address_hex(&self) -> String {
        format!("{:#x}", self.address)
    }
}

/// Ordered list of images for one flash invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashJob {
    segments: Vec<FlashSegment>,
}

impl FlashJob {
    /// Build a job from `(address, path)` rows.
    ///
    /// Rows with an empty address or path are skipped. Every remaining path
    /// must point at an existing file, and at least one row must remain.
    pub fn from_rows<'a, I>(rows: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut segments = Vec::new();

        for (addr, path) in rows {
            let (addr, path) = (addr.trim(), path.trim());
            if addr.is_empty() || path.is_empty() {
                continue;
            }

            let path = Utf8Path::new(path);
            if !path.is_file() {
                return Err(ValidationError::FileNotFound(path.to_string()));
            }

            segments.push(FlashSegment {
                address: parse_address(addr)?,
                path: path.to_path_buf(),
            });
        }

        if segments.is_empty() {
            return Err(ValidationError::NoFiles);
        }

        tracing::debug!("Flash job built with {} segment(s)", segments.len());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[FlashSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Interleaved `ADDR PATH ADDR PATH ...` arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| [s.address_hex(), s.path.to_string()])
            .collect()
    }
}
