use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 1-based, inclusive range of source lines an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn single(line: usize) -> Self {
        Self { start: line, end: line }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "line {}", self.start)
        } else {
            write!(f, "lines {}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Error)]
pub enum RefError {
    #[error("Parse error at {lines}: {message}")]
    Parse { lines: LineRange, message: String },

    #[error("All disambiguator suffixes a-z are taken for citekey {0}")]
    KeyExhaustion(String),

    #[error("No registry record found for DOI {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("File system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed registry response: {0}")]
    Json(#[from] serde_json::Error),
}

impl RefError {
    pub fn parse(lines: LineRange, message: impl Into<String>) -> Self {
        RefError::Parse { lines, message: message.into() }
    }

    /// Wrap an I/O error with the path that caused it.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RefError::FileSystem { path: path.into(), source }
    }
}

impl From<reqwest::Error> for RefError {
    fn from(err: reqwest::Error) -> Self {
        RefError::Network(err.to_string())
    }
}

pub type Result<T, E = RefError> = std::result::Result<T, E>;
