//! Error taxonomy for the scanning core
//!
//! Only corpus-build failures that happen before any scanning starts are
//! fatal. Everything that goes wrong while looking at one file is turned into
//! a [`crate::models::ScanWarning`] and attached to the report.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the detection core
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid pattern at line {line}: {reason}")]
    InvalidPattern { line: usize, reason: String },

    #[error("{path} is not valid source for the {grammar} grammar")]
    Parse { path: PathBuf, grammar: &'static str },

    #[error("{path}: syntax tree exceeds {limit} {bound}")]
    TreeTooLarge {
        path: PathBuf,
        bound: &'static str,
        limit: usize,
    },

    #[error("{path} is not valid UTF-8 text (first bad byte at offset {offset})")]
    Decode { path: PathBuf, offset: u64 },

    #[error("forbidden pattern corpus not found (looked at {0})")]
    CorpusMissing(String),

    #[error("cache at {path} was built from a different corpus (key {found:016x}, expected {expected:016x})")]
    CacheStale {
        path: PathBuf,
        found: u64,
        expected: u64,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {what}: {message}")]
    Serialization { what: &'static str, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialization(what: &'static str, err: impl std::fmt::Display) -> Self {
        ScanError::Serialization {
            what,
            message: err.to_string(),
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_file() {
        let err = ScanError::Decode {
            path: PathBuf::from("pkg/blob.bin"),
            offset: 12,
        };
        assert!(err.to_string().contains("pkg/blob.bin"));
        assert!(err.to_string().contains("12"));

        let err = ScanError::CacheStale {
            path: PathBuf::from("automaton.bin"),
            found: 1,
            expected: 2,
        };
        assert!(err.to_string().contains("0000000000000001"));
    }

    #[test]
    fn test_io_helper_keeps_source() {
        let err = ScanError::io(
            "missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        );
        assert!(matches!(err, ScanError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
