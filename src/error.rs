//! Error taxonomy shared by the checksum engine, the transform pipeline and
//! the source readers/writers.
//!
//! Library code returns [`SourceError`]; the CLI wraps it with
//! `anyhow::Context`. Checksum mismatches are not errors, see
//! [`crate::checksum::ChecksumMismatchWarning`].

use std::path::PathBuf;

use miette::Diagnostic;

pub type Result<T, E = SourceError> = std::result::Result<T, E>;

/// Re-serialized text diverged from the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, thiserror::Error)]
#[error("round-trip mismatch in {file} at line {line}, column {column}")]
#[diagnostic(
    code(appsource::round_trip),
    help("the serializer or a transform no longer reproduces this file byte for byte")
)]
pub struct RoundTripMismatch {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A tree invariant is violated (duplicate name, missing editor state,
    /// dangling component reference). Never auto-repaired.
    #[error("structural validation failed in {file}: {message}")]
    StructuralValidation { file: String, message: String },

    #[error(transparent)]
    RoundTrip(#[from] RoundTripMismatch),

    /// Shape or version the transforms do not understand.
    #[error("unsupported format in {entry}: {message}")]
    FormatUnsupported { entry: String, message: String },

    #[error("parse error in {file}{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse {
        file: String,
        line: Option<usize>,
        message: String,
    },

    #[error("archive entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl SourceError {
    pub fn structural(file: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::StructuralValidation {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(entry: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::FormatUnsupported {
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn parse(file: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        SourceError::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Wrap a serde_json failure, keeping its line when it has one.
    pub fn json(file: impl Into<String>, err: serde_json::Error) -> Self {
        let line = (err.line() > 0).then_some(err.line());
        SourceError::parse(file, line, err.to_string())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }
}
