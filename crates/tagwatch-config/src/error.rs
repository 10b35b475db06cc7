// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Parameter file error types.

use std::path::PathBuf;
use thiserror::Error;

/// Parameter file errors.
///
/// Every error raised while reading a file carries the file path, and the
/// 1-based line number where one applies.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A line could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        /// Parameter file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read parameter file '{}': {source}", path.display())]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("Parameter file not found: {}", path.display())]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Required key is missing.
    #[error("{}: missing required key '{field}'", path.display())]
    MissingField {
        /// Parameter file.
        path: PathBuf,
        /// The missing key.
        field: String,
    },

    /// A value failed to parse.
    #[error("{}:{line}: invalid value for '{field}': {message}", path.display())]
    InvalidValue {
        /// Parameter file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Key name.
        field: String,
        /// Error message.
        message: String,
    },

    /// The file parsed but its content is unusable.
    #[error("{}{}: {message}", path.display(), line.map(|l| format!(":{}", l)).unwrap_or_default())]
    Validation {
        /// Parameter file.
        path: PathBuf,
        /// 1-based line number, when the problem is on one line.
        line: Option<usize>,
        /// Error message.
        message: String,
    },

    /// A key appears twice.
    #[error("{}:{line}: duplicate key '{key}' (first defined on line {first_line})", path.display())]
    DuplicateKey {
        /// Parameter file.
        path: PathBuf,
        /// 1-based line number of the repeat.
        line: usize,
        /// 1-based line number of the first definition.
        first_line: usize,
        /// The repeated key.
        key: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a missing field error.
    pub fn missing_field(path: impl Into<PathBuf>, field: impl Into<String>) -> Self {
        Self::MissingField {
            path: path.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(
        path: impl Into<PathBuf>,
        line: usize,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            path: path.into(),
            line,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(
        path: impl Into<PathBuf>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(
        path: impl Into<PathBuf>,
        line: usize,
        first_line: usize,
        key: impl Into<String>,
    ) -> Self {
        Self::DuplicateKey {
            path: path.into(),
            line,
            first_line,
            key: key.into(),
        }
    }

    /// Returns the line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. }
            | Self::InvalidValue { line, .. }
            | Self::DuplicateKey { line, .. } => Some(*line),
            Self::Validation { line, .. } => *line,
            Self::Io { .. } | Self::FileNotFound { .. } | Self::MissingField { .. } => None,
        }
    }

    /// Returns `true` if this error is related to file I/O.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
            Self::FileNotFound { .. } => "file_not_found",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Validation { .. } => "validation",
            Self::DuplicateKey { .. } => "duplicate_key",
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
