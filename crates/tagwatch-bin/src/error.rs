// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the tagwatch binary.

use tagwatch_config::ConfigError;
use tagwatch_opcua::{OpcUaError, Stage, StageError};
use thiserror::Error;

/// Result type alias for tagwatch-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the tagwatch binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Parameter file error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client settings rejected before connecting.
    #[error("Client settings error: {0}")]
    Client(#[from] OpcUaError),

    /// A client stage failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// | cause | code |
    /// |---|---|
    /// | configuration, at any stage | 1 |
    /// | discovery | 2 |
    /// | endpoint selection | 3 |
    /// | certificate | 4 |
    /// | handshake or timeout | 5 |
    /// | subscribe or bind | 6 |
    /// | delivery fault | 7 |
    /// | I/O or runtime | 8 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Client(OpcUaError::Configuration(_)) => 1,
            Self::Client(_) => 8,
            Self::Stage(error) => stage_exit_code(error),
            Self::Io(_) | Self::Runtime(_) => 8,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }

    /// Returns the client error underneath stage tags and context, if any.
    pub fn client_error(&self) -> Option<&OpcUaError> {
        match self {
            Self::Client(error) => Some(error),
            Self::Stage(error) => Some(error.inner()),
            Self::WithContext { source, .. } => source.client_error(),
            Self::Config(_) | Self::Io(_) | Self::Runtime(_) => None,
        }
    }
}

fn stage_exit_code(error: &StageError) -> i32 {
    if let OpcUaError::Configuration(_) = error.inner() {
        return 1;
    }
    match error.stage {
        Stage::Discovery => 2,
        Stage::EndpointSelection => 3,
        Stage::Trust => 4,
        Stage::Handshake => match error.inner() {
            OpcUaError::Security(_) => 4,
            _ => 5,
        },
        Stage::Subscribe | Stage::Bind => 6,
        Stage::Delivery => 7,
        Stage::Close => 8,
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Prints `Error: ...`, the cause chain and any recovery hints to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("{}", render_error(error));
}

/// Renders the diagnostic printed by [`report_error`].
///
/// Causes whose text is already part of the output are skipped.
pub fn render_error(error: &BinError) -> String {
    let mut out = format!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let message = cause.to_string();
        if !out.contains(&message) {
            out.push_str(&format!("\n  Caused by: {}", message));
        }
        source = cause.source();
    }

    if let Some(client) = error.client_error() {
        for hint in client.recovery_hints() {
            out.push_str(&format!("\n  Hint: {}", hint));
        }
    }
    out
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tagwatch_opcua::{
        ConfigurationError, ConnectionError, SecurityError, SubscriptionError, TimeoutError,
        ValidationFailure,
    };

    const ENDPOINT: &str = "opc.tcp://10.0.0.5:4840";

    fn stage(stage: Stage, source: impl Into<OpcUaError>) -> BinError {
        StageError::new(stage, ENDPOINT, source).into()
    }

    #[test]
    fn test_exit_codes() {
        let config = ConfigError::missing_field("params.txt", "endpoint");
        assert_eq!(BinError::from(config).exit_code(), 1);

        assert_eq!(
            stage(
                Stage::Discovery,
                TimeoutError::Discovery {
                    duration: Duration::from_secs(10)
                }
            )
            .exit_code(),
            2
        );
        assert_eq!(
            stage(Stage::EndpointSelection, ConnectionError::endpoint_not_found(ENDPOINT, "opc.tcp")).exit_code(),
            3
        );
        assert_eq!(
            stage(Stage::Handshake, SecurityError::store("pki/trusted", "write failed")).exit_code(),
            4
        );
        assert_eq!(
            stage(Stage::Handshake, ConnectionError::handshake_failed(ENDPOINT, "BadTimeout")).exit_code(),
            5
        );
        assert_eq!(
            stage(Stage::Bind, SubscriptionError::bind_failed("BadNodeIdUnknown")).exit_code(),
            6
        );
        assert_eq!(
            stage(Stage::Delivery, SubscriptionError::delivery_fault("connection lost")).exit_code(),
            7
        );
        assert_eq!(BinError::runtime("test").exit_code(), 8);
        assert_eq!(BinError::io("test").exit_code(), 8);
    }

    #[test]
    fn test_context_keeps_exit_code() {
        let err = stage(Stage::Bind, SubscriptionError::bind_failed("x")).with_context("run");
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_stage_message_names_stage_and_endpoint() {
        let err = stage(Stage::Discovery, ConnectionError::discovery_failed(ENDPOINT, "refused"));
        let rendered = render_error(&err);
        let first = rendered.lines().next().unwrap();
        assert!(first.starts_with("Error: discovery failed for opc.tcp://10.0.0.5:4840"));
        assert!(first.contains("refused"));
        assert!(!rendered.contains("Caused by"));

        let err = BinError::io("disk full").with_context("writing trust list");
        let rendered = render_error(&err);
        assert_eq!(rendered, "Error: writing trust list: I/O error: disk full");
    }

    #[test]
    fn test_configuration_error_at_any_stage_exits_with_config_code() {
        let err = stage(
            Stage::Discovery,
            ConfigurationError::invalid_value("operation_timeout", "must be non-zero"),
        );
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_render_appends_recovery_hints() {
        let err = stage(
            Stage::Trust,
            SecurityError::certificate_rejected("CN=plc01", "AB12", ValidationFailure::Untrusted),
        )
        .with_context("run");
        let rendered = render_error(&err);
        assert!(rendered
            .lines()
            .any(|l| l.starts_with("  Hint:") && l.contains("--auto-accept-untrusted")));
        assert_eq!(err.exit_code(), 4);
    }
}
