// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Nightjar agent gateway.

use thiserror::Error;

/// The primary error type used across Nightjar crates.
#[derive(Debug, Error)]
pub enum NightjarError {
    /// Configuration errors (invalid JSON, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel adapter errors (connection failure, send failure, not running).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM or embedding provider errors (HTTP failure, bad response shape).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persistence errors (session files, cron store, SQLite index).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid job schedule (bad cron expression, past `at` time, zero period).
    #[error("invalid schedule: {0}")]
    Schedule(String),

    /// Tool arguments failed validation or pre-conditions.
    #[error("{0}")]
    Tool(String),

    /// A tool name outside the registry was requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool excluded by the allow-list was requested.
    #[error("tool disabled: {0}")]
    ToolDisabled(String),

    /// The operation observed shutdown cancellation.
    #[error("canceled")]
    Canceled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NightjarError {
    /// Wrap any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NightjarError::Storage {
            source: Box::new(err),
        }
    }

    /// Wrap any error as a provider error with a context message.
    pub fn provider<E>(message: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NightjarError::Provider {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Build a provider error with no underlying source.
    pub fn provider_msg(message: impl Into<String>) -> Self {
        NightjarError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Build a channel error with no underlying source.
    pub fn channel_msg(message: impl Into<String>) -> Self {
        NightjarError::Channel {
            message: message.into(),
            source: None,
        }
    }
}

impl From<std::io::Error> for NightjarError {
    fn from(err: std::io::Error) -> Self {
        NightjarError::storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = NightjarError::Config("llm.model is empty".into());
        assert_eq!(err.to_string(), "configuration error: llm.model is empty");

        let err = NightjarError::UnknownTool("frobnicate".into());
        assert_eq!(err.to_string(), "unknown tool: frobnicate");
    }

    #[test]
    fn io_error_converts_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NightjarError = io.into();
        assert!(matches!(err, NightjarError::Storage { .. }));
    }
}
