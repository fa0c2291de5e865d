//! Error types for the traversal crate

use std::io;

use thiserror::Error;

use crate::message::MissingField;

/// Result type for traversal operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while running either role
#[derive(Debug, Error)]
pub enum Error {
    /// A required role-specific parameter is missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message template is malformed or a field could not be substituted
    #[error("Template error: {0}")]
    Template(String),

    /// A header or the callback address was not found in a received message
    #[error("Extraction failed: {0}")]
    MissingField(#[from] MissingField),

    /// Binding a listening socket failed
    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, #[source] io::Error),

    /// Accepting an inbound connection failed
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[source] io::Error),

    /// Dialling a remote host failed
    #[error("Failed to connect to {0}: {1}")]
    ConnectFailed(String, #[source] io::Error),

    /// Writing a message to a peer failed
    #[error("Failed to send to {0}: {1}")]
    SendFailed(String, #[source] io::Error),

    /// The peer closed the stream before the blank-line terminator arrived
    #[error("Connection closed before end of message ({0} bytes buffered)")]
    ConnectionClosed(usize),

    /// The peer sent more than the configured maximum without a terminator
    #[error("Message exceeds maximum size of {0} bytes")]
    MessageTooLarge(usize),

    /// A spawned activity panicked or was cancelled
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn configuration<E: std::fmt::Display>(err: E) -> Self {
        Self::Configuration(err.to_string())
    }

    pub fn template<E: std::fmt::Display>(err: E) -> Self {
        Self::Template(err.to_string())
    }

    /// Whether the failure is confined to a single connection handler.
    ///
    /// Configuration, template and bind failures are fatal to the process;
    /// everything observed on an individual stream is not.
    pub fn is_connection_local(&self) -> bool {
        !matches!(
            self,
            Error::Configuration(_) | Error::Template(_) | Error::BindFailed(..)
        )
    }
}
