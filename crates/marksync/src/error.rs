//! Error types for marksync.
//!
//! This module defines the [`enum@Error`] enum and [`Result`] type alias used
//! throughout the marksync library.
//!
//! # Error Categories
//!
//! Errors are categorized by what failed:
//!
//! - [`Error::Config`] - Missing or invalid sync settings
//! - [`Error::Network`] - Remote document API failures
//! - [`Error::PasswordMissing`] - Encrypted document, no password configured
//! - [`Error::WrongPassword`] - Authenticated decryption failed
//! - [`Error::Encryption`] - Other encrypt/decrypt failures
//! - [`Error::Store`] - Live bookmark store failures
//! - [`Error::StoreConsistency`] - Removing a node the store no longer has
//! - [`Error::Serialization`] - Snapshot (de)serialization failures
//! - [`Error::RemoteEmpty`] - Download with no remote document to read
//! - [`Error::Busy`] - Another mutating operation holds the guard

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for marksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in marksync operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Sync settings are missing or invalid
    #[error("configuration error: {0}")]
    Config(Arc<str>),

    /// Remote document API call failed
    #[error("network error: {0}")]
    Network(Arc<str>),

    /// The remote document is encrypted but no password is configured
    #[error("document is encrypted but no password is configured")]
    PasswordMissing,

    /// Authenticated decryption failed, the configured password is wrong
    #[error("decryption failed: wrong password")]
    WrongPassword,

    /// Encryption or envelope handling failed
    #[error("encryption error: {0}")]
    Encryption(Arc<str>),

    /// Live bookmark store operation failed
    #[error("bookmark store error: {0}")]
    Store(Arc<str>),

    /// The store no longer has a node we tried to remove
    #[error("store consistency: {0}")]
    StoreConsistency(Arc<str>),

    /// Snapshot serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(Arc<str>),

    /// The remote document has no content to download
    #[error("remote document is empty")]
    RemoteEmpty,

    /// Another mutating operation is already in flight
    #[error("another sync operation is already in progress")]
    Busy,
}

impl Error {
    /// Create a configuration error
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(Arc::from(msg.into()))
    }

    /// Create a network error
    #[inline]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(Arc::from(msg.into()))
    }

    /// Create an encryption error
    #[inline]
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(Arc::from(msg.into()))
    }

    /// Create a bookmark store error
    #[inline]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(Arc::from(msg.into()))
    }

    /// Create a store consistency error
    #[inline]
    pub fn store_consistency(msg: impl Into<String>) -> Self {
        Self::StoreConsistency(Arc::from(msg.into()))
    }

    /// Create a serialization error
    #[inline]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(Arc::from(msg.into()))
    }

    /// Whether this error should prompt the user for a password
    /// rather than show a generic failure.
    #[must_use]
    pub fn is_password_error(&self) -> bool {
        matches!(self, Self::PasswordMissing | Self::WrongPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_errors_are_distinguished() {
        assert!(Error::PasswordMissing.is_password_error());
        assert!(Error::WrongPassword.is_password_error());
        assert!(!Error::config("missing credential").is_password_error());
        assert!(!Error::network("timeout").is_password_error());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::config("file name not set");
        assert_eq!(err.to_string(), "configuration error: file name not set");

        let err = Error::store_consistency("node 42 already removed");
        assert!(err.to_string().contains("node 42 already removed"));
    }
}
