//! # Engine Error Types
//!
//! Error types for the fulfillment runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │  Configuration  │  │       Runtime           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  CoreError      │  │  InvalidConfig  │  │  LockPoisoned           │ │
//! │  │  (validation,   │  │  ConfigLoad     │  │  ChannelClosed          │ │
//! │  │   transitions,  │  │  ConfigSave     │  │  Serialization          │ │
//! │  │   admission...) │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators match on [`EngineError::domain`] to show the typed reason.

use concourse_core::CoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A business rule refused the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Payload could not be parsed or encoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A thread panicked while holding a record lock.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Channel error: {0}")]
    ChannelClosed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<concourse_core::ValidationError> for EngineError {
    fn from(err: concourse_core::ValidationError) -> Self {
        EngineError::Domain(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        EngineError::LockPoisoned(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// Returns true if a business rule (not the runtime) refused the call.
    pub fn is_domain(&self) -> bool {
        matches!(self, EngineError::Domain(_))
    }

    /// The domain error, if this is one.
    pub fn domain(&self) -> Option<&CoreError> {
        match self {
            EngineError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true for configuration problems.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_transparent() {
        let err: EngineError = CoreError::StoreClosed.into();
        assert!(err.is_domain());
        assert_eq!(err.to_string(), "Store is closed");
        assert_eq!(err.domain(), Some(&CoreError::StoreClosed));
    }

    #[test]
    fn test_config_categorization() {
        assert!(EngineError::InvalidConfig("x".into()).is_config_error());
        assert!(!EngineError::LockPoisoned("x".into()).is_config_error());
        assert!(EngineError::ChannelClosed("x".into()).domain().is_none());
    }
}
