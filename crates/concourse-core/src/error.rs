//! # Error Types
//!
//! Domain error taxonomy for the fulfillment core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  concourse-core errors (this file)                                     │
//! │  ├── CoreError        - The taxonomy every operation returns           │
//! │  │   ├── Validation        bad input, missing notes, refund range      │
//! │  │   ├── InvalidTransition illegal edge or re-resolved refund          │
//! │  │   ├── StoreClosed / NotAccepting / CapacityExceeded  (admission)    │
//! │  │   ├── NotFound          unknown order or refund id                  │
//! │  │   └── PermissionDenied  capability check failed                     │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  concourse-engine errors (separate crate)                              │
//! │  └── EngineError      - Wraps CoreError, adds config/lock failures     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → Collaborator UI     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors are never retried inside the core. Every variant carries enough
//! context for the staff UI to show a human-readable reason.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors returned by every fulfillment operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Input failed validation before any mutation happened.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The requested edge is not legal from the entity's current state.
    ///
    /// ## When This Occurs
    /// - Accepting an order that is already `accepted`
    /// - Marking `ready` an order that is still `new`
    /// - Approving a refund that was already approved or declined
    #[error("Cannot {action} {entity} {id} while it is {from}")]
    InvalidTransition {
        entity: String,
        id: String,
        from: String,
        action: String,
    },

    /// Store status is `closed`; no order may be admitted.
    #[error("Store is closed")]
    StoreClosed,

    /// The merchant switched off order intake.
    #[error("Merchant is not accepting orders")]
    NotAccepting,

    /// The active pipeline is full.
    ///
    /// ## User Workflow
    /// ```text
    /// Order submitted
    ///      │
    ///      ▼
    /// queue 20 / max 20
    ///      │
    ///      ▼
    /// CapacityExceeded { current: 20, max: 20 }
    ///      │
    ///      ▼
    /// Passenger app shows: "Kitchen is at capacity, try again shortly"
    /// ```
    #[error("Capacity exceeded: {current} of {max} orders in the queue")]
    CapacityExceeded { current: u32, max: u32 },

    /// Unknown order or refund id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The caller's role lacks the capability for the operation.
    #[error("{actor} is not permitted to {capability}")]
    PermissionDenied { actor: String, capability: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        from: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            id: id.into(),
            from: from.to_string(),
            action: action.into(),
        }
    }

    /// Returns true for the three admission denials.
    pub fn is_admission_denial(&self) -> bool {
        matches!(
            self,
            CoreError::StoreClosed | CoreError::NotAccepting | CoreError::CapacityExceeded { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before business logic runs, so a validation failure never leaves
/// a partial mutation behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// A derived amount does not match what was submitted.
    #[error("{field} is {actual} but should be {expected}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Duplicate value (e.g., order number already used by this merchant).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// The chosen reason code requires explanatory notes.
    #[error("Reason '{code}' requires notes")]
    NotesRequired { code: String },

    /// Value is not part of a known taxonomy.
    #[error("Unknown {field}: '{value}'")]
    Unknown { field: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CapacityExceeded { current: 20, max: 20 };
        assert_eq!(err.to_string(), "Capacity exceeded: 20 of 20 orders in the queue");

        let err = CoreError::invalid_transition("order", "A-17", "accepted", "accept");
        assert_eq!(err.to_string(), "Cannot accept order A-17 while it is accepted");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::NotesRequired {
            code: "other".to_string(),
        };
        assert_eq!(err.to_string(), "Reason 'other' requires notes");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "order_number".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_admission_denials() {
        assert!(CoreError::StoreClosed.is_admission_denial());
        assert!(CoreError::NotAccepting.is_admission_denial());
        assert!(CoreError::CapacityExceeded { current: 1, max: 1 }.is_admission_denial());
        assert!(!CoreError::not_found("order", "x").is_admission_denial());
    }
}
