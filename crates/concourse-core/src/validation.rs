//! # Validation
//!
//! Input checks that run before any mutation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderSubmission ──► validate_submission                                │
//! │      order_number present                                               │
//! │      1..=MAX_ORDER_ITEMS items, each qty 1..=MAX_ITEM_QUANTITY          │
//! │      unit_price ≥ 0, discount ≥ 0, service_fee ≥ 0                      │
//! │      subtotal == Σ (unit_price + modifier deltas) × qty                 │
//! │      total    == subtotal − discount + service_fee                      │
//! │                                                                         │
//! │  Refund amount ──► validate_refund_amount                               │
//! │      0 < amount ≤ total − already committed                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::OrderSubmission;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Fails with `Required` when `value` is empty after trimming.
pub fn require_non_empty(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Notes are mandatory for reason codes flagged `requires_notes`.
pub fn validate_reason_notes(
    code: &str,
    requires_notes: bool,
    notes: Option<&str>,
) -> ValidationResult<()> {
    let has_notes = notes.map(|n| !n.trim().is_empty()).unwrap_or(false);
    if requires_notes && !has_notes {
        return Err(ValidationError::NotesRequired {
            code: code.to_string(),
        });
    }
    Ok(())
}

/// Checks `0 < amount ≤ total − committed`.
///
/// `committed` is what earlier approved or pending refunds already claim.
pub fn validate_refund_amount(
    amount: Money,
    total: Money,
    committed: Money,
) -> ValidationResult<()> {
    let available = total.saturating_sub(committed);
    if !amount.is_positive() || amount > available {
        return Err(ValidationError::OutOfRange {
            field: "refund amount".to_string(),
            min: 1,
            max: available.cents(),
        });
    }
    Ok(())
}

/// Validates an inbound order before admission.
pub fn validate_submission(submission: &OrderSubmission) -> ValidationResult<()> {
    require_non_empty("order_number", &submission.order_number)?;
    require_non_empty("destination gate", &submission.destination.gate)?;

    if submission.items.is_empty() || submission.items.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    for item in &submission.items {
        require_non_empty("item name", &item.name)?;
        if item.quantity == 0 || item.quantity > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: format!("quantity of {}", item.name),
                min: 1,
                max: MAX_ITEM_QUANTITY as i64,
            });
        }
        if item.unit_price.is_negative() {
            return Err(ValidationError::MustBePositive {
                field: format!("unit price of {}", item.name),
            });
        }
    }

    if submission.discount.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: "discount".to_string(),
        });
    }
    if submission.service_fee.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: "service_fee".to_string(),
        });
    }

    let expected_subtotal = submission
        .computed_subtotal()
        .ok_or_else(|| amount_overflow("subtotal"))?;
    if submission.subtotal != expected_subtotal {
        return Err(ValidationError::Mismatch {
            field: "subtotal".to_string(),
            expected: expected_subtotal.to_string(),
            actual: submission.subtotal.to_string(),
        });
    }

    let expected_total = submission
        .computed_total()
        .ok_or_else(|| amount_overflow("total"))?;
    if submission.total != expected_total {
        return Err(ValidationError::Mismatch {
            field: "total".to_string(),
            expected: expected_total.to_string(),
            actual: submission.total.to_string(),
        });
    }
    if submission.total.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: "total".to_string(),
        });
    }

    Ok(())
}

fn amount_overflow(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
