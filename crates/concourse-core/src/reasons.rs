//! # Reason Codes
//!
//! The two reason-code taxonomies the staff tooling chooses from: why a
//! merchant rejected an order, and why a refund was requested.
//!
//! ```text
//! ┌───────────────────────────────┬───────────────────────────────────────┐
//! │  merchant_reject              │  refund                               │
//! ├───────────────────────────────┼───────────────────────────────────────┤
//! │  out_of_stock                 │  order_failed                         │
//! │  too_busy                     │  merchant_rejected                    │
//! │  item_unavailable             │  delay_beyond_threshold               │
//! │  system_issue   (notes)       │  wrong_item     (notes)               │
//! │  other          (notes)       │  quality_issue  (notes)               │
//! │                               │  ops_goodwill   (notes)               │
//! │                               │  other          (notes)               │
//! └───────────────────────────────┴───────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// One row of a reason-code table, as shown in a picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReasonCode {
    pub code: String,
    pub label: String,
    pub requires_notes: bool,
}

// =============================================================================
// Merchant Reject Reasons
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    OutOfStock,
    TooBusy,
    ItemUnavailable,
    SystemIssue,
    Other,
}

impl RejectReason {
    pub const ALL: [RejectReason; 5] = [
        RejectReason::OutOfStock,
        RejectReason::TooBusy,
        RejectReason::ItemUnavailable,
        RejectReason::SystemIssue,
        RejectReason::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::OutOfStock => "out_of_stock",
            RejectReason::TooBusy => "too_busy",
            RejectReason::ItemUnavailable => "item_unavailable",
            RejectReason::SystemIssue => "system_issue",
            RejectReason::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::OutOfStock => "Out of stock",
            RejectReason::TooBusy => "Too busy",
            RejectReason::ItemUnavailable => "Item unavailable",
            RejectReason::SystemIssue => "System issue",
            RejectReason::Other => "Other",
        }
    }

    pub fn requires_notes(&self) -> bool {
        matches!(self, RejectReason::SystemIssue | RejectReason::Other)
    }

    /// Returns the full table for the reject picker.
    pub fn table() -> Vec<ReasonCode> {
        Self::ALL.iter().map(|r| r.to_reason_code()).collect()
    }

    pub fn to_reason_code(&self) -> ReasonCode {
        ReasonCode {
            code: self.code().to_string(),
            label: self.label().to_string(),
            requires_notes: self.requires_notes(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RejectReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.code() == s.trim())
            .ok_or_else(|| ValidationError::Unknown {
                field: "reject reason".to_string(),
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Refund Reasons
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    OrderFailed,
    MerchantRejected,
    DelayBeyondThreshold,
    WrongItem,
    QualityIssue,
    OpsGoodwill,
    Other,
}

impl RefundReason {
    pub const ALL: [RefundReason; 7] = [
        RefundReason::OrderFailed,
        RefundReason::MerchantRejected,
        RefundReason::DelayBeyondThreshold,
        RefundReason::WrongItem,
        RefundReason::QualityIssue,
        RefundReason::OpsGoodwill,
        RefundReason::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            RefundReason::OrderFailed => "order_failed",
            RefundReason::MerchantRejected => "merchant_rejected",
            RefundReason::DelayBeyondThreshold => "delay_beyond_threshold",
            RefundReason::WrongItem => "wrong_item",
            RefundReason::QualityIssue => "quality_issue",
            RefundReason::OpsGoodwill => "ops_goodwill",
            RefundReason::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefundReason::OrderFailed => "Order failed",
            RefundReason::MerchantRejected => "Merchant rejected",
            RefundReason::DelayBeyondThreshold => "Delay beyond threshold",
            RefundReason::WrongItem => "Wrong item",
            RefundReason::QualityIssue => "Quality issue",
            RefundReason::OpsGoodwill => "Ops goodwill",
            RefundReason::Other => "Other",
        }
    }

    pub fn requires_notes(&self) -> bool {
        matches!(
            self,
            RefundReason::WrongItem
                | RefundReason::QualityIssue
                | RefundReason::OpsGoodwill
                | RefundReason::Other
        )
    }

    /// Returns the full table for the refund picker.
    pub fn table() -> Vec<ReasonCode> {
        Self::ALL.iter().map(|r| r.to_reason_code()).collect()
    }

    pub fn to_reason_code(&self) -> ReasonCode {
        ReasonCode {
            code: self.code().to_string(),
            label: self.label().to_string(),
            requires_notes: self.requires_notes(),
        }
    }
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RefundReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.code() == s.trim())
            .ok_or_else(|| ValidationError::Unknown {
                field: "refund reason".to_string(),
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_notes_flags() {
        let flagged: Vec<&str> = RejectReason::ALL
            .iter()
            .filter(|r| r.requires_notes())
            .map(|r| r.code())
            .collect();
        assert_eq!(flagged, vec!["system_issue", "other"]);
    }

    #[test]
    fn test_refund_notes_flags() {
        let flagged: Vec<&str> = RefundReason::ALL
            .iter()
            .filter(|r| r.requires_notes())
            .map(|r| r.code())
            .collect();
        assert_eq!(flagged, vec!["wrong_item", "quality_issue", "ops_goodwill", "other"]);
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!("too_busy".parse::<RejectReason>().unwrap(), RejectReason::TooBusy);
        assert_eq!(
            "delay_beyond_threshold".parse::<RefundReason>().unwrap(),
            RefundReason::DelayBeyondThreshold
        );
        assert!("closed_early".parse::<RejectReason>().is_err());
    }

    #[test]
    fn test_serde_matches_code() {
        let json = serde_json::to_string(&RefundReason::OpsGoodwill).unwrap();
        assert_eq!(json, "\"ops_goodwill\"");
        assert_eq!(RejectReason::table().len(), 5);
        assert_eq!(RefundReason::table().len(), 7);
    }
}
