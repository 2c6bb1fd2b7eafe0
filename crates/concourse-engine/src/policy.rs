//! # Policy Gate
//!
//! Who may do what. Every mutating call on the engine passes through
//! [`authorize`] before it touches a record.
//!
//! ## Role Grants
//! ```text
//! ┌──────────┬─────────────────────────────────────────────────────────────┐
//! │ staff    │ submit, accept, reject, prepare, hand off, request refund   │
//! │ manager  │ staff + fail order, manage capacity                         │
//! │ runner   │ hand off, deliver                                           │
//! │ ops      │ request refund, review refund, fail order                   │
//! │ system   │ submit, accept, prepare, fail order                         │
//! └──────────┴─────────────────────────────────────────────────────────────┘
//! ```

use concourse_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Manager,
    Runner,
    Ops,
    /// Integrations and the demo harness.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Staff => write!(f, "staff"),
            Role::Manager => write!(f, "manager"),
            Role::Runner => write!(f, "runner"),
            Role::Ops => write!(f, "ops"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SubmitOrder,
    AcceptOrder,
    RejectOrder,
    PrepareOrder,
    HandOff,
    Deliver,
    FailOrder,
    RequestRefund,
    ReviewRefund,
    ManageCapacity,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::SubmitOrder => "submit orders",
            Capability::AcceptOrder => "accept orders",
            Capability::RejectOrder => "reject orders",
            Capability::PrepareOrder => "prepare orders",
            Capability::HandOff => "hand off orders",
            Capability::Deliver => "deliver orders",
            Capability::FailOrder => "fail orders",
            Capability::RequestRefund => "request refunds",
            Capability::ReviewRefund => "review refunds",
            Capability::ManageCapacity => "manage capacity",
        };
        f.write_str(s)
    }
}

/// The caller of an operation, as recorded in event logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// The built-in actor used for automatic actions.
    pub fn system() -> Self {
        Actor::new("system", "System", Role::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

/// Whether `role` holds `capability`.
pub fn grants(role: Role, capability: Capability) -> bool {
    use Capability::*;

    match role {
        Role::Staff => matches!(
            capability,
            SubmitOrder | AcceptOrder | RejectOrder | PrepareOrder | HandOff | RequestRefund
        ),
        Role::Manager => {
            grants(Role::Staff, capability) || matches!(capability, FailOrder | ManageCapacity)
        }
        Role::Runner => matches!(capability, HandOff | Deliver),
        Role::Ops => matches!(capability, RequestRefund | ReviewRefund | FailOrder),
        Role::System => matches!(capability, SubmitOrder | AcceptOrder | PrepareOrder | FailOrder),
    }
}

/// The one capability check. Fails with `PermissionDenied`.
pub fn authorize(actor: &Actor, capability: Capability) -> Result<(), CoreError> {
    if grants(actor.role, capability) {
        return Ok(());
    }
    warn!(actor = %actor.id, role = %actor.role, capability = %capability, "Permission denied");
    Err(CoreError::PermissionDenied {
        actor: actor.to_string(),
        capability: capability.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_extends_staff() {
        assert!(grants(Role::Manager, Capability::AcceptOrder));
        assert!(grants(Role::Manager, Capability::ManageCapacity));
        assert!(!grants(Role::Staff, Capability::ManageCapacity));
    }

    #[test]
    fn test_only_ops_reviews_refunds() {
        for role in [Role::Staff, Role::Manager, Role::Runner, Role::System] {
            assert!(!grants(role, Capability::ReviewRefund), "{role}");
        }
        assert!(grants(Role::Ops, Capability::ReviewRefund));
    }

    #[test]
    fn test_runner_cannot_accept() {
        let runner = Actor::new("r-7", "Dana", Role::Runner);
        let err = authorize(&runner, Capability::AcceptOrder).unwrap_err();
        assert_eq!(
            err.to_string(),
            "r-7 (runner) is not permitted to accept orders"
        );
        assert!(authorize(&runner, Capability::Deliver).is_ok());
    }
}
