//! Contract lifecycle statuses and the transition table that governs them
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingPartyB,
    #[n(2)]
    PendingPartyA,
    #[n(3)]
    Completed,
    #[n(4)]
    Rejected,
    #[n(5)]
    Expired,
    #[n(6)]
    Cancelled,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 7] = [
        ContractStatus::Draft,
        ContractStatus::PendingPartyB,
        ContractStatus::PendingPartyA,
        ContractStatus::Completed,
        ContractStatus::Rejected,
        ContractStatus::Expired,
        ContractStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::PendingPartyB => "PENDING_PARTY_B",
            ContractStatus::PendingPartyA => "PENDING_PARTY_A",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::Rejected => "REJECTED",
            ContractStatus::Expired => "EXPIRED",
            ContractStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        ContractStateMachine::is_terminal(*self)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless authority over which status changes are legal.
///
/// The table is fixed at compile time; every query is a pure lookup, so the
/// reconciler and the service layer both consult it instead of encoding
/// their own rules.
pub struct ContractStateMachine;

impl ContractStateMachine {
    /// Legal targets from `from`. Empty for terminal statuses, never contains `from`.
    pub fn next_valid_statuses(from: ContractStatus) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match from {
            Draft => &[PendingPartyB, Cancelled],
            PendingPartyB => &[PendingPartyA, Completed, Rejected, Expired, Cancelled],
            PendingPartyA => &[Completed, Rejected, Cancelled],
            Completed | Rejected | Expired | Cancelled => &[],
        }
    }

    pub fn is_valid_transition(from: ContractStatus, to: ContractStatus) -> bool {
        Self::next_valid_statuses(from).contains(&to)
    }

    pub fn is_terminal(status: ContractStatus) -> bool {
        Self::next_valid_statuses(status).is_empty()
    }
}
