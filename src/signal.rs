//! Provider-side flow and approver status as reported by callbacks and queries
use serde::{Deserialize, Serialize};

/// Flow status codes reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFlowStatus {
    Unsigned,
    PartlySigned,
    Rejected,
    AllSigned,
    Expired,
    Cancelled,
    NotStarted,
    AwaitingFill,
    PartlyFilled,
    FillRejected,
    Dissolved,
    Unknown(i64),
}

impl From<i64> for RemoteFlowStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => RemoteFlowStatus::Unsigned,
            2 => RemoteFlowStatus::PartlySigned,
            3 => RemoteFlowStatus::Rejected,
            4 => RemoteFlowStatus::AllSigned,
            5 => RemoteFlowStatus::Expired,
            6 => RemoteFlowStatus::Cancelled,
            7 => RemoteFlowStatus::NotStarted,
            8 => RemoteFlowStatus::AwaitingFill,
            9 => RemoteFlowStatus::PartlyFilled,
            10 => RemoteFlowStatus::FillRejected,
            21 => RemoteFlowStatus::Dissolved,
            other => RemoteFlowStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproverStatus {
    Pending,
    Filling,
    Signed,
    Rejected,
    Expired,
    Unknown(i64),
}

impl From<i64> for ApproverStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => ApproverStatus::Pending,
            2 => ApproverStatus::Filling,
            3 => ApproverStatus::Signed,
            4 => ApproverStatus::Rejected,
            5 => ApproverStatus::Expired,
            other => ApproverStatus::Unknown(other),
        }
    }
}

/// Which side of the contract an approver signs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApproverKind {
    // automatic enterprise signing counts as the organization
    #[serde(alias = "ENTERPRISESERVER")]
    Organization,
    Person,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApproverState {
    pub approve_type: ApproverKind,
    pub approve_status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_message: Option<String>,
}

impl ApproverState {
    pub fn status(&self) -> ApproverStatus {
        ApproverStatus::from(self.approve_status)
    }
}

/// One observation of a remote flow, from a callback or a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteSignal {
    pub flow_id: String,
    pub flow_status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub approvers: Vec<ApproverState>,
}

impl RemoteSignal {
    pub fn status(&self) -> RemoteFlowStatus {
        RemoteFlowStatus::from(self.flow_status)
    }

    pub fn all_approvers_signed(&self) -> bool {
        !self.approvers.is_empty()
            && self
                .approvers
                .iter()
                .all(|a| a.status() == ApproverStatus::Signed)
    }

    /// First rejection message from the flow or any approver.
    pub fn rejection_reason(&self) -> Option<&str> {
        let not_blank = |m: &&str| !m.trim().is_empty();
        self.approvers
            .iter()
            .filter(|a| a.status() == ApproverStatus::Rejected)
            .find_map(|a| a.approve_message.as_deref().filter(not_blank))
            .or_else(|| self.message.as_deref().filter(not_blank))
    }
}
