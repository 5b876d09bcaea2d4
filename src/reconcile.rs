//! Collapses remote flow observations into contract status changes.
//!
//! Callbacks and manual or polled queries race each other, so every signal
//! goes through the same steps under the contract's lock:
//!
//! 1. map the remote flow status (and approver list) to a candidate status,
//!    or `None` while the flow is still in progress;
//! 2. correct a reported expiry to completion when every approver signed;
//! 3. skip when the contract already has the candidate status;
//! 4. ask [`ContractStateMachine`] whether the change is legal;
//! 5. commit status and log entry together.
//!
//! Each attempt, whatever its result, leaves an [`AuditRecord`] with the
//! signal text exactly as it was received.

use crate::contract::{AuditOutcome, AuditRecord, SignalSource, TransitionLogEntry};
use crate::error::{ReconcileError, StoreError};
use crate::locks::ContractLocks;
use crate::signal::{ApproverKind, ApproverStatus, RemoteFlowStatus, RemoteSignal};
use crate::status::{ContractStateMachine, ContractStatus};
use crate::store::{RecordStore, TransitionCommit};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Updated {
        from: ContractStatus,
        to: ContractStatus,
        entry: TransitionLogEntry,
    },
    AlreadyCurrent {
        status: ContractStatus,
    },
    InProgress {
        status: ContractStatus,
    },
    TransitionRejected {
        from: ContractStatus,
        to: ContractStatus,
    },
}

impl ReconcileOutcome {
    pub fn audit_outcome(&self) -> AuditOutcome {
        match self {
            ReconcileOutcome::Updated { .. } => AuditOutcome::Updated,
            ReconcileOutcome::AlreadyCurrent { .. } | ReconcileOutcome::InProgress { .. } => {
                AuditOutcome::NoOp
            }
            ReconcileOutcome::TransitionRejected { .. } => AuditOutcome::Rejected,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ReconcileOutcome::Updated { from, to, .. } => format!("status updated {from} -> {to}"),
            ReconcileOutcome::AlreadyCurrent { status } => format!("already up to date ({status})"),
            ReconcileOutcome::InProgress { status } => {
                format!("signing still in progress ({status})")
            }
            ReconcileOutcome::TransitionRejected { from, to } => {
                format!("transition {from} -> {to} is not allowed")
            }
        }
    }

    /// Status the contract had before this signal.
    pub fn previous(&self) -> ContractStatus {
        match self {
            ReconcileOutcome::Updated { from, .. }
            | ReconcileOutcome::TransitionRejected { from, .. } => *from,
            ReconcileOutcome::AlreadyCurrent { status }
            | ReconcileOutcome::InProgress { status } => *status,
        }
    }
}

/// Map the provider's flow status to a local status. `None` means no change yet.
pub fn map_remote_status(signal: &RemoteSignal) -> Option<ContractStatus> {
    use RemoteFlowStatus::*;
    match signal.status() {
        AllSigned => Some(ContractStatus::Completed),
        Rejected | FillRejected => Some(ContractStatus::Rejected),
        Expired => Some(ContractStatus::Expired),
        Cancelled | Dissolved => Some(ContractStatus::Cancelled),
        Unsigned | PartlySigned | NotStarted | AwaitingFill | PartlyFilled => {
            party_b_finished(signal).then_some(ContractStatus::PendingPartyA)
        }
        Unknown(code) => {
            warn!(flow_id = %signal.flow_id, code, "unknown remote flow status, treating as in progress");
            None
        }
    }
}

// every person approver signed while an organization approver is still open
fn party_b_finished(signal: &RemoteSignal) -> bool {
    let mut persons = signal
        .approvers
        .iter()
        .filter(|a| a.approve_type == ApproverKind::Person)
        .peekable();
    if persons.peek().is_none() {
        return false;
    }
    let persons_signed = persons.all(|a| a.status() == ApproverStatus::Signed);
    let organization_open = signal
        .approvers
        .iter()
        .any(|a| a.approve_type == ApproverKind::Organization && a.status() != ApproverStatus::Signed);

    persons_signed && organization_open
}

/// Staging environments report expiry on flows every approver actually signed.
pub fn correct_expiry(
    candidate: Option<ContractStatus>,
    signal: &RemoteSignal,
) -> Option<ContractStatus> {
    match candidate {
        Some(ContractStatus::Expired) if signal.all_approvers_signed() => {
            Some(ContractStatus::Completed)
        }
        other => other,
    }
}

pub fn candidate_status(signal: &RemoteSignal) -> Option<ContractStatus> {
    correct_expiry(map_remote_status(signal), signal)
}

/// Log remark recorded for a transition into `to`.
pub fn remark_for(to: ContractStatus, reason: Option<&str>) -> String {
    match to {
        ContractStatus::Draft => "Contract drafted".to_string(),
        ContractStatus::PendingPartyB => {
            "Signing flow started, waiting for Party B to sign".to_string()
        }
        ContractStatus::PendingPartyA => {
            "Party B signed, waiting for Party A approval".to_string()
        }
        ContractStatus::Completed => "All parties signed, contract completed".to_string(),
        ContractStatus::Rejected => format!(
            "Signing rejected: {}",
            reason.unwrap_or("no reason given")
        ),
        ContractStatus::Expired => "Signing deadline passed, contract expired".to_string(),
        ContractStatus::Cancelled => match reason {
            Some(reason) => format!("Signing cancelled: {reason}"),
            None => "Signing cancelled".to_string(),
        },
    }
}

pub struct StatusReconciler {
    store: Arc<dyn RecordStore>,
    locks: Arc<ContractLocks>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn RecordStore>, locks: Arc<ContractLocks>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Apply `signal` to `contract_id`. Business outcomes are `Ok`; only
    /// storage faults are errors. Either way an audit record is written,
    /// carrying `raw`, the text `signal` was parsed from.
    pub fn reconcile(
        &self,
        contract_id: &str,
        signal: &RemoteSignal,
        raw: &str,
        source: SignalSource,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let decided = self
            .locks
            .run(contract_id, || self.decide_and_commit(contract_id, signal));

        match decided {
            Ok(outcome) => {
                match &outcome {
                    ReconcileOutcome::TransitionRejected { from, to } => warn!(
                        contract_id,
                        flow_id = %signal.flow_id,
                        %from,
                        %to,
                        ?source,
                        "remote signal rejected by state machine"
                    ),
                    other => info!(
                        contract_id,
                        flow_id = %signal.flow_id,
                        ?source,
                        outcome = %other.message(),
                        "remote signal reconciled"
                    ),
                }
                self.record(AuditRecord::new(
                    source,
                    Some(signal.flow_id.clone()),
                    Some(contract_id.to_string()),
                    raw.to_string(),
                    outcome.audit_outcome(),
                    outcome.message(),
                ))?;
                Ok(outcome)
            }
            Err(err) => {
                warn!(contract_id, flow_id = %signal.flow_id, error = %err, "reconciliation failed");
                self.record(AuditRecord::new(
                    source,
                    Some(signal.flow_id.clone()),
                    Some(contract_id.to_string()),
                    raw.to_string(),
                    AuditOutcome::Failed,
                    err.to_string(),
                ))?;
                Err(err.into())
            }
        }
    }

    /// Resolve the contract bound to the signal's flow, then reconcile.
    pub fn reconcile_flow(
        &self,
        signal: &RemoteSignal,
        raw: &str,
        source: SignalSource,
    ) -> Result<(String, ReconcileOutcome), ReconcileError> {
        let contract = match self.store.contract_by_flow(&signal.flow_id) {
            Ok(Some(contract)) => contract,
            Ok(None) => {
                let err = ReconcileError::UnknownFlow(signal.flow_id.clone());
                self.record(AuditRecord::new(
                    source,
                    Some(signal.flow_id.clone()),
                    None,
                    raw.to_string(),
                    AuditOutcome::Failed,
                    err.to_string(),
                ))?;
                return Err(err);
            }
            Err(err) => {
                self.record(AuditRecord::new(
                    source,
                    Some(signal.flow_id.clone()),
                    None,
                    raw.to_string(),
                    AuditOutcome::Failed,
                    err.to_string(),
                ))?;
                return Err(err.into());
            }
        };

        let outcome = self.reconcile(&contract.id, signal, raw, source)?;
        Ok((contract.id, outcome))
    }

    fn decide_and_commit(
        &self,
        contract_id: &str,
        signal: &RemoteSignal,
    ) -> Result<ReconcileOutcome, StoreError> {
        let contract = self
            .store
            .contract(contract_id)?
            .ok_or_else(|| StoreError::ContractNotFound(contract_id.to_string()))?;
        let current = contract.status;

        let Some(candidate) = candidate_status(signal) else {
            return Ok(ReconcileOutcome::InProgress { status: current });
        };
        if candidate == current {
            return Ok(ReconcileOutcome::AlreadyCurrent { status: current });
        }
        if !ContractStateMachine::is_valid_transition(current, candidate) {
            return Ok(ReconcileOutcome::TransitionRejected {
                from: current,
                to: candidate,
            });
        }

        let (_, entry) = self.store.commit_transition(TransitionCommit {
            contract_id: contract_id.to_string(),
            from: current,
            to: candidate,
            remark: remark_for(candidate, signal.rejection_reason()),
            flow_id: None,
        })?;

        Ok(ReconcileOutcome::Updated {
            from: current,
            to: candidate,
            entry,
        })
    }

    /// Persist an audit record for an attempt that never reached reconciliation.
    pub fn record(&self, record: AuditRecord) -> Result<(), StoreError> {
        if let Err(err) = self.store.append_audit(&record) {
            warn!(flow_id = ?record.flow_id, error = %err, "failed to persist audit record");
            return Err(err);
        }
        Ok(())
    }
}
