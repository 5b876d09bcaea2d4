//! Service layer API for contract signing workflow operations
use crate::contract::{AuditOutcome, AuditRecord, Contract, NewContract, SignalSource, TransitionLogEntry};
use crate::error::{ReconcileError, ServiceError};
use crate::locks::ContractLocks;
use crate::provider::{FlowTemplate, ProviderClient};
use crate::reconcile::{ReconcileOutcome, StatusReconciler, remark_for};
use crate::status::{ContractStateMachine, ContractStatus};
use crate::store::{RecordStore, TransitionCommit};
use crate::utils;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a manual or polled sync, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub updated: bool,
    pub previous: ContractStatus,
    pub current: Option<ContractStatus>,
    pub message: String,
}

impl From<&ReconcileOutcome> for SyncReport {
    fn from(outcome: &ReconcileOutcome) -> Self {
        let (success, updated, current) = match outcome {
            ReconcileOutcome::Updated { to, .. } => (true, true, Some(*to)),
            ReconcileOutcome::AlreadyCurrent { .. } | ReconcileOutcome::InProgress { .. } => {
                (true, false, None)
            }
            ReconcileOutcome::TransitionRejected { .. } => (false, false, None),
        };
        Self {
            success,
            updated,
            previous: outcome.previous(),
            current,
            message: outcome.message(),
        }
    }
}

#[derive(Debug)]
pub struct PollResult {
    pub contract_id: String,
    pub result: Result<SyncReport, ServiceError>,
}

pub struct ContractService {
    store: Arc<dyn RecordStore>,
    provider: Arc<ProviderClient>,
    locks: Arc<ContractLocks>,
    reconciler: Arc<StatusReconciler>,
}

impl ContractService {
    pub fn new(store: Arc<dyn RecordStore>, provider: Arc<ProviderClient>) -> Self {
        let locks = Arc::new(ContractLocks::new());
        let reconciler = Arc::new(StatusReconciler::new(store.clone(), locks.clone()));
        Self {
            store,
            provider,
            locks,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> Arc<StatusReconciler> {
        self.reconciler.clone()
    }

    /// Load a contract from the store
    pub fn contract(&self, contract_id: &str) -> Result<Contract, ServiceError> {
        self.store
            .contract(contract_id)?
            .ok_or_else(|| ServiceError::NotFound(contract_id.to_string()))
    }

    fn ensure_transition(from: ContractStatus, to: ContractStatus) -> Result<(), ServiceError> {
        if ContractStateMachine::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(ServiceError::TransitionRejected { from, to })
        }
    }

    /// Draft a new contract
    pub fn create_contract(&self, new: NewContract) -> Result<Contract, ServiceError> {
        let id = utils::new_contract_id().map_err(|e| ServiceError::Identifier(e.to_string()))?;
        let contract = Contract::draft(id, new);

        self.store
            .insert_contract(&contract, &remark_for(ContractStatus::Draft, None))?;
        info!(contract_id = %contract.id, "contract drafted");

        Ok(contract)
    }

    /// Start the remote signing flow for a drafted contract
    pub async fn start_signing(
        &self,
        contract_id: &str,
        template: &FlowTemplate,
    ) -> Result<Contract, ServiceError> {
        let contract = self.contract(contract_id)?;
        if contract.status != ContractStatus::Draft || contract.flow_id.is_some() {
            return Err(ServiceError::InvalidState {
                contract_id: contract.id,
                status: contract.status,
                action: "start signing",
            });
        }
        Self::ensure_transition(contract.status, ContractStatus::PendingPartyB)?;

        // remote call happens outside the contract lock
        let flow_id = self
            .provider
            .initiate_flow(&contract.title, &contract.party_b, template)
            .await?;

        let committed = self.locks.run(contract_id, || {
            self.store.commit_transition(TransitionCommit {
                contract_id: contract_id.to_string(),
                from: ContractStatus::Draft,
                to: ContractStatus::PendingPartyB,
                remark: remark_for(ContractStatus::PendingPartyB, None),
                flow_id: Some(flow_id.clone()),
            })
        });

        match committed {
            Ok((contract, _)) => {
                info!(contract_id, %flow_id, "contract sent for signing");
                Ok(contract)
            }
            Err(err) => {
                warn!(contract_id, %flow_id, error = %err, "could not bind flow, cancelling it");
                if let Err(cancel_err) = self
                    .provider
                    .cancel_flow(&flow_id, "contract changed before signing started")
                    .await
                {
                    warn!(%flow_id, error = %cancel_err, "orphaned flow could not be cancelled");
                }
                Err(err.into())
            }
        }
    }

    /// Pull the current flow status from the provider and reconcile it.
    /// A refused request is audited like any other sync attempt.
    pub async fn sync_contract(&self, contract_id: &str) -> Result<SyncReport, ServiceError> {
        let bound = self
            .contract(contract_id)
            .and_then(|contract| match contract.flow_id {
                Some(flow_id) => Ok((contract.id, flow_id)),
                None => Err(ServiceError::NoFlow {
                    contract_id: contract.id,
                }),
            });
        let (id, flow_id) = match bound {
            Ok(bound) => bound,
            Err(err) => {
                warn!(contract_id, error = %err, "manual sync refused");
                self.reconciler.record(AuditRecord::new(
                    SignalSource::ManualSync,
                    None,
                    Some(contract_id.to_string()),
                    String::new(),
                    AuditOutcome::Failed,
                    err.to_string(),
                ))?;
                return Err(err);
            }
        };

        self.sync_flow(&id, &flow_id, SignalSource::ManualSync).await
    }

    async fn sync_flow(
        &self,
        contract_id: &str,
        flow_id: &str,
        source: SignalSource,
    ) -> Result<SyncReport, ServiceError> {
        let signal = match self.provider.describe_flow(flow_id).await {
            Ok(signal) => signal,
            Err(err) => {
                warn!(contract_id, flow_id, error = %err, "flow query failed");
                self.reconciler.record(AuditRecord::new(
                    source,
                    Some(flow_id.to_string()),
                    Some(contract_id.to_string()),
                    String::new(),
                    AuditOutcome::Failed,
                    err.to_string(),
                ))?;
                return Err(err.into());
            }
        };

        // queried flows are audited in their parsed form
        let raw = serde_json::to_string(&signal).map_err(ReconcileError::from)?;
        let outcome = self
            .reconciler
            .reconcile(contract_id, &signal, &raw, source)?;
        Ok(SyncReport::from(&outcome))
    }

    /// Sync every contract that is waiting on a signature
    pub async fn poll_pending(&self) -> Result<Vec<PollResult>, ServiceError> {
        let pending = self
            .store
            .contracts_in(&[ContractStatus::PendingPartyB, ContractStatus::PendingPartyA])?;

        let mut results = Vec::with_capacity(pending.len());
        for contract in pending {
            let Some(flow_id) = contract.flow_id else {
                continue;
            };
            let result = self
                .sync_flow(&contract.id, &flow_id, SignalSource::Poll)
                .await;
            if let Err(err) = &result {
                warn!(contract_id = %contract.id, error = %err, "poll sync failed");
            }
            results.push(PollResult {
                contract_id: contract.id,
                result,
            });
        }

        info!(synced = results.len(), "pending contracts polled");
        Ok(results)
    }

    /// Cancel a contract, withdrawing the remote flow if one was started
    pub async fn cancel_contract(
        &self,
        contract_id: &str,
        reason: &str,
    ) -> Result<Contract, ServiceError> {
        let contract = self.contract(contract_id)?;
        Self::ensure_transition(contract.status, ContractStatus::Cancelled)?;

        if let Some(flow_id) = &contract.flow_id {
            self.provider.cancel_flow(flow_id, reason).await?;
        }

        let (contract, _) = self.locks.run(contract_id, || {
            self.store.commit_transition(TransitionCommit {
                contract_id: contract_id.to_string(),
                from: contract.status,
                to: ContractStatus::Cancelled,
                remark: remark_for(ContractStatus::Cancelled, Some(reason)),
                flow_id: None,
            })
        })?;
        info!(contract_id, "contract cancelled");

        Ok(contract)
    }

    /// Download link for the signed document of a completed contract
    pub async fn document_url(&self, contract_id: &str) -> Result<String, ServiceError> {
        let contract = self.contract(contract_id)?;
        if contract.status != ContractStatus::Completed {
            return Err(ServiceError::InvalidState {
                contract_id: contract.id,
                status: contract.status,
                action: "download the signed document",
            });
        }
        let flow_id = contract.flow_id.ok_or_else(|| ServiceError::NoFlow {
            contract_id: contract.id.clone(),
        })?;

        self.provider
            .document_urls(&flow_id)
            .await?
            .into_iter()
            .next()
            .ok_or(ServiceError::NoDocument(flow_id))
    }

    pub fn history(&self, contract_id: &str) -> Result<Vec<TransitionLogEntry>, ServiceError> {
        self.contract(contract_id)?;
        Ok(self.store.transitions(contract_id)?)
    }

    pub fn audit_trail(&self, contract_id: &str) -> Result<Vec<AuditRecord>, ServiceError> {
        let contract = self.contract(contract_id)?;
        match contract.flow_id {
            Some(flow_id) => Ok(self.store.audits_for_flow(Some(&flow_id))?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::TimeStamp;

    fn entry() -> TransitionLogEntry {
        TransitionLogEntry {
            contract_id: "c1".into(),
            from_status: Some(ContractStatus::PendingPartyB),
            to_status: ContractStatus::Completed,
            remark: String::new(),
            at: TimeStamp::new(),
        }
    }

    #[test]
    fn report_for_update() {
        let report = SyncReport::from(&ReconcileOutcome::Updated {
            from: ContractStatus::PendingPartyB,
            to: ContractStatus::Completed,
            entry: entry(),
        });
        assert!(report.success && report.updated);
        assert_eq!(report.previous, ContractStatus::PendingPartyB);
        assert_eq!(report.current, Some(ContractStatus::Completed));
    }

    #[test]
    fn report_for_rejection_names_the_pair() {
        let report = SyncReport::from(&ReconcileOutcome::TransitionRejected {
            from: ContractStatus::Completed,
            to: ContractStatus::Rejected,
        });
        assert!(!report.success);
        assert!(!report.updated);
        assert_eq!(report.current, None);
        assert!(report.message.contains("COMPLETED -> REJECTED"));
    }

    #[test]
    fn report_for_noop_is_success() {
        let report = SyncReport::from(&ReconcileOutcome::InProgress {
            status: ContractStatus::PendingPartyB,
        });
        assert!(report.success);
        assert!(!report.updated);
    }
}
