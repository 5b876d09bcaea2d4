//! Persistence for contracts, their transition log and the audit trail.
//!
//! The sled layout uses one tree per record kind:
//!
//! - `contracts`: contract id -> CBOR [`Contract`]
//! - `flow_index`: remote flow id -> contract id
//! - `transitions`: `{contract id}\0{seq}` -> CBOR [`TransitionLogEntry`]
//! - `audit`: `{flow id}\0{seq}` -> CBOR [`AuditRecord`]
//!
//! Status changes go through [`RecordStore::commit_transition`], which writes
//! the new status and its log entry in a single multi-tree transaction.

use crate::contract::{AuditRecord, Contract, TimeStamp, TransitionLogEntry};
use crate::error::StoreError;
use crate::status::ContractStatus;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

const CONTRACTS: &str = "contracts";
const FLOW_INDEX: &str = "flow_index";
const TRANSITIONS: &str = "transitions";
const AUDIT: &str = "audit";
// audit records that arrive before a flow id is known
const NO_FLOW: &str = "-";

/// A status change to apply if the contract is still at `from`.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub contract_id: String,
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub remark: String,
    /// Binds the remote flow in the same commit. Rejected if a different flow is already bound.
    pub flow_id: Option<String>,
}

pub trait RecordStore: Send + Sync {
    /// Persist a new contract together with its creation log entry.
    fn insert_contract(&self, contract: &Contract, remark: &str) -> Result<(), StoreError>;
    fn contract(&self, contract_id: &str) -> Result<Option<Contract>, StoreError>;
    fn contract_by_flow(&self, flow_id: &str) -> Result<Option<Contract>, StoreError>;
    fn contracts_in(&self, statuses: &[ContractStatus]) -> Result<Vec<Contract>, StoreError>;
    /// Atomically compare the current status, write the new one and append the log entry.
    fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(Contract, TransitionLogEntry), StoreError>;
    fn transitions(&self, contract_id: &str) -> Result<Vec<TransitionLogEntry>, StoreError>;
    fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;
    fn audits_for_flow(&self, flow_id: Option<&str>) -> Result<Vec<AuditRecord>, StoreError>;
}

pub struct SledStore {
    db: sled::Db,
    contracts: sled::Tree,
    flow_index: sled::Tree,
    transitions: sled::Tree,
    audit: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            contracts: db.open_tree(CONTRACTS)?,
            flow_index: db.open_tree(FLOW_INDEX)?,
            transitions: db.open_tree(TRANSITIONS)?,
            audit: db.open_tree(AUDIT)?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn seq_key(prefix: &str, seq: u64) -> Vec<u8> {
    let mut key = prefix_key(prefix);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn prefix_key(prefix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 9);
    key.extend_from_slice(prefix.as_bytes());
    key.push(0);
    key
}

fn abort<T>(err: StoreError) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(err))
}

fn unwrap_tx<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(StoreError::Sled(err)),
    }
}

impl RecordStore for SledStore {
    fn insert_contract(&self, contract: &Contract, remark: &str) -> Result<(), StoreError> {
        let entry = TransitionLogEntry {
            contract_id: contract.id.clone(),
            from_status: None,
            to_status: contract.status,
            remark: remark.to_string(),
            at: contract.created_at.clone(),
        };
        let contract_cbor = minicbor::to_vec(contract)?;
        let entry_cbor = minicbor::to_vec(&entry)?;

        let result = (&self.contracts, &self.transitions).transaction(|(contracts, log)| {
            if contracts.get(contract.id.as_bytes())?.is_some() {
                return abort(StoreError::ContractExists(contract.id.clone()));
            }
            contracts.insert(contract.id.as_bytes(), contract_cbor.clone())?;
            let seq = log.generate_id()?;
            log.insert(seq_key(&contract.id, seq), entry_cbor.clone())?;
            Ok(())
        });
        unwrap_tx(result)
    }

    fn contract(&self, contract_id: &str) -> Result<Option<Contract>, StoreError> {
        match self.contracts.get(contract_id.as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn contract_by_flow(&self, flow_id: &str) -> Result<Option<Contract>, StoreError> {
        match self.flow_index.get(flow_id.as_bytes())? {
            Some(contract_id) => self.contract(&String::from_utf8_lossy(&contract_id)),
            None => Ok(None),
        }
    }

    fn contracts_in(&self, statuses: &[ContractStatus]) -> Result<Vec<Contract>, StoreError> {
        let mut found = Vec::new();
        for item in self.contracts.iter() {
            let (_, raw) = item?;
            let contract: Contract = minicbor::decode(&raw)?;
            if statuses.contains(&contract.status) {
                found.push(contract);
            }
        }
        Ok(found)
    }

    fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(Contract, TransitionLogEntry), StoreError> {
        let result = (&self.contracts, &self.flow_index, &self.transitions).transaction(
            |(contracts, flows, log)| {
                let Some(raw) = contracts.get(commit.contract_id.as_bytes())? else {
                    return abort(StoreError::ContractNotFound(commit.contract_id.clone()));
                };
                let mut contract: Contract = match minicbor::decode(&raw) {
                    Ok(contract) => contract,
                    Err(err) => return abort(err.into()),
                };

                if contract.status != commit.from {
                    return abort(StoreError::StaleStatus {
                        contract_id: commit.contract_id.clone(),
                        expected: commit.from,
                        actual: contract.status,
                    });
                }

                if let Some(flow_id) = &commit.flow_id {
                    match contract.flow_id.clone() {
                        Some(existing) if &existing != flow_id => {
                            return abort(StoreError::FlowAlreadyAssigned {
                                contract_id: contract.id.clone(),
                                existing,
                            });
                        }
                        Some(_) => {}
                        None => {
                            if let Some(owner) = flows.get(flow_id.as_bytes())? {
                                return abort(StoreError::FlowInUse {
                                    flow_id: flow_id.clone(),
                                    contract_id: String::from_utf8_lossy(&owner).into_owned(),
                                });
                            }
                            flows.insert(flow_id.as_bytes(), contract.id.as_bytes())?;
                            contract.flow_id = Some(flow_id.clone());
                        }
                    }
                }

                let at = TimeStamp::new();
                contract.status = commit.to;
                contract.updated_at = at.clone();
                let entry = TransitionLogEntry {
                    contract_id: contract.id.clone(),
                    from_status: Some(commit.from),
                    to_status: commit.to,
                    remark: commit.remark.clone(),
                    at,
                };

                let (contract_cbor, entry_cbor) =
                    match (minicbor::to_vec(&contract), minicbor::to_vec(&entry)) {
                        (Ok(c), Ok(e)) => (c, e),
                        (Err(err), _) | (_, Err(err)) => return abort(err.into()),
                    };

                contracts.insert(contract.id.as_bytes(), contract_cbor)?;
                let seq = log.generate_id()?;
                log.insert(seq_key(&contract.id, seq), entry_cbor)?;

                Ok((contract, entry))
            },
        );
        unwrap_tx(result)
    }

    fn transitions(&self, contract_id: &str) -> Result<Vec<TransitionLogEntry>, StoreError> {
        self.transitions
            .scan_prefix(prefix_key(contract_id))
            .map(|item| -> Result<TransitionLogEntry, StoreError> {
                let (_, raw) = item?;
                Ok(minicbor::decode(&raw)?)
            })
            .collect()
    }

    fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let flow = record.flow_id.as_deref().unwrap_or(NO_FLOW);
        let seq = self.db.generate_id()?;
        self.audit
            .insert(seq_key(flow, seq), minicbor::to_vec(record)?)?;
        Ok(())
    }

    fn audits_for_flow(&self, flow_id: Option<&str>) -> Result<Vec<AuditRecord>, StoreError> {
        self.audit
            .scan_prefix(prefix_key(flow_id.unwrap_or(NO_FLOW)))
            .map(|item| -> Result<AuditRecord, StoreError> {
                let (_, raw) = item?;
                Ok(minicbor::decode(&raw)?)
            })
            .collect()
    }
}
