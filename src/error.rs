//! Error types for signing, transport, persistence and reconciliation
use crate::status::ContractStatus;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Signing secret `{0}` is empty or unset")]
    MissingSecret(&'static str),
    #[error("Callback verification key is empty or unset")]
    MissingCallbackKey,
    #[error("Operator id is empty or unset")]
    MissingOperator,
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),
    #[error("Invalid retry policy: {0}")]
    InvalidRetry(String),
    #[error("Invalid bind address `{0}`")]
    InvalidBind(String),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SignError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Timestamp {0} cannot be represented as a UTC date")]
    InvalidTimestamp(i64),
    #[error("Failed to serialize request payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Signing key rejected by HMAC")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
}

/// Reasons a callback is refused. Every variant means "not authentic".
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Callback verification key is not configured")]
    MissingKey,
    #[error("Callback timestamp {claimed} is outside the {window}s freshness window (now {now})")]
    Stale { claimed: i64, now: i64, window: i64 },
    #[error("Callback signature is not valid hex")]
    MalformedSignature,
    #[error("Callback signature does not match")]
    Mismatch,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Request to provider timed out")]
    Timeout,
    #[error("Could not connect to provider: {0}")]
    Connect(String),
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) => true,
            TransportError::Status { status, .. } => matches!(status, 502..=504),
            TransportError::Other(_) => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Provider error {code}: {message} (request {request_id})")]
    Api {
        code: String,
        message: String,
        request_id: String,
    },
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
    #[error("Provider call {action} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        action: String,
        attempts: u32,
        last: Box<ProviderError>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Contract {0} was not found")]
    ContractNotFound(String),
    #[error("Contract {0} already exists")]
    ContractExists(String),
    #[error("Contract {contract_id} moved from {expected} to {actual} before the commit")]
    StaleStatus {
        contract_id: String,
        expected: ContractStatus,
        actual: ContractStatus,
    },
    #[error("Contract {contract_id} is already bound to flow {existing}")]
    FlowAlreadyAssigned {
        contract_id: String,
        existing: String,
    },
    #[error("Flow {flow_id} is already bound to contract {contract_id}")]
    FlowInUse { flow_id: String, contract_id: String },
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for StoreError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        StoreError::Encode(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("No contract is bound to flow {0}")]
    UnknownFlow(String),
    #[error("Failed to serialize the remote signal: {0}")]
    Signal(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Contract {0} was not found")]
    NotFound(String),
    #[error("Contract {contract_id} has no signing flow yet")]
    NoFlow { contract_id: String },
    #[error("Contract {contract_id} is {status}; {action} is not possible")]
    InvalidState {
        contract_id: String,
        status: ContractStatus,
        action: &'static str,
    },
    #[error("Transition {from} -> {to} is not allowed")]
    TransitionRejected {
        from: ContractStatus,
        to: ContractStatus,
    },
    #[error("Provider returned no document for flow {0}")]
    NoDocument(String),
    #[error("Failed to generate contract id: {0}")]
    Identifier(String),
}
