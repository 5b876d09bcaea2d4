//! Contract aggregate, transition log entries and audit records
use crate::status::ContractStatus;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Counterparty details captured when the contract is drafted.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct PartyB {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub mobile: String,
    #[n(2)]
    pub id_number: Option<String>,
}

/// Input for drafting a contract.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub title: String,
    pub party_b: PartyB,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct Contract {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub flow_id: Option<String>, // set once signing starts, never changed afterwards
    #[n(2)]
    pub status: ContractStatus,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub party_b: PartyB,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
}

impl Contract {
    pub fn draft(id: String, new: NewContract) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            flow_id: None,
            status: ContractStatus::Draft,
            title: new.title,
            party_b: new.party_b,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One committed status change. `from_status` is `None` only for creation.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct TransitionLogEntry {
    #[n(0)]
    pub contract_id: String,
    #[n(1)]
    pub from_status: Option<ContractStatus>,
    #[n(2)]
    pub to_status: ContractStatus,
    #[n(3)]
    pub remark: String,
    #[n(4)]
    pub at: TimeStamp<Utc>,
}

/// Where a status signal came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    #[n(0)]
    Webhook,
    #[n(1)]
    ManualSync,
    #[n(2)]
    Poll,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    #[n(0)]
    Updated,
    #[n(1)]
    NoOp,
    #[n(2)]
    Rejected,
    #[n(3)]
    Unauthorized,
    #[n(4)]
    Failed,
}

/// A record of one attempt to apply a remote signal, whatever its result.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
pub struct AuditRecord {
    #[n(0)]
    pub id: String, // uuid7, sorts by creation time
    #[n(1)]
    pub flow_id: Option<String>,
    #[n(2)]
    pub contract_id: Option<String>,
    #[n(3)]
    pub source: SignalSource,
    #[n(4)]
    pub raw_signal: String,
    #[n(5)]
    pub outcome: AuditOutcome,
    #[n(6)]
    pub detail: String,
    #[n(7)]
    pub at: TimeStamp<Utc>,
}

impl AuditRecord {
    pub fn new(
        source: SignalSource,
        flow_id: Option<String>,
        contract_id: Option<String>,
        raw_signal: String,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid7::uuid7().to_string(),
            flow_id,
            contract_id,
            source,
            raw_signal,
            outcome,
            detail: detail.into(),
            at: TimeStamp::new(),
        }
    }
}
