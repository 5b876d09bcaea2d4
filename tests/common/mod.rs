//! Shared fixtures: a scripted provider transport and a sled-backed service.
#![allow(dead_code)]

use async_trait::async_trait;
use esign_sync::config::AppConfig;
use esign_sync::contract::{NewContract, PartyB};
use esign_sync::error::TransportError;
use esign_sync::provider::{FlowTemplate, ProviderClient, Transport};
use esign_sync::service::ContractService;
use esign_sync::signer::SignedRequest;
use esign_sync::store::SledStore;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<String, TransportError>>>,
    seen: Mutex<Vec<SignedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: Result<String, TransportError>) {
        self.responses.lock().push_back(response);
    }

    pub fn push_ok(&self, body: serde_json::Value) {
        self.push(Ok(ok_response(body)));
    }

    pub fn push_api_error(&self, code: &str) {
        self.push(Ok(error_response(code)));
    }

    /// Action names of the requests sent so far.
    pub fn actions(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|r| r.header("X-TC-Action").map(str::to_string))
            .collect()
    }

    pub fn requests(&self) -> Vec<SignedRequest> {
        self.seen.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &SignedRequest) -> Result<String, TransportError> {
        self.seen.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response left".into())))
    }
}

pub fn ok_response(mut body: serde_json::Value) -> String {
    if let Some(map) = body.as_object_mut() {
        map.insert("RequestId".into(), json!("req-test"));
    }
    json!({ "Response": body }).to_string()
}

pub fn error_response(code: &str) -> String {
    json!({
        "Response": {
            "Error": {"Code": code, "Message": format!("{code} from test")},
            "RequestId": "req-test"
        }
    })
    .to_string()
}

pub fn flow_info(flow_id: &str, status: i64, approvers: serde_json::Value) -> serde_json::Value {
    json!({
        "FlowDetailInfos": [{
            "FlowId": flow_id,
            "FlowStatus": status,
            "FlowApproverInfos": approvers,
        }]
    })
}

/// Party B (person) first, Party A (organization) second.
pub fn approvers(person_status: i64, organization_status: i64) -> serde_json::Value {
    json!([
        {"ApproveType": "PERSON", "ApproveStatus": person_status, "ApproveName": "Li Wei"},
        {"ApproveType": "ORGANIZATION", "ApproveStatus": organization_status},
    ])
}

/// A complete config with millisecond backoff so retry tests stay fast.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.signing.secret_id = "AKIDtest".into();
    config.signing.secret_key = "test-secret".into();
    config.callback.key = "callback-key".into();
    config.provider.operator_id = "operator-1".into();
    config.provider.requests_per_second = 1_000;
    config.provider.timeout_ms = 500;
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config
}

pub fn client(transport: Arc<ScriptedTransport>) -> ProviderClient {
    ProviderClient::new(&test_config(), transport).unwrap()
}

pub struct Harness {
    // keeps the sled directory alive for the test
    pub dir: TempDir,
    pub transport: Arc<ScriptedTransport>,
    pub service: Arc<ContractService>,
}

pub fn harness() -> anyhow::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let store = SledStore::open(dir.path().join("esign.db"))?;
    let transport = ScriptedTransport::new();
    let provider = client(transport.clone());
    let service = Arc::new(ContractService::new(Arc::new(store), Arc::new(provider)));

    Ok(Harness {
        dir,
        transport,
        service,
    })
}

pub fn new_contract(title: &str) -> NewContract {
    NewContract {
        title: title.to_string(),
        party_b: PartyB {
            name: "Li Wei".into(),
            mobile: "13800000000".into(),
            id_number: None,
        },
    }
}

pub fn template() -> FlowTemplate {
    FlowTemplate {
        template_id: "tpl-1".into(),
        organization_name: "Acme Leasing Ltd".into(),
        ..Default::default()
    }
}

/// Script the three calls `start_signing` makes.
pub fn script_initiate(transport: &ScriptedTransport, flow_id: &str) {
    transport.push_ok(json!({"FlowId": flow_id}));
    transport.push_ok(json!({"DocumentId": "doc-1"}));
    transport.push_ok(json!({"Status": "START"}));
}
