//! Signed calls to the e-signature provider.
//!
//! Each attempt is signed with the current timestamp and the exact body that
//! goes on the wire. Transient failures (the enumerated `InternalError`
//! codes, timeouts, connection errors, gateway 5xx) are retried with capped
//! exponential backoff; everything else is returned on the first attempt.
//! A direct rate limiter makes callers wait for a slot instead of failing.

use super::transport::Transport;
use super::types::*;
use crate::config::{AppConfig, RetryConfig};
use crate::contract::PartyB;
use crate::error::{ConfigError, ProviderError, SignError, TransportError};
use crate::signal::RemoteSignal;
use crate::signer::{ActionRequest, RequestSigner};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provider error codes that indicate a transient server-side fault.
pub const RETRYABLE_CODES: &[&str] = &[
    "InternalError",
    "InternalError.Api",
    "InternalError.Cache",
    "InternalError.Db",
    "InternalError.DbConnection",
    "InternalError.DbRead",
    "InternalError.DbUpdate",
    "InternalError.Dependency",
    "InternalError.System",
    "InternalError.ThirdParty",
    "InternalError.Serialize",
    "InternalError.UnSerialize",
];

pub fn is_retryable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Api { code, .. } => RETRYABLE_CODES.contains(&code.as_str()),
        ProviderError::Transport(err) => err.is_transient(),
        _ => false,
    }
}

pub struct ProviderClient {
    signer: RequestSigner,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryConfig,
    timeout: Duration,
    version: String,
    region: Option<String>,
    operator: String,
}

impl ProviderClient {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let per_second = NonZeroU32::new(config.provider.requests_per_second).ok_or_else(|| {
            ConfigError::InvalidRateLimit("requests_per_second cannot be 0".into())
        })?;

        Ok(Self {
            signer: RequestSigner::from_config(&config.signing, &config.provider),
            transport,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry: config.retry.clone(),
            timeout: config.provider.timeout(),
            version: config.provider.version.clone(),
            region: config.provider.region.clone(),
            operator: config.provider.operator_id.clone(),
        })
    }

    fn operator(&self) -> UserInfo {
        UserInfo {
            user_id: self.operator.clone(),
        }
    }

    /// Call `action` with `payload`, retrying transient failures.
    pub async fn call<Req, Resp>(&self, action: &str, payload: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_string(payload).map_err(SignError::from)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(action, &body).await {
                Ok(response) => return Ok(response),
                Err(err) if is_retryable(&err) => {
                    if attempt >= max_attempts {
                        warn!(action, attempt, error = %err, "provider retries exhausted");
                        return Err(ProviderError::RetriesExhausted {
                            action: action.to_string(),
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(action, attempt, ?delay, error = %err, "transient provider failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(action, attempt, error = %err, "provider call failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<Resp: DeserializeOwned>(
        &self,
        action: &str,
        body: &str,
    ) -> Result<Resp, ProviderError> {
        // wait for a slot rather than dropping the call
        self.limiter.until_ready().await;

        let signed = self.signer.sign(ActionRequest {
            action,
            version: &self.version,
            payload: body,
            region: self.region.as_deref(),
            timestamp: None,
        })?;
        debug!(action, host = self.signer.host(), "sending provider request");

        let raw = tokio::time::timeout(self.timeout, self.transport.send(&signed))
            .await
            .map_err(|_| TransportError::Timeout)??;

        parse_response(&raw)
    }

    pub async fn create_flow(
        &self,
        flow_name: &str,
        party_b: &PartyB,
        template: &FlowTemplate,
    ) -> Result<String, ProviderError> {
        let party_a = FlowCreateApprover {
            approver_type: if template.party_a_auto_sign {
                APPROVER_AUTO_SIGN
            } else {
                APPROVER_ORGANIZATION
            },
            organization_name: Some(template.organization_name.clone()),
            approver_name: None,
            approver_mobile: None,
            approver_id_card_number: None,
        };
        let party_b = FlowCreateApprover {
            approver_type: APPROVER_PERSON,
            organization_name: None,
            approver_name: Some(party_b.name.clone()),
            approver_mobile: Some(party_b.mobile.clone()),
            approver_id_card_number: party_b.id_number.clone(),
        };

        let request = CreateFlowRequest {
            operator: self.operator(),
            flow_name: flow_name.to_string(),
            // counterparty signs first, Party A approves last
            approvers: vec![party_b, party_a],
            deadline: template.deadline,
        };
        let response: CreateFlowResponse = self.call(ACTION_CREATE_FLOW, &request).await?;
        Ok(response.flow_id)
    }

    pub async fn create_document(
        &self,
        flow_id: &str,
        flow_name: &str,
        template: &FlowTemplate,
    ) -> Result<String, ProviderError> {
        let request = CreateDocumentRequest {
            operator: self.operator(),
            flow_id: flow_id.to_string(),
            template_id: template.template_id.clone(),
            file_names: vec![format!("{flow_name}.pdf")],
            form_fields: template.form_fields.clone(),
        };
        let response: CreateDocumentResponse = self.call(ACTION_CREATE_DOCUMENT, &request).await?;
        Ok(response.document_id)
    }

    pub async fn start_flow(&self, flow_id: &str) -> Result<String, ProviderError> {
        let request = StartFlowRequest {
            operator: self.operator(),
            flow_id: flow_id.to_string(),
        };
        let response: StartFlowResponse = self.call(ACTION_START_FLOW, &request).await?;
        Ok(response.status)
    }

    /// Create the flow, attach the templated document and start signing.
    pub async fn initiate_flow(
        &self,
        flow_name: &str,
        party_b: &PartyB,
        template: &FlowTemplate,
    ) -> Result<String, ProviderError> {
        let flow_id = self.create_flow(flow_name, party_b, template).await?;
        let started = async {
            let document_id = self.create_document(&flow_id, flow_name, template).await?;
            let status = self.start_flow(&flow_id).await?;
            Ok::<_, ProviderError>((document_id, status))
        }
        .await;

        match started {
            Ok((document_id, status)) => {
                info!(%flow_id, %document_id, %status, "signing flow started");
                Ok(flow_id)
            }
            Err(err) => {
                // the flow exists remotely but can never be signed
                warn!(%flow_id, error = %err, "flow setup failed, cancelling it");
                if let Err(cancel_err) = self.cancel_flow(&flow_id, "flow setup failed").await {
                    warn!(%flow_id, error = %cancel_err, "half-built flow could not be cancelled");
                }
                Err(err)
            }
        }
    }

    pub async fn describe_flow(&self, flow_id: &str) -> Result<RemoteSignal, ProviderError> {
        let request = DescribeFlowInfoRequest {
            operator: self.operator(),
            flow_ids: vec![flow_id.to_string()],
        };
        let response: DescribeFlowInfoResponse =
            self.call(ACTION_DESCRIBE_FLOW_INFO, &request).await?;

        let detail = response
            .flow_detail_infos
            .into_iter()
            .find(|info| info.flow_id == flow_id)
            .ok_or_else(|| ProviderError::Parse(format!("flow {flow_id} missing from response")))?;

        Ok(RemoteSignal {
            flow_id: detail.flow_id,
            flow_status: detail.flow_status,
            message: detail.flow_message,
            approvers: detail.flow_approver_infos,
        })
    }

    pub async fn document_urls(&self, flow_id: &str) -> Result<Vec<String>, ProviderError> {
        let request = DescribeFileUrlsRequest {
            operator: self.operator(),
            business_type: "FLOW",
            business_ids: vec![flow_id.to_string()],
        };
        let response: DescribeFileUrlsResponse =
            self.call(ACTION_DESCRIBE_FILE_URLS, &request).await?;
        Ok(response.file_urls.into_iter().map(|f| f.url).collect())
    }

    pub async fn cancel_flow(&self, flow_id: &str, reason: &str) -> Result<(), ProviderError> {
        let request = CancelFlowRequest {
            operator: self.operator(),
            flow_id: flow_id.to_string(),
            cancel_message: reason.to_string(),
        };
        let _: Empty = self.call(ACTION_CANCEL_FLOW, &request).await?;
        Ok(())
    }
}

/// Unwrap the `{"Response": {...}}` envelope, surfacing provider errors.
pub fn parse_response<Resp: DeserializeOwned>(raw: &str) -> Result<Resp, ProviderError> {
    #[derive(serde::Deserialize)]
    struct Envelope {
        #[serde(rename = "Response")]
        response: serde_json::Value,
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct ErrorBody {
        code: String,
        #[serde(default)]
        message: String,
    }

    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if let Some(error) = envelope.response.get("Error") {
        let request_id = envelope
            .response
            .get("RequestId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let error: ErrorBody = serde_json::from_value(error.clone())
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        return Err(ProviderError::Api {
            code: error.code,
            message: error.message,
            request_id,
        });
    }

    serde_json::from_value(envelope.response).map_err(|e| ProviderError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_envelope() {
        let raw = r#"{"Response":{"FlowId":"flow-1","RequestId":"req-1"}}"#;
        let response: CreateFlowResponse = parse_response(raw).unwrap();
        assert_eq!(response.flow_id, "flow-1");
    }

    #[test]
    fn parses_error_envelope() {
        let raw = r#"{"Response":{"Error":{"Code":"ResourceNotFound.Flow","Message":"flow not found"},"RequestId":"req-2"}}"#;
        let err = parse_response::<CreateFlowResponse>(raw).unwrap_err();

        match &err {
            ProviderError::Api {
                code, request_id, ..
            } => {
                assert_eq!(code, "ResourceNotFound.Flow");
                assert_eq!(request_id, "req-2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!is_retryable(&err));
    }

    #[test]
    fn internal_errors_are_retryable() {
        let err = ProviderError::Api {
            code: "InternalError.System".into(),
            message: String::new(),
            request_id: String::new(),
        };
        assert!(is_retryable(&err));
        assert!(is_retryable(&ProviderError::Transport(TransportError::Timeout)));
        assert!(!is_retryable(&ProviderError::Transport(
            TransportError::Status {
                status: 400,
                body: String::new()
            }
        )));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_response::<Empty>("<html>"),
            Err(ProviderError::Parse(_))
        ));
    }
}
