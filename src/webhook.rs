//! HTTP routes: provider callbacks, manual sync and contract lookup.
//!
//! A callback body is an envelope `{"Timestamp", "Signature", "Payload"}`.
//! The signature covers the exact bytes of `Payload`, so the payload is kept
//! as a raw JSON slice until it has been authenticated.

use crate::callback::CallbackAuthenticator;
use crate::contract::{AuditOutcome, AuditRecord, SignalSource};
use crate::error::{ReconcileError, ServiceError};
use crate::service::ContractService;
use crate::signal::RemoteSignal;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{info, warn};

pub struct WebhookState {
    pub authenticator: CallbackAuthenticator,
    pub service: Arc<ContractService>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallbackEnvelope<'a> {
    timestamp: Option<i64>,
    signature: Option<String>,
    #[serde(borrow)]
    payload: Option<&'a RawValue>,
}

pub fn router(state: Arc<WebhookState>, callback_path: &str) -> Router {
    Router::new()
        .route(callback_path, get(handle_liveness).post(handle_callback))
        .route("/contracts/{id}", get(handle_get_contract))
        .route("/contracts/{id}/sync", post(handle_sync))
        .route("/health", get(handle_liveness))
        .fallback(handle_not_found)
        .with_state(state)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::NoFlow { .. }
        | ServiceError::InvalidState { .. }
        | ServiceError::TransitionRejected { .. } => StatusCode::CONFLICT,
        ServiceError::Provider(_) | ServiceError::NoDocument(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health and GET on the callback path, used by the provider to check the endpoint is up.
async fn handle_liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

impl WebhookState {
    /// Audit a refused callback and answer with `status`. When the audit
    /// cannot be written the answer is a 500 so the provider redelivers.
    fn refuse(
        &self,
        body: &[u8],
        outcome: AuditOutcome,
        detail: &str,
        status: StatusCode,
        message: &str,
    ) -> Response {
        let audited = self.service.reconciler().record(AuditRecord::new(
            SignalSource::Webhook,
            None,
            None,
            String::from_utf8_lossy(body).into_owned(),
            outcome,
            detail,
        ));
        match audited {
            Ok(()) => json_error(status, message),
            Err(_) => json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "callback refusal could not be audited",
            ),
        }
    }
}

/// POST callback
async fn handle_callback(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let envelope: CallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "malformed callback body");
            return state.refuse(
                &body,
                AuditOutcome::Failed,
                "malformed callback body",
                StatusCode::BAD_REQUEST,
                "malformed callback body",
            );
        }
    };

    let (Some(timestamp), Some(signature), Some(payload)) =
        (envelope.timestamp, envelope.signature, envelope.payload)
    else {
        return state.refuse(
            &body,
            AuditOutcome::Failed,
            "missing callback fields",
            StatusCode::BAD_REQUEST,
            "Timestamp, Signature and Payload are required",
        );
    };

    if let Err(err) = state
        .authenticator
        .verify(payload.get().as_bytes(), &signature, timestamp)
    {
        warn!(error = %err, timestamp, "callback refused");
        return state.refuse(
            &body,
            AuditOutcome::Unauthorized,
            &err.to_string(),
            StatusCode::UNAUTHORIZED,
            "callback not authentic",
        );
    }

    let signal: RemoteSignal = match serde_json::from_str(payload.get()) {
        Ok(signal) => signal,
        Err(err) => {
            warn!(error = %err, "callback payload is not a flow signal");
            return state.refuse(
                &body,
                AuditOutcome::Failed,
                &err.to_string(),
                StatusCode::BAD_REQUEST,
                "payload is not a flow status signal",
            );
        }
    };

    match state
        .service
        .reconciler()
        .reconcile_flow(&signal, payload.get(), SignalSource::Webhook)
    {
        Ok((contract_id, outcome)) => {
            let result = match outcome.audit_outcome() {
                AuditOutcome::Updated => "updated",
                AuditOutcome::Rejected => "rejected",
                _ => "noop",
            };
            info!(%contract_id, flow_id = %signal.flow_id, result, "callback handled");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "result": result,
                    "contract_id": contract_id,
                    "message": outcome.message(),
                })),
            )
                .into_response()
        }
        Err(ReconcileError::UnknownFlow(flow_id)) => json_error(
            StatusCode::NOT_FOUND,
            &format!("no contract is bound to flow {flow_id}"),
        ),
        Err(err) => {
            warn!(flow_id = %signal.flow_id, error = %err, "callback could not be applied");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "callback could not be applied")
        }
    }
}

/// POST /contracts/{id}/sync
async fn handle_sync(State(state): State<Arc<WebhookState>>, Path(id): Path<String>) -> Response {
    match state.service.sync_contract(&id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            warn!(contract_id = %id, error = %err, "manual sync failed");
            json_error(service_status(&err), &err.to_string())
        }
    }
}

/// GET /contracts/{id}
async fn handle_get_contract(
    State(state): State<Arc<WebhookState>>,
    Path(id): Path<String>,
) -> Response {
    let found = state
        .service
        .contract(&id)
        .and_then(|contract| Ok((contract, state.service.history(&id)?)));

    match found {
        Ok((contract, history)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "contract": contract,
                "history": history,
            })),
        )
            .into_response(),
        Err(err) => json_error(service_status(&err), &err.to_string()),
    }
}
