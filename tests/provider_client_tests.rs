mod common;

use common::*;
use esign_sync::error::{ProviderError, TransportError};
use esign_sync::signer::ALGORITHM;
use serde_json::json;

#[tokio::test]
async fn transient_code_is_retried() -> anyhow::Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_api_error("InternalError.DbConnection");
    transport.push(Err(TransportError::Timeout));
    transport.push_ok(flow_info("flow-1", 4, approvers(3, 3)));

    let signal = client(transport.clone()).describe_flow("flow-1").await?;

    assert_eq!(signal.flow_status, 4);
    assert_eq!(transport.actions().len(), 3);

    Ok(())
}

#[tokio::test]
async fn each_attempt_is_signed_afresh() -> anyhow::Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(Err(TransportError::Status {
        status: 503,
        body: "unavailable".into(),
    }));
    transport.push_ok(json!({"FlowId": "flow-2"}));

    client(transport.clone())
        .create_flow("Lease", &new_contract("Lease").party_b, &template())
        .await?;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let auth = request.authorization().unwrap_or_default();
        assert!(auth.starts_with(ALGORITHM));
        assert!(auth.contains("Credential=AKIDtest/"));
        assert_eq!(request.header("X-TC-Action"), Some("CreateFlow"));
    }
    // retries resend the identical body
    assert_eq!(requests[0].body, requests[1].body);

    Ok(())
}

#[tokio::test]
async fn non_retryable_code_fails_immediately() {
    let transport = ScriptedTransport::new();
    transport.push_api_error("AuthFailure.SignatureFailure");
    transport.push_ok(flow_info("flow-3", 4, approvers(3, 3)));

    let err = client(transport.clone())
        .describe_flow("flow-3")
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { code, .. } => assert_eq!(code, "AuthFailure.SignatureFailure"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.actions().len(), 1);
    assert_eq!(transport.remaining(), 1);
}

#[tokio::test]
async fn retries_stop_at_the_ceiling() {
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.push_api_error("InternalError.System");
    }

    let err = client(transport.clone())
        .describe_flow("flow-4")
        .await
        .unwrap_err();

    match err {
        ProviderError::RetriesExhausted {
            action,
            attempts,
            last,
        } => {
            assert_eq!(action, "DescribeFlowInfo");
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ProviderError::Api { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.actions().len(), 3);
}

#[tokio::test]
async fn client_error_status_is_not_retried() {
    let transport = ScriptedTransport::new();
    transport.push(Err(TransportError::Status {
        status: 400,
        body: "bad request".into(),
    }));

    let err = client(transport.clone())
        .cancel_flow("flow-5", "withdrawn")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Transport(TransportError::Status { status: 400, .. })
    ));
    assert_eq!(transport.actions(), vec!["CancelFlow"]);
}

#[tokio::test]
async fn initiate_runs_three_actions_in_order() -> anyhow::Result<()> {
    let transport = ScriptedTransport::new();
    script_initiate(&transport, "flow-6");

    let flow_id = client(transport.clone())
        .initiate_flow("Lease", &new_contract("Lease").party_b, &template())
        .await?;

    assert_eq!(flow_id, "flow-6");
    assert_eq!(
        transport.actions(),
        vec!["CreateFlow", "CreateDocument", "StartFlow"]
    );

    let create: serde_json::Value = serde_json::from_str(&transport.requests()[0].body)?;
    assert_eq!(create["Operator"]["UserId"], "operator-1");
    assert_eq!(create["Approvers"][0]["ApproverType"], 1);
    assert_eq!(create["Approvers"][0]["ApproverMobile"], "13800000000");
    assert_eq!(create["Approvers"][1]["ApproverType"], 0);

    Ok(())
}

#[tokio::test]
async fn failed_setup_cancels_the_new_flow() {
    let transport = ScriptedTransport::new();
    transport.push_ok(json!({"FlowId": "flow-8"}));
    transport.push_api_error("InvalidParameter.TemplateId");
    transport.push_ok(json!({}));

    let err = client(transport.clone())
        .initiate_flow("Lease", &new_contract("Lease").party_b, &template())
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { code, .. } => assert_eq!(code, "InvalidParameter.TemplateId"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        transport.actions(),
        vec!["CreateFlow", "CreateDocument", "CancelFlow"]
    );
    let cancel: serde_json::Value = serde_json::from_str(&transport.requests()[2].body).unwrap();
    assert_eq!(cancel["FlowId"], "flow-8");
}

#[tokio::test]
async fn failed_start_still_reports_the_start_error_when_cancel_fails() {
    let transport = ScriptedTransport::new();
    transport.push_ok(json!({"FlowId": "flow-9"}));
    transport.push_ok(json!({"DocumentId": "doc-9"}));
    transport.push_api_error("OperationDenied.FlowStatusForbid");
    transport.push_api_error("OperationDenied.FlowStatusForbid");

    let err = client(transport.clone())
        .initiate_flow("Lease", &new_contract("Lease").party_b, &template())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Api { .. }));
    assert_eq!(
        transport.actions(),
        vec!["CreateFlow", "CreateDocument", "StartFlow", "CancelFlow"]
    );
}

#[tokio::test]
async fn calls_are_spaced_by_the_rate_limit() -> anyhow::Result<()> {
    let mut config = test_config();
    config.provider.requests_per_second = 2;
    let transport = ScriptedTransport::new();
    let client = esign_sync::provider::ProviderClient::new(&config, transport.clone())?;

    // two calls fit the burst, the other two wait half a second each
    for _ in 0..4 {
        transport.push_ok(json!({}));
    }
    let started = std::time::Instant::now();
    for i in 0..4 {
        client.cancel_flow(&format!("flow-rl-{i}"), "withdrawn").await?;
    }
    let elapsed = started.elapsed();

    assert_eq!(transport.actions().len(), 4);
    assert_eq!(transport.remaining(), 0);
    assert!(
        elapsed >= std::time::Duration::from_millis(900),
        "four calls at 2/s finished in {elapsed:?}"
    );

    Ok(())
}

#[tokio::test]
async fn missing_flow_in_response_is_a_parse_error() {
    let transport = ScriptedTransport::new();
    transport.push_ok(flow_info("someone-else", 4, json!([])));

    let err = client(transport)
        .describe_flow("flow-7")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Parse(_)));
}

#[test]
fn zero_rate_limit_is_rejected() {
    let mut config = test_config();
    config.provider.requests_per_second = 0;

    let result = esign_sync::provider::ProviderClient::new(&config, ScriptedTransport::new());
    assert!(result.is_err());
}
