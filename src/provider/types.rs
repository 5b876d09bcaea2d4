//! Request and response bodies for the provider actions we call
use crate::signal::ApproverState;
use serde::{Deserialize, Serialize};

pub const ACTION_CREATE_FLOW: &str = "CreateFlow";
pub const ACTION_CREATE_DOCUMENT: &str = "CreateDocument";
pub const ACTION_START_FLOW: &str = "StartFlow";
pub const ACTION_DESCRIBE_FLOW_INFO: &str = "DescribeFlowInfo";
pub const ACTION_DESCRIBE_FILE_URLS: &str = "DescribeFileUrls";
pub const ACTION_CANCEL_FLOW: &str = "CancelFlow";

// approver types understood by CreateFlow
pub const APPROVER_ORGANIZATION: i64 = 0;
pub const APPROVER_PERSON: i64 = 1;
pub const APPROVER_AUTO_SIGN: i64 = 3;

/// What the caller supplies to start signing a drafted contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowTemplate {
    pub template_id: String,
    pub organization_name: String,
    /// Party A signs automatically through the enterprise seal.
    #[serde(default)]
    pub party_a_auto_sign: bool,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
    /// Unix seconds after which the flow expires.
    #[serde(default)]
    pub deadline: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FormField {
    pub component_name: String,
    pub component_value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowCreateApprover {
    pub approver_type: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_id_card_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFlowRequest {
    pub operator: UserInfo,
    pub flow_name: String,
    pub approvers: Vec<FlowCreateApprover>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFlowResponse {
    pub flow_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDocumentRequest {
    pub operator: UserInfo,
    pub flow_id: String,
    pub template_id: String,
    pub file_names: Vec<String>,
    pub form_fields: Vec<FormField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDocumentResponse {
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartFlowRequest {
    pub operator: UserInfo,
    pub flow_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartFlowResponse {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeFlowInfoRequest {
    pub operator: UserInfo,
    pub flow_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeFlowInfoResponse {
    #[serde(default)]
    pub flow_detail_infos: Vec<FlowDetailInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowDetailInfo {
    pub flow_id: String,
    pub flow_status: i64,
    #[serde(default)]
    pub flow_message: Option<String>,
    #[serde(default)]
    pub flow_approver_infos: Vec<ApproverState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeFileUrlsRequest {
    pub operator: UserInfo,
    pub business_type: &'static str,
    pub business_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeFileUrlsResponse {
    #[serde(default)]
    pub file_urls: Vec<FileUrl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancelFlowRequest {
    pub operator: UserInfo,
    pub flow_id: String,
    pub cancel_message: String,
}

/// Responses that carry nothing but the request id.
#[derive(Debug, Deserialize)]
pub struct Empty {}
