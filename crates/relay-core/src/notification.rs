use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;
use serde_json::Value;

use crate::commerce::types::{ApprovalFlow, Reference};
use crate::error::RelayError;

pub const TYPE_RESOURCE_CREATED: &str = "ResourceCreated";
pub const TYPE_APPROVAL_FLOW_CREATED: &str = "ApprovalFlowCreated";
pub const TYPE_APPROVAL_FLOW_APPROVED: &str = "ApprovalFlowApproved";
pub const TYPE_APPROVAL_FLOW_REJECTED: &str = "ApprovalFlowRejected";
pub const TYPE_APPROVAL_FLOW_COMPLETED: &str = "ApprovalFlowCompleted";

/// Decode a push envelope (`{ message: { data: base64(JSON) } }`) into the
/// notification payload it carries.
pub fn decode_push_envelope(body: &Value) -> Result<Value, RelayError> {
    let message = body
        .get("message")
        .ok_or_else(|| RelayError::bad_request("request body has no message field"))?;

    let data = message
        .get("data")
        .and_then(Value::as_str)
        .filter(|data| !data.is_empty())
        .ok_or_else(|| RelayError::bad_request("push message has no data"))?;

    let decoded = BASE64_STANDARD.decode(data).map_err(|err| {
        RelayError::bad_request(format!("push message data is not valid base64: {err}"))
    })?;

    if decoded.is_empty() {
        return Err(RelayError::bad_request("push message data is empty"));
    }

    serde_json::from_slice(&decoded).map_err(|err| {
        RelayError::bad_request(format!("decoded push payload is not valid JSON: {err}"))
    })
}

/// One fully validated notification, built once at the boundary.
///
/// Every variant's required fields are checked here so the handlers never
/// touch optional envelope fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Initial subscription-confirmation message; processed as a skip.
    ResourceCreated,
    ApprovalFlowCreated {
        approval_flow: ApprovalFlow,
    },
    ApprovalFlowApproved {
        approval_flow_id: String,
        associate_id: String,
        order_id: String,
    },
    ApprovalFlowRejected {
        approval_flow_id: String,
        order_id: Option<String>,
    },
    ApprovalFlowCompleted {
        approval_flow_id: String,
        order_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: String,
    resource: Option<Reference>,
    #[serde(rename = "approvalFlow")]
    approval_flow: Option<ApprovalFlow>,
    associate: Option<Reference>,
    order: Option<Reference>,
}

fn require_id(reference: Option<Reference>, field: &str, kind: &str) -> Result<String, RelayError> {
    reference
        .map(|r| r.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RelayError::bad_request(format!("{kind} notification has no {field} id")))
}

/// Classify a decoded payload into a typed notification.
pub fn classify(payload: &Value) -> Result<Notification, RelayError> {
    let raw: RawEnvelope = serde_json::from_value(payload.clone()).map_err(|err| {
        RelayError::bad_request(format!("malformed notification envelope: {err}"))
    })?;

    match raw.kind.as_str() {
        TYPE_RESOURCE_CREATED => Ok(Notification::ResourceCreated),
        TYPE_APPROVAL_FLOW_CREATED => {
            let approval_flow = raw.approval_flow.ok_or_else(|| {
                RelayError::bad_request("ApprovalFlowCreated notification has no approvalFlow")
            })?;
            Ok(Notification::ApprovalFlowCreated { approval_flow })
        }
        TYPE_APPROVAL_FLOW_APPROVED => Ok(Notification::ApprovalFlowApproved {
            approval_flow_id: require_id(raw.resource, "resource", TYPE_APPROVAL_FLOW_APPROVED)?,
            associate_id: require_id(raw.associate, "associate", TYPE_APPROVAL_FLOW_APPROVED)?,
            order_id: require_id(raw.order, "order", TYPE_APPROVAL_FLOW_APPROVED)?,
        }),
        TYPE_APPROVAL_FLOW_REJECTED => Ok(Notification::ApprovalFlowRejected {
            approval_flow_id: require_id(raw.resource, "resource", TYPE_APPROVAL_FLOW_REJECTED)?,
            order_id: raw.order.map(|r| r.id),
        }),
        TYPE_APPROVAL_FLOW_COMPLETED => Ok(Notification::ApprovalFlowCompleted {
            approval_flow_id: require_id(raw.resource, "resource", TYPE_APPROVAL_FLOW_COMPLETED)?,
            order_id: raw.order.map(|r| r.id),
        }),
        "" => Err(RelayError::bad_request("notification has no type")),
        other => Err(RelayError::bad_request(format!(
            "unsupported notification type {other}"
        ))),
    }
}
