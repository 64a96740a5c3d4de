use serde::{Deserialize, Serialize};

/// Reference to a resource by id, as embedded in notifications and entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    #[serde(rename = "typeId", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
}

/// Reference to a resource by its user-defined key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyReference {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingApprover {
    #[serde(rename = "associateRole")]
    pub associate_role: KeyReference,
}

/// Read-only view of an approval flow, fetched per notification and discarded
/// after use. The platform owns the full schema; only consumed fields appear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalFlow {
    pub id: String,
    pub status: Option<String>,
    #[serde(rename = "businessUnit")]
    pub business_unit: KeyReference,
    pub order: Option<Reference>,
    #[serde(rename = "currentTierPendingApprovers", default)]
    pub current_tier_pending_approvers: Vec<PendingApprover>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

impl Customer {
    /// Display name for email greetings; falls back to the address when the
    /// customer has no name on file.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone().unwrap_or_default()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    #[serde(rename = "orderNumber")]
    pub order_number: Option<String>,
    #[serde(rename = "orderState")]
    pub order_state: Option<String>,
    /// Optimistic-concurrency token; must match the server's current value
    /// for a mutation to be accepted.
    pub version: u64,
    #[serde(rename = "businessUnit")]
    pub business_unit: Option<KeyReference>,
}

/// Workflow state machine node, resolved by key before every transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssociateRoleAssignment {
    #[serde(rename = "associateRole")]
    pub associate_role: KeyReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Associate {
    #[serde(rename = "associateRoleAssignments", default)]
    pub role_assignments: Vec<AssociateRoleAssignment>,
    pub customer: Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessUnit {
    pub key: String,
    #[serde(default)]
    pub associates: Vec<Associate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub version: u64,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PubSubDestination {
    #[serde(rename = "type")]
    pub destination_type: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub topic: String,
}

impl PubSubDestination {
    pub fn new(project_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            destination_type: "GoogleCloudPubSub".to_string(),
            project_id: project_id.into(),
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageSubscription {
    #[serde(rename = "resourceTypeId")]
    pub resource_type_id: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubscriptionDraft {
    pub key: String,
    pub destination: PubSubDestination,
    pub messages: Vec<MessageSubscription>,
}

/// Envelope for the platform's paged query endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PagedQueryResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    pub total: Option<u64>,
}
