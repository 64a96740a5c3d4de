//! Deploy-time management of the platform push subscription. Not on the
//! request path: run once at deploy/undeploy via the `subscriptions` binary.

use tracing::info;

use crate::commerce::types::{MessageSubscription, PubSubDestination, Subscription, SubscriptionDraft};
use crate::commerce::{CommerceClient, CommerceError};
use crate::notification::{
    TYPE_APPROVAL_FLOW_APPROVED, TYPE_APPROVAL_FLOW_COMPLETED, TYPE_APPROVAL_FLOW_CREATED,
    TYPE_APPROVAL_FLOW_REJECTED,
};

pub const SUBSCRIPTION_KEY: &str = "approval-flow-notifications";
pub const SUBSCRIPTION_RESOURCE_TYPE: &str = "approval-flow";

/// The notification types this adapter handles; the subscription is filtered
/// to exactly these.
pub const SUBSCRIBED_TYPES: [&str; 4] = [
    TYPE_APPROVAL_FLOW_CREATED,
    TYPE_APPROVAL_FLOW_APPROVED,
    TYPE_APPROVAL_FLOW_REJECTED,
    TYPE_APPROVAL_FLOW_COMPLETED,
];

/// Register the push subscription, replacing any existing one with the
/// well-known key. Delete-then-create keeps the operation idempotent.
pub async fn create_approval_flow_subscription(
    client: &CommerceClient,
    gcp_project_id: &str,
    topic: &str,
) -> Result<Subscription, CommerceError> {
    if let Some(existing) = client.get_subscription(SUBSCRIPTION_KEY).await? {
        info!(
            key = SUBSCRIPTION_KEY,
            version = existing.version,
            "replacing existing push subscription"
        );
        client
            .delete_subscription(SUBSCRIPTION_KEY, existing.version)
            .await?;
    }

    let draft = SubscriptionDraft {
        key: SUBSCRIPTION_KEY.to_string(),
        destination: PubSubDestination::new(gcp_project_id, topic),
        messages: vec![MessageSubscription {
            resource_type_id: SUBSCRIPTION_RESOURCE_TYPE.to_string(),
            types: SUBSCRIBED_TYPES.iter().map(|t| t.to_string()).collect(),
        }],
    };

    let created = client.create_subscription(&draft).await?;
    info!(key = SUBSCRIPTION_KEY, id = %created.id, "push subscription created");
    Ok(created)
}

/// Remove the push subscription. A missing subscription is a no-op, so the
/// operation can run repeatedly at undeploy time.
pub async fn delete_approval_flow_subscription(
    client: &CommerceClient,
) -> Result<Option<Subscription>, CommerceError> {
    match client.get_subscription(SUBSCRIPTION_KEY).await? {
        Some(existing) => {
            let deleted = client
                .delete_subscription(SUBSCRIPTION_KEY, existing.version)
                .await?;
            info!(key = SUBSCRIPTION_KEY, "push subscription deleted");
            Ok(Some(deleted))
        }
        None => {
            info!(key = SUBSCRIPTION_KEY, "no push subscription registered; nothing to delete");
            Ok(None)
        }
    }
}
