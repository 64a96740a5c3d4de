use std::collections::BTreeSet;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::commerce::{CommerceClient, CommerceError};
use crate::commerce::types::ApprovalFlow;
use crate::config::StatesConfig;
use crate::email::{EmailClient, Recipient};
use crate::error::RelayError;
use crate::notification::Notification;
use crate::templates;

/// Workflow state keys the order is transitioned to, from configuration.
#[derive(Debug, Clone)]
pub struct StateKeys {
    pub need_approval: String,
    pub approved: String,
    pub rejected: String,
}

impl From<&StatesConfig> for StateKeys {
    fn from(config: &StatesConfig) -> Self {
        Self {
            need_approval: config.order_need_approval_state_key.clone(),
            approved: config.order_approved_state_key.clone(),
            rejected: config.order_rejected_state_key.clone(),
        }
    }
}

/// Everything a notification handler needs. Built once at startup; each
/// inbound notification is an independent invocation against it and holds no
/// fetched entity beyond its own run.
pub struct HandlerContext {
    pub commerce: CommerceClient,
    pub email: EmailClient,
    pub states: StateKeys,
}

/// Route a classified notification to its handler.
pub async fn dispatch(ctx: &HandlerContext, notification: Notification) -> Result<(), RelayError> {
    match notification {
        Notification::ResourceCreated => {
            info!("subscription bootstrap message received; skipping");
            Err(RelayError::Skip)
        }
        Notification::ApprovalFlowCreated { approval_flow } => {
            handle_approval_flow_created(ctx, approval_flow).await
        }
        Notification::ApprovalFlowApproved {
            approval_flow_id,
            associate_id,
            order_id,
        } => handle_approval_flow_approved(ctx, &approval_flow_id, &associate_id, &order_id).await,
        Notification::ApprovalFlowRejected {
            approval_flow_id,
            order_id,
        } => handle_approval_flow_finished(ctx, &approval_flow_id, true, order_id).await,
        Notification::ApprovalFlowCompleted {
            approval_flow_id,
            order_id,
        } => handle_approval_flow_finished(ctx, &approval_flow_id, false, order_id).await,
    }
}

/// A new approval flow was created: notify every approver of the current
/// tier, then move the order into the needs-approval state.
pub async fn handle_approval_flow_created(
    ctx: &HandlerContext,
    flow: ApprovalFlow,
) -> Result<(), RelayError> {
    let role_keys: BTreeSet<String> = flow
        .current_tier_pending_approvers
        .iter()
        .map(|approver| approver.associate_role.key.clone())
        .collect();

    if role_keys.is_empty() {
        debug!(flow_id = %flow.id, "approval flow has no pending approvers");
        return Ok(());
    }

    let recipients = approver_recipients(ctx, &flow.business_unit.key, &role_keys).await?;

    // Emails label the order by its human-facing number, falling back to the
    // id; the flow only carries a reference, so resolve the order first.
    let order_label = match &flow.order {
        Some(order_ref) => {
            let order = ctx.commerce.get_order(&order_ref.id).await?;
            Some(order.order_number.unwrap_or_else(|| order_ref.id.clone()))
        }
        None => None,
    };

    ctx.email
        .send_bulk(
            &recipients,
            templates::APPROVAL_REQUESTED_SUBJECT,
            |recipient| {
                templates::approval_requested_body(
                    recipient,
                    order_label.as_deref(),
                    &flow.business_unit.key,
                )
            },
            None,
        )
        .await?;

    match &flow.order {
        Some(order) => transition_order_state(ctx, &order.id, &ctx.states.need_approval).await,
        None => {
            debug!(flow_id = %flow.id, "approval flow references no order; skipping state transition");
            Ok(())
        }
    }
}

/// One tier approver acted: if the current tier still has pending approvers,
/// remind them. Approval of a tier never changes order state by itself; the
/// terminal ApprovalFlowCompleted notification does that.
pub async fn handle_approval_flow_approved(
    ctx: &HandlerContext,
    approval_flow_id: &str,
    associate_id: &str,
    order_id: &str,
) -> Result<(), RelayError> {
    let order = ctx.commerce.get_order(order_id).await?;
    let Some(business_unit) = order.business_unit else {
        debug!(order_id, "order has no business unit; nothing to notify");
        return Ok(());
    };

    let flow = ctx
        .commerce
        .get_approval_flow_in_business_unit(approval_flow_id, associate_id, &business_unit.key)
        .await?;

    let role_keys: BTreeSet<String> = flow
        .current_tier_pending_approvers
        .iter()
        .map(|approver| approver.associate_role.key.clone())
        .collect();

    if role_keys.is_empty() {
        debug!(flow_id = %flow.id, "no approvers remain in the current tier");
        return Ok(());
    }

    let recipients = approver_recipients(ctx, &business_unit.key, &role_keys).await?;
    let order_label = order.order_number.unwrap_or_else(|| order_id.to_string());

    ctx.email
        .send_bulk(
            &recipients,
            templates::APPROVAL_PROGRESSED_SUBJECT,
            |recipient| {
                templates::approval_progressed_body(
                    recipient,
                    Some(order_label.as_str()),
                    &business_unit.key,
                )
            },
            None,
        )
        .await?;

    Ok(())
}

/// The flow reached a terminal state: transition the order to rejected or
/// approved. No customer lookup or email on this path.
pub async fn handle_approval_flow_finished(
    ctx: &HandlerContext,
    approval_flow_id: &str,
    rejected: bool,
    order_id: Option<String>,
) -> Result<(), RelayError> {
    let Some(order_id) = order_id else {
        debug!(
            approval_flow_id,
            rejected, "notification references no order; skipping state transition"
        );
        return Ok(());
    };

    let state_key = if rejected {
        &ctx.states.rejected
    } else {
        &ctx.states.approved
    };
    transition_order_state(ctx, &order_id, state_key).await
}

/// Shared order-state transition primitive.
///
/// Always re-fetches the order for a fresh optimistic-concurrency version.
/// The read-then-transition sequence is not transactional; a concurrent
/// notification for the same order can win the race, which surfaces here as
/// a Conflict.
pub async fn transition_order_state(
    ctx: &HandlerContext,
    order_id: &str,
    state_key: &str,
) -> Result<(), RelayError> {
    let order = ctx
        .commerce
        .get_order(order_id)
        .await
        .map_err(|err| wrap_transition_failure(order_id, state_key, err))?;

    let state = ctx
        .commerce
        .get_state_by_key(state_key)
        .await
        .map_err(|err| wrap_transition_failure(order_id, state_key, err))?
        .ok_or_else(|| {
            RelayError::bad_request(format!(
                "cannot transition order {order_id}: no state with key {state_key}"
            ))
        })?;

    ctx.commerce
        .transition_order_state(order_id, order.version, &state.id)
        .await
        .map_err(|err| {
            if err.status() == Some(StatusCode::CONFLICT) {
                warn!(order_id, state_key, "order was modified concurrently; transition lost");
                RelayError::Conflict {
                    order_id: order_id.to_string(),
                    state_key: state_key.to_string(),
                }
            } else {
                wrap_transition_failure(order_id, state_key, err)
            }
        })?;

    info!(order_id, state_key, "order state transitioned");
    Ok(())
}

fn wrap_transition_failure(order_id: &str, state_key: &str, err: CommerceError) -> RelayError {
    // The cause is preserved in logs only; callers see a uniform message.
    warn!(order_id, state_key, error = %err, "order state transition failed");
    RelayError::bad_request(format!(
        "failed to transition order {order_id} to state {state_key}"
    ))
}

/// Resolve the pending approver role keys of a business unit into email
/// recipients: filter associates by role assignment, then batch-fetch the
/// customer records behind them. Customers without an email address are
/// skipped and logged.
async fn approver_recipients(
    ctx: &HandlerContext,
    business_unit_key: &str,
    role_keys: &BTreeSet<String>,
) -> Result<Vec<Recipient>, RelayError> {
    let business_unit = ctx.commerce.get_business_unit(business_unit_key).await?;

    let customer_ids: BTreeSet<String> = business_unit
        .associates
        .iter()
        .filter(|associate| {
            associate
                .role_assignments
                .iter()
                .any(|assignment| role_keys.contains(&assignment.associate_role.key))
        })
        .map(|associate| associate.customer.id.clone())
        .collect();

    if customer_ids.is_empty() {
        debug!(business_unit_key, "no associates hold a pending approver role");
        return Ok(Vec::new());
    }

    let ids: Vec<String> = customer_ids.into_iter().collect();
    let customers = ctx.commerce.query_customers_by_ids(&ids).await?;

    let mut recipients = Vec::with_capacity(customers.len());
    for customer in customers {
        match customer.email.as_deref().filter(|email| !email.is_empty()) {
            Some(email) => recipients.push(Recipient {
                email: email.to_string(),
                name: customer.display_name(),
            }),
            None => {
                info!(customer_id = %customer.id, "approver has no email address; skipping notification");
            }
        }
    }

    Ok(recipients)
}
