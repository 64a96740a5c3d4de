//! Bodies and subjects for the approver notification emails.

use crate::email::Recipient;

pub const APPROVAL_REQUESTED_SUBJECT: &str = "An order is waiting for your approval";
pub const APPROVAL_PROGRESSED_SUBJECT: &str = "An order still needs your approval";

/// Body for the email sent when a new approval flow is created.
pub fn approval_requested_body(
    recipient: &Recipient,
    order_ref: Option<&str>,
    business_unit_key: &str,
) -> String {
    let order_line = match order_ref {
        Some(order) => format!("Order {order} in business unit {business_unit_key}"),
        None => format!("An order in business unit {business_unit_key}"),
    };
    format!(
        "Dear {name},\n\n\
         {order_line} has entered an approval flow and is waiting for your review.\n\
         Please sign in to your business unit to approve or reject it.\n\n\
         This message was sent automatically; replies are not monitored.",
        name = recipient.name,
    )
}

/// Body for the email sent when a tier was approved but further approvers
/// remain in the current tier.
pub fn approval_progressed_body(
    recipient: &Recipient,
    order_ref: Option<&str>,
    business_unit_key: &str,
) -> String {
    let order_line = match order_ref {
        Some(order) => format!("Order {order} in business unit {business_unit_key}"),
        None => format!("An order in business unit {business_unit_key}"),
    };
    format!(
        "Dear {name},\n\n\
         {order_line} was approved by another associate but still requires your review\n\
         before it can move on.\n\n\
         This message was sent automatically; replies are not monitored.",
        name = recipient.name,
    )
}
