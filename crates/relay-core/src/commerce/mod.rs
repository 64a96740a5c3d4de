pub mod client;
pub mod types;

pub use client::{CommerceClient, CommerceError};
pub use types::{
    ApprovalFlow, Associate, BusinessUnit, Customer, KeyReference, MessageSubscription, Order,
    PagedQueryResponse, PendingApprover, PubSubDestination, Reference, State, Subscription,
    SubscriptionDraft,
};
