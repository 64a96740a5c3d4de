use thiserror::Error;

use crate::commerce::CommerceError;
use crate::email::EmailError;

/// Top-level error for notification processing.
///
/// The status code is informational: the HTTP layer masks every failure as a
/// 200 so the push delivery system never retries. It still matters for logs
/// and for tests that assert which failure population an error belongs to.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{message}")]
    BadRequest { message: String },
    /// Bootstrap subscription-confirmation message; short-circuits processing
    /// without counting as a failure.
    #[error("notification skipped")]
    Skip,
    /// The order was modified concurrently between the version read and the
    /// state transition. Surfaced distinctly so the race stays observable;
    /// never retried here.
    #[error("version conflict transitioning order {order_id} to state {state_key}")]
    Conflict { order_id: String, state_key: String },
    #[error("commerce api error: {0}")]
    Commerce(#[from] CommerceError),
    #[error("email error: {0}")]
    Email(#[from] EmailError),
}

impl RelayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Skip => 202,
            Self::Conflict { .. } => 409,
            Self::Commerce(_) | Self::Email(_) => 500,
        }
    }
}
