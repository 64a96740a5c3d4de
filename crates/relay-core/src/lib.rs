pub mod commerce;
pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod notification;
pub mod subscription;
pub mod telemetry;
pub mod templates;

pub use config::Config;
pub use error::RelayError;
pub use handlers::{HandlerContext, StateKeys, dispatch};
pub use notification::{Notification, classify, decode_push_envelope};
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
