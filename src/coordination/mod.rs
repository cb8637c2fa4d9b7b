//! Request correlation across instances.
//!
//! # Responsibilities
//! - Keep a waiting state per relayed request until its response arrives
//! - Keep an acknowledge state per delivered request until the connector confirms it
//! - Open outsourced response bodies for the waiting caller
//!
//! # Data Flow
//! ```text
//! HTTP call                    ResponseCoordinator::register_request
//!     → request dispatched     ResponseCoordinator::get_response (awaits)
//! Response arrives             ResponseCoordinator::process_response → waiter resumes
//!
//! Request delivered            AcknowledgeCoordinator::register_request
//! Acknowledge arrives          AcknowledgeCoordinator::process_acknowledge
//!     → ConnectorAcknowledger (tenant handler confirms receipt)
//!     → request body removed when asked to
//! ```
//!
//! # Design Decisions
//! - Waiting states are create-or-get so a response may overtake the registration
//! - The coordinator reaches the connector registry through a weak reference
//! - Stale states are swept by housekeeping, never by the hot path

pub mod acknowledge;
pub mod response;

pub use acknowledge::{AcknowledgeCoordinator, AcknowledgeOutcome, ConnectorAcknowledger};
pub use response::{RelayedResponse, ResponseBody, ResponseCoordinator, ResponseWaitGuard};

use thiserror::Error;
use uuid::Uuid;

use crate::body_store::BodyStoreError;
use crate::transport::TransportError;

/// Errors raised while relaying a request and waiting for its outcome.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The caller stopped waiting.
    #[error("waiting for request {0} was cancelled")]
    Cancelled(Uuid),

    /// `get_response` was called without a prior `register_request`.
    #[error("no waiting state registered for request {0}")]
    NotRegistered(Uuid),

    /// The waiting state was removed before a response arrived.
    #[error("waiting state for request {0} was discarded")]
    Discarded(Uuid),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    BodyStore(#[from] BodyStoreError),
}
