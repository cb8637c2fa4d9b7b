//! Outbound dispatch of requests, responses and acknowledgements.
//!
//! # Data Flow
//! ```text
//! HTTP boundary → RequestCoordinator → body store (if large) → TenantTransport
//!
//! Connector response → ResponseDispatcher
//!     origin == local && shortcut → ResponseCoordinator
//!     otherwise                   → ServerTransport → origin's ResponseCoordinator
//!
//! Connector acknowledge → AcknowledgeDispatcher
//!     origin == local && shortcut → AcknowledgeCoordinator
//!     otherwise                   → ServerTransport → origin's AcknowledgeCoordinator
//! ```
//!
//! # Design Decisions
//! - The shortcut and the transport path end in the same coordinator call
//! - Dispatchers own the subscription that feeds transport messages to coordinators

pub mod acknowledge;
pub mod request;
pub mod response;

pub use acknowledge::AcknowledgeDispatcher;
pub use request::RequestCoordinator;
pub use response::ResponseDispatcher;
