//! Connector connection management.
//!
//! # Data Flow
//! ```text
//! Connector socket opens
//!     → ConnectorRegistry::register
//!         → ConnectorTransportFactory creates the socket handle
//!         → TenantHandlerRegistry binds a tenant handler
//!         → indices updated, statistics written
//!
//! Request for tenant (in-process transport)
//!     → ConnectorRegistry::try_deliver_request
//!         → random live registration
//!         → acknowledge state registered (unless Disabled)
//!         → ConnectorTransport::transport_request
//! ```
//!
//! # Design Decisions
//! - Registrations are looked up by connection id and by tenant
//! - Delivery picks uniformly at random among a snapshot of a tenant's registrations
//! - Unregistering removes indices before disposal so no new work is routed

pub mod connection;
pub mod registration;
pub mod registry;

pub use connection::ConnectionId;
pub use registration::ConnectorRegistration;
pub use registry::ConnectorRegistry;
