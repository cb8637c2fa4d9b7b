//! Tenant-addressed request consumption.
//!
//! # Data Flow
//! ```text
//! Connector registered
//!     → TenantHandlerFactory::create(tenant, connection)
//!     → handler.subscribe(deliver to the registration)
//!     → handler.start()   (begin consuming "Requests <tenant>")
//!
//! Acknowledge confirmed
//!     → TenantHandlerRegistry::acknowledge(connection, token)
//!     → handler.acknowledge(token)
//! ```

pub mod handler;
pub mod lookup;
pub mod registry;

pub use handler::{ReceivedRequest, TenantHandler, TenantHandlerFactory};
pub use lookup::{ConfiguredTenants, TenantLookup, TenantSettings};
pub use registry::{TenantBinding, TenantHandlerRegistry};
