//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Relay core (origin recorded) → Background tasks → Listener
//!
//! Background tasks:
//!     origin.rs        refresh the origin's last-seen time
//!     housekeeping.rs  sweep abandoned waiting and acknowledge states
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → cancel token → stop accepting → unregister connectors → origin shutdown recorded
//! ```
//!
//! # Design Decisions
//! - One cancellation token is shared by every long-running task
//! - Background loops tick on an interval and exit on cancellation

pub mod housekeeping;
pub mod origin;
pub mod shutdown;
pub mod signals;

pub use housekeeping::Housekeeping;
pub use origin::OriginHeartbeat;
pub use shutdown::Shutdown;
