//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind acceptor → Register services → Build router → Spawn run + accept loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → router.shutdown() → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when the router exists)
//! - Ordered shutdown: stop accept, close router, drain
//! - Shutdown has timeout: the serve task is aborted after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{Service, StartupError};
