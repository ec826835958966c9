//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load services file → Build collaborators → Create manager → Watch file
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Notify subscriber tasks → Close manager → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: registry contents first, then manager, then watchers
//! - Closing the manager ends the run loop and every watcher queue

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownListener};
pub use startup::{Agent, StartupError};
