//! Runtime orchestration and lifecycle management.
//!
//! - [`Testbed`] - Starts the controller and shuts it down cleanly, releasing every
//!   resource first
//! - [`wait_for_signal`] - SIGINT/SIGTERM handling
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod testbed;
pub mod tracing;

pub use self::testbed::*;
pub use self::tracing::*;
