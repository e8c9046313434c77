//! Shared tracing setup for the sentinel binaries.

mod subscriber;

pub use subscriber::init_tracing;
