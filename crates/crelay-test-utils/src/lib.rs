#![deny(unsafe_code)]

//! Shared test utilities for the crelay workspace.
//!
//! Provides config builders, fake hardware and tracing helpers so that
//! individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! crelay-test-utils = { workspace = true }
//! ```

pub mod backend;
pub mod config;
pub mod server;
pub mod sysfs;
pub mod tracing_setup;

pub use backend::{BackendCall, RecordingBackend};
pub use config::TestConfigBuilder;
pub use server::TestServer;
pub use sysfs::FakeSysfs;
pub use tracing_setup::init_test_tracing;
