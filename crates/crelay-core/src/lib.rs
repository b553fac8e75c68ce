#![deny(unsafe_code)]

//! crelay core runtime.
//!
//! Discovers attached relay cards, switches their channels, and turns
//! command-line or HTTP requests into hardware operations. The CLI and the
//! HTTP daemon both go through the same [`Dispatcher`].

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future. The return type for async trait
/// methods that must stay object-safe (`dyn RelayBackend`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Relay card contract and the compiled-in backends.
pub mod card;
/// Request normalisation for CLI arguments and HTTP parameters.
pub mod command;
/// Get, set and pulse against one resolved card.
pub mod controller;
/// HTTP daemon runtime.
pub mod daemon;
/// Card discovery across backends.
pub mod discovery;
/// Transport-independent request execution.
pub mod dispatch;
/// Request-level error type.
pub mod error;
/// HTTP API and control page.
pub mod http;

pub use card::{CardError, CardType, Channel, RelayBackend, RelayCard, RelayState};
pub use command::{Action, Command, PULSE_CODE};
pub use controller::RelayController;
pub use daemon::{Daemon, DaemonError};
pub use discovery::{Discovery, Resolved};
pub use dispatch::{Dispatcher, Outcome, Snapshot};
pub use error::RelayError;
