//! HTTP front-end: plain-text `/gpio` API and the HTML control page.

pub mod page;
pub mod server;

pub use server::{API_PATH, AppState, error_status, router, serve};
