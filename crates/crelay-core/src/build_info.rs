//! Build-time metadata embedded by the build script.
//!
//! Shown by `crelay --version`, in the `Server` response header, the web
//! page footer and the daemon start log.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("CRELAY_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("CRELAY_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("CRELAY_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version line including git hash and profile, e.g. `"0.14.0 (abc1234, debug)"`.
pub const VERSION_LINE: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CRELAY_GIT_HASH"),
    ", ",
    env!("CRELAY_BUILD_PROFILE"),
    ")"
);

/// Value of the HTTP `Server` header.
pub const SERVER_NAME: &str = concat!("crelay/", env!("CARGO_PKG_VERSION"));

/// Return a formatted version string including git hash and profile.
pub fn version_string() -> String {
    VERSION_LINE.to_string()
}
