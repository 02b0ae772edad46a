//! Core value types shared across the crate.

/// Session configuration and builder.
pub mod config;
/// ISO-8601 basic timestamps as used on the wire.
pub mod datetime;
/// Per-device firmware quirk flags.
pub mod quirks;

pub use config::{CaptureTarget, PtpConfig, PtpConfigBuilder};
pub use datetime::PtpDateTime;
pub use quirks::{Quirk, QuirkSet};
