//! Build-time metadata.

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
