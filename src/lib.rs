//! Re-exports the [`volleynet`] library for convenient access to the session
//! protocol types.
pub use volleynet;
