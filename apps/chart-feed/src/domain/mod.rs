//! Domain Layer - Core chart data types and rules.
//!
//! This layer contains the core domain types for chart data with no I/O.
//! All types here are pure Rust with serialization support.

/// Quotes, wire shapes and the quote formatter.
pub mod streaming;

/// Subscription keys, granularity and the subscription registry.
pub mod subscription;

/// Fixed range window, trimming and gap splicing.
pub mod window;
