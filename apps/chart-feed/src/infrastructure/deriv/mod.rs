//! Deriv API Adapter
//!
//! WebSocket implementation of the market data port for a Deriv-style
//! `ticks_history` API.

pub mod client;
pub mod codec;
pub mod heartbeat;

pub use client::{DerivClient, DerivClientConfig, DerivClientError};
pub use codec::CodecError;
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
