//! # relay-core
//!
//! Foundation types shared by every relay crate:
//!
//! - **Frames**: [`frame::EventFrame`] (inbound) and [`frame::OutboundFrame`] (outbound),
//!   plus the reserved control types (`connected`, `ping`, `pong`)
//! - **Errors**: [`errors::TransportError`], [`errors::FrameError`],
//!   [`errors::RequestError`] via `thiserror`
//! - **Backoff**: [`backoff::ReconnectPolicy`] and the `base * 1.5^n` delay math
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod backoff;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod logging;
