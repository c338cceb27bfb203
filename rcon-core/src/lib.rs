//! # rcon-core
//!
//! Client library for the Source RCON protocol.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `FrameKind`, `Origin` and the wire constants
//! - **Codec**: `RconCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection`, one framed stream with reader/writer tasks
//! - **State**: `ConnectionState` machine and the pending-command table
//! - **Dispatch**: `Dispatcher` correlating responses to commands by id
//! - **Client**: `RconClient`, connect + authenticate + watchdog
//! - **Parser**: `ResponseParser` / `Parseable` hooks for typed responses
//! - **Error**: `RconError`, a `thiserror`-based error hierarchy

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod network;
pub mod notify;
pub mod parser;
pub mod state;
mod watchdog;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::RconClient;
pub use codec::RconCodec;
pub use config::RconConfig;
pub use dispatch::{Dispatcher, PendingCommand};
pub use error::{RconError, Result};
pub use frame::{Frame, FrameKind, HEADER_SIZE, MAX_BODY_SIZE, MAX_FRAME_SIZE, Origin};
pub use network::{CloseReason, Connection, FrameHandler};
pub use notify::{DisconnectNotifier, DisconnectReason};
pub use parser::{Parseable, ResponseParser};
pub use state::{AUTH_FAILED_ID, AUTH_ID, ConnectionState};
