//! Transport layer: one framed TCP stream per client.

pub mod connection;

pub use connection::{CloseReason, Connection, FrameHandler};
