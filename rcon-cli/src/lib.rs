//! # rcon-cli: command-line RCON client
//!
//! Connects to a Source-engine server, authenticates, and runs console
//! commands given on the command line or read from stdin, printing each
//! response body.

pub mod config;
pub mod runner;
