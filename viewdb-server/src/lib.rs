//! # viewdb-server
//!
//! TCP server for viewdb.
//!
//! This crate provides:
//! - The per-connection session loop: command decode, dispatch, response
//! - The handle registry tracking transactions, buckets, and cursors
//! - A TCP listener spawning one session task per accepted connection
//! - Server configuration with YAML file and environment overrides

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{Config, NetworkConfig};
pub use error::ServerError;
pub use registry::HandleRegistry;
pub use server::{serve_connection, Server, ServerConfig, ServerStats};
pub use session::Session;
