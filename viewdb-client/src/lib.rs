//! # viewdb-client
//!
//! Client library for viewdb.
//!
//! This crate provides:
//! - Async TCP connection with version handshake
//! - A transaction/bucket façade mirroring the server's abstractions
//! - A streaming cursor with batched page prefetch
//!
//! A client session sends one request at a time over its connection and is
//! not safe for concurrent use.

pub mod client;
pub mod connection;
pub mod cursor;
pub mod error;

pub use client::{RemoteBucket, RemoteDb, RemoteTx};
pub use connection::{ClientConfig, Connection};
pub use cursor::{RemoteCursor, DEFAULT_PAGE_SIZE};
pub use error::ClientError;
