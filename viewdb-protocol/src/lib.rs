//! # viewdb-protocol
//!
//! Wire protocol implementation for viewdb (VRP - viewdb Remote Protocol).
//!
//! This crate provides:
//! - The command tag set exchanged between client and server
//! - A self-describing binary codec for the protocol primitives
//!   (u64, byte string, nil)
//! - Pooled encoder/decoder instances to amortize buffer allocation
//! - Protocol error types

pub mod codec;
pub mod command;
pub mod error;

pub use codec::{recycle_decoder, recycle_encoder, take_decoder, take_encoder, Decoder, Encoder};
pub use command::Command;
pub use error::ProtocolError;

/// Protocol version supported by this implementation.
///
/// A connection is only usable when both peers are compiled with the same
/// value; the client checks this during the handshake and fails closed on
/// any difference.
pub const PROTOCOL_VERSION: u64 = 1;

/// Default port for a viewdb server.
pub const DEFAULT_PORT: u16 = 7510;

/// Maximum encoded byte string size (16 MiB).
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;
