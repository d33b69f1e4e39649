//! PostgreSQL frontend (client-to-server) wire protocol.
//!
//! This module provides:
//! - The closed set of typed frontend messages and their decode/encode
//!   routines ([`messages`])
//! - The chunk classifier that turns one captured chunk into a typed
//!   message ([`classify`])
//!
//! # Wire Protocol Overview
//!
//! Most frontend messages consist of:
//! - 1 byte: message type tag
//! - 4 bytes: message length (including these 4 bytes)
//! - N bytes: message payload
//!
//! Exception: the pre-handshake requests (startup, cancel, SSL negotiation,
//! GSS encryption negotiation) omit the type tag and are recognized by
//! fixed magic sequences or the protocol-version marker instead.

pub mod classify;
pub mod messages;

pub use classify::classify_chunk;
pub use messages::{FrontendMessage, PreparedTarget};

/// Protocol version 3.0, the only startup version this crate understands.
pub const PROTOCOL_VERSION_3_0: u32 = 196_608; // 0x0003_0000

/// Request code carried by an untagged cancel request.
pub const CANCEL_REQUEST_CODE: u32 = 80_877_102;

/// Request code carried by an untagged SSL negotiation request.
pub const SSL_REQUEST_CODE: u32 = 80_877_103;

/// Request code carried by an untagged GSS encryption negotiation request.
pub const GSSENC_REQUEST_CODE: u32 = 80_877_104;
