#![warn(
    clippy::all,
    clippy::cargo,
    clippy::perf,
    clippy::style,
    clippy::correctness,
    clippy::suspicious
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

//! Codecs for captured PostgreSQL client traffic.
//!
//! This crate provides the two precision-sensitive halves of a capturing
//! reverse proxy for PostgreSQL:
//!
//! - The **replay log** codec ([`replay`]): a binary framing of captured TCP
//!   chunks together with a timestamp and the client/server socket addresses,
//!   readable back as a forward-only stream of [`CapturedRecord`]s.
//! - The **frontend message classifier** ([`protocol`]): turns one captured
//!   chunk into a typed [`FrontendMessage`], including the untagged
//!   pre-handshake requests (startup, cancel, SSL and GSS negotiation).
//!
//! The proxy itself (accepting connections, shuttling bytes, fanning captured
//! chunks out to a sink) is a separate concern; it calls these codecs
//! synchronously per connection and treats a classification failure as a
//! per-connection event, not a process-level one.

pub mod addr;
pub mod error;
pub mod protocol;
pub mod replay;

pub use addr::Addr;
pub use error::{CaptureError, Result};
pub use protocol::{FrontendMessage, classify_chunk};
pub use replay::{CapturedRecord, ReplayLogStream, ReplayLogWriter};
