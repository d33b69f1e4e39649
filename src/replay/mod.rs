//! The binary replay-log format for captured TCP chunks.
//!
//! A replay log is a plain concatenation of records with no inter-record
//! delimiter; the payload length is explicit, so none is needed:
//!
//! ```text
//! record := timestamp(8B, big-endian u64 nanoseconds since epoch)
//!           client_token(ASCII ip:port, terminated by 0x20)
//!           server_token(ASCII ip:port, terminated by 0x20)
//!           length(4B, big-endian u32)
//!           payload(length bytes)
//! ```
//!
//! End of stream is only valid exactly at a record boundary; any other
//! truncation is reported as [`CaptureError::UnexpectedEnd`].
//!
//! [`CaptureError::UnexpectedEnd`]: crate::error::CaptureError::UnexpectedEnd

mod record;
mod stream;

pub use record::CapturedRecord;
pub use stream::{ReplayLogStream, ReplayLogWriter};
