//! The chunk classifier: one captured chunk in, one typed message out.
//!
//! A chunk is assumed to hold exactly one client message; there is no
//! cross-chunk reassembly. Should captured chunks ever span or fragment
//! messages, the untagged fallback below could misread a fragment as a
//! handshake request — a known limit of the capture assumption.

use crate::error::{CaptureError, Result};
use crate::protocol::messages::{self, FrontendMessage};
use crate::protocol::{
    CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, PROTOCOL_VERSION_3_0, SSL_REQUEST_CODE,
};

type DecodeFn = fn(&[u8]) -> Result<FrontendMessage>;

/// The fixed tag registry: maps a message-type byte to its decode routine.
///
/// Extending the message set (e.g. to backend messages) means adding an arm
/// here and a variant to [`FrontendMessage`], both compile-time checked.
fn tagged_decoder(tag: u8) -> Option<DecodeFn> {
    let decoder: DecodeFn = match tag {
        b'B' => messages::decode_bind,
        b'C' => messages::decode_close,
        b'c' => messages::decode_copy_done,
        b'd' => messages::decode_copy_data,
        b'D' => messages::decode_describe,
        b'E' => messages::decode_execute,
        b'f' => messages::decode_copy_fail,
        b'F' => messages::decode_function_call,
        b'H' => messages::decode_flush,
        b'P' => messages::decode_parse,
        b'p' => messages::decode_auth_payload,
        b'Q' => messages::decode_query,
        b'S' => messages::decode_sync,
        b'X' => messages::decode_terminate,
        _ => return None,
    };
    Some(decoder)
}

/// The untagged pre-handshake requests announce themselves with a fixed
/// 8-byte prefix: length 8, then a request code.
const fn request_magic(code: u32) -> [u8; 8] {
    let len = 8u32.to_be_bytes();
    let code = code.to_be_bytes();
    [
        len[0], len[1], len[2], len[3], code[0], code[1], code[2], code[3],
    ]
}

const CANCEL_REQUEST_MAGIC: [u8; 8] = request_magic(CANCEL_REQUEST_CODE);
const SSL_REQUEST_MAGIC: [u8; 8] = request_magic(SSL_REQUEST_CODE);
const GSSENC_REQUEST_MAGIC: [u8; 8] = request_magic(GSSENC_REQUEST_CODE);

/// Classify one captured chunk as a frontend message.
///
/// Tagged messages are tried first: a byte that is not a registered tag can
/// only legally open an untagged pre-handshake request, so the two paths are
/// structurally disjoint. Declared message lengths are taken at face value
/// and not cross-checked against the chunk's actual length.
pub fn classify_chunk(chunk: &[u8]) -> Result<FrontendMessage> {
    if chunk.len() >= 5 {
        if let Some(decode) = tagged_decoder(chunk[0]) {
            return decode(&chunk[5..]);
        }
    }

    if chunk.len() < 8 {
        return Err(CaptureError::MalformedMessage(format!(
            "message must contain at least 8 bytes, has {}",
            chunk.len()
        )));
    }

    if chunk[..8] == CANCEL_REQUEST_MAGIC {
        if chunk.len() < 16 {
            return Err(CaptureError::MalformedMessage(format!(
                "cancel request must contain at least 16 bytes, has {}",
                chunk.len()
            )));
        }
        let process_id = u32::from_be_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]);
        let secret_key = u32::from_be_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]);
        return Ok(FrontendMessage::CancelRequest {
            process_id,
            secret_key,
        });
    }

    if chunk[..8] == SSL_REQUEST_MAGIC {
        return Ok(FrontendMessage::SslRequest);
    }

    if chunk[..8] == GSSENC_REQUEST_MAGIC {
        return Ok(FrontendMessage::GssEncRequest);
    }

    if chunk[4..8] != PROTOCOL_VERSION_3_0.to_be_bytes() {
        return Err(CaptureError::UnexpectedMessage(
            "expected a startup message".into(),
        ));
    }

    messages::decode_startup(&chunk[4..])
}
