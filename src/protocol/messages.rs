use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CaptureError, Result};
use crate::protocol::{
    CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, PROTOCOL_VERSION_3_0, SSL_REQUEST_CODE,
};

/// What a Close or Describe message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedTarget {
    /// A prepared statement (`'S'` on the wire).
    Statement,
    /// A portal (`'P'` on the wire).
    Portal,
}

impl PreparedTarget {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'S' => Ok(PreparedTarget::Statement),
            b'P' => Ok(PreparedTarget::Portal),
            other => Err(CaptureError::MalformedMessage(format!(
                "unknown statement/portal selector: 0x{other:02x}"
            ))),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            PreparedTarget::Statement => b'S',
            PreparedTarget::Portal => b'P',
        }
    }
}

/// A message a PostgreSQL client is permitted to send to the server.
///
/// This is a closed set: adding a message kind (e.g. backend messages later)
/// is a compile-time-checked extension of this enum and the tag registry in
/// [`classify`](crate::protocol::classify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    Bind {
        portal: String,
        statement: String,
        param_formats: Vec<i16>,
        /// One entry per parameter; `None` is the wire-level NULL (-1 length).
        params: Vec<Option<Bytes>>,
        result_formats: Vec<i16>,
    },
    Close {
        target: PreparedTarget,
        name: String,
    },
    CopyData {
        data: Bytes,
    },
    CopyDone,
    CopyFail {
        message: String,
    },
    Describe {
        target: PreparedTarget,
        name: String,
    },
    Execute {
        portal: String,
        /// Zero means "no limit".
        max_rows: u32,
    },
    Flush,
    Parse {
        statement: String,
        query: String,
        param_oids: Vec<u32>,
    },
    Query {
        sql: String,
    },
    Sync,
    Terminate,

    /// Untagged handshake request opening a session on protocol 3.0.
    ///
    /// Parameters keep first-insertion order; keys are unique, a repeated
    /// key overwrites the earlier value.
    Startup {
        parameters: Vec<(String, String)>,
    },
    /// Untagged request to cancel an in-flight query on another connection.
    CancelRequest {
        process_id: u32,
        secret_key: u32,
    },
    /// Untagged request to negotiate TLS. Carries no further payload.
    SslRequest,
    /// Untagged request to negotiate GSSAPI encryption. Carries no further payload.
    GssEncRequest,

    /// Stand-in for the four message kinds that share the `'p'` tag and one
    /// wire shape: GSSResponse, PasswordMessage, SASLInitialResponse and
    /// SASLResponse.
    ///
    /// They cannot be told apart from a single chunk; doing so requires the
    /// authentication method the handshake negotiated, which is state a
    /// stateless per-chunk classifier does not have. Callers needing the
    /// distinction must track that state themselves and reinterpret `data`.
    AuthPayload {
        data: Bytes,
    },
}

impl FrontendMessage {
    /// Short name of the message kind, for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Bind { .. } => "Bind",
            FrontendMessage::Close { .. } => "Close",
            FrontendMessage::CopyData { .. } => "CopyData",
            FrontendMessage::CopyDone => "CopyDone",
            FrontendMessage::CopyFail { .. } => "CopyFail",
            FrontendMessage::Describe { .. } => "Describe",
            FrontendMessage::Execute { .. } => "Execute",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::Parse { .. } => "Parse",
            FrontendMessage::Query { .. } => "Query",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Terminate => "Terminate",
            FrontendMessage::Startup { .. } => "Startup",
            FrontendMessage::CancelRequest { .. } => "CancelRequest",
            FrontendMessage::SslRequest => "SslRequest",
            FrontendMessage::GssEncRequest => "GssEncRequest",
            FrontendMessage::AuthPayload { .. } => "AuthPayload",
        }
    }

    /// Returns `true` for the untagged pre-handshake requests.
    #[inline]
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            FrontendMessage::Startup { .. }
                | FrontendMessage::CancelRequest { .. }
                | FrontendMessage::SslRequest
                | FrontendMessage::GssEncRequest
        )
    }

    /// Encode this message in its chunk wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the chunk wire form of this message to `dst`.
    ///
    /// Tagged messages are framed as `tag + u32be(4 + len(body)) + body`;
    /// the untagged requests use their fixed pre-handshake shapes.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            FrontendMessage::Bind {
                portal,
                statement,
                param_formats,
                params,
                result_formats,
            } => frame_tagged(dst, b'B', |b| {
                put_cstr(b, portal);
                put_cstr(b, statement);
                b.put_u16(param_formats.len() as u16);
                for f in param_formats {
                    b.put_i16(*f);
                }
                b.put_u16(params.len() as u16);
                for p in params {
                    match p {
                        None => b.put_i32(-1),
                        Some(v) => {
                            b.put_i32(v.len() as i32);
                            b.extend_from_slice(v);
                        }
                    }
                }
                b.put_u16(result_formats.len() as u16);
                for f in result_formats {
                    b.put_i16(*f);
                }
            }),
            FrontendMessage::Close { target, name } => frame_tagged(dst, b'C', |b| {
                b.put_u8(target.as_byte());
                put_cstr(b, name);
            }),
            FrontendMessage::CopyData { data } => {
                frame_tagged(dst, b'd', |b| b.extend_from_slice(data));
            }
            FrontendMessage::CopyDone => frame_tagged(dst, b'c', |_| {}),
            FrontendMessage::CopyFail { message } => {
                frame_tagged(dst, b'f', |b| put_cstr(b, message));
            }
            FrontendMessage::Describe { target, name } => frame_tagged(dst, b'D', |b| {
                b.put_u8(target.as_byte());
                put_cstr(b, name);
            }),
            FrontendMessage::Execute { portal, max_rows } => frame_tagged(dst, b'E', |b| {
                put_cstr(b, portal);
                b.put_u32(*max_rows);
            }),
            FrontendMessage::Flush => frame_tagged(dst, b'H', |_| {}),
            FrontendMessage::Parse {
                statement,
                query,
                param_oids,
            } => frame_tagged(dst, b'P', |b| {
                put_cstr(b, statement);
                put_cstr(b, query);
                b.put_u16(param_oids.len() as u16);
                for oid in param_oids {
                    b.put_u32(*oid);
                }
            }),
            FrontendMessage::Query { sql } => frame_tagged(dst, b'Q', |b| put_cstr(b, sql)),
            FrontendMessage::Sync => frame_tagged(dst, b'S', |_| {}),
            FrontendMessage::Terminate => frame_tagged(dst, b'X', |_| {}),
            FrontendMessage::AuthPayload { data } => {
                frame_tagged(dst, b'p', |b| b.extend_from_slice(data));
            }

            FrontendMessage::Startup { parameters } => {
                let len_at = dst.len();
                dst.put_u32(0); // length placeholder
                dst.put_u32(PROTOCOL_VERSION_3_0);
                for (k, v) in parameters {
                    put_cstr(dst, k);
                    put_cstr(dst, v);
                }
                dst.put_u8(0); // terminating empty key
                patch_length(dst, len_at);
            }
            FrontendMessage::CancelRequest {
                process_id,
                secret_key,
            } => {
                dst.put_u32(16);
                dst.put_u32(CANCEL_REQUEST_CODE);
                dst.put_u32(*process_id);
                dst.put_u32(*secret_key);
            }
            FrontendMessage::SslRequest => {
                dst.put_u32(8);
                dst.put_u32(SSL_REQUEST_CODE);
            }
            FrontendMessage::GssEncRequest => {
                dst.put_u32(8);
                dst.put_u32(GSSENC_REQUEST_CODE);
            }
        }
    }
}

/// Frame one tagged message: tag byte, 4-byte length, body written by `body`.
/// The length counts itself plus the body.
fn frame_tagged(dst: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    dst.put_u8(tag);
    let len_at = dst.len();
    dst.put_u32(0); // length placeholder
    body(dst);
    patch_length(dst, len_at);
}

fn patch_length(dst: &mut BytesMut, len_at: usize) {
    let len = (dst.len() - len_at) as u32;
    dst[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
}

fn put_cstr(dst: &mut BytesMut, s: &str) {
    dst.extend_from_slice(s.as_bytes());
    dst.put_u8(0);
}

// ---- decode routines ----
//
// Each routine receives the bytes following the 1-byte tag and 4-byte
// declared length. The declared length is not cross-checked against the
// remaining chunk; the routine consumes only what its shape requires.

pub(crate) fn decode_bind(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let portal = take_cstr(&mut b, "Bind portal")?;
    let statement = take_cstr(&mut b, "Bind statement")?;

    let nfmt = take_u16(&mut b, "Bind format-code count")? as usize;
    let mut param_formats = Vec::with_capacity(nfmt);
    for _ in 0..nfmt {
        param_formats.push(take_i16(&mut b, "Bind format code")?);
    }

    let nparams = take_u16(&mut b, "Bind parameter count")? as usize;
    let mut params = Vec::with_capacity(nparams);
    for _ in 0..nparams {
        let len = take_i32(&mut b, "Bind parameter length")?;
        if len < 0 {
            params.push(None);
        } else {
            let len = len as usize;
            need(b, len, "Bind parameter value")?;
            params.push(Some(Bytes::copy_from_slice(&b[..len])));
            b = &b[len..];
        }
    }

    let nresult = take_u16(&mut b, "Bind result-format count")? as usize;
    let mut result_formats = Vec::with_capacity(nresult);
    for _ in 0..nresult {
        result_formats.push(take_i16(&mut b, "Bind result format code")?);
    }

    Ok(FrontendMessage::Bind {
        portal,
        statement,
        param_formats,
        params,
        result_formats,
    })
}

pub(crate) fn decode_close(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let target = PreparedTarget::from_byte(take_u8(&mut b, "Close selector")?)?;
    let name = take_cstr(&mut b, "Close name")?;
    Ok(FrontendMessage::Close { target, name })
}

pub(crate) fn decode_copy_data(body: &[u8]) -> Result<FrontendMessage> {
    Ok(FrontendMessage::CopyData {
        data: Bytes::copy_from_slice(body),
    })
}

pub(crate) fn decode_copy_done(body: &[u8]) -> Result<FrontendMessage> {
    expect_empty(body, "CopyDone")?;
    Ok(FrontendMessage::CopyDone)
}

pub(crate) fn decode_copy_fail(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let message = take_cstr(&mut b, "CopyFail message")?;
    Ok(FrontendMessage::CopyFail { message })
}

pub(crate) fn decode_describe(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let target = PreparedTarget::from_byte(take_u8(&mut b, "Describe selector")?)?;
    let name = take_cstr(&mut b, "Describe name")?;
    Ok(FrontendMessage::Describe { target, name })
}

pub(crate) fn decode_execute(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let portal = take_cstr(&mut b, "Execute portal")?;
    let max_rows = take_u32(&mut b, "Execute row limit")?;
    Ok(FrontendMessage::Execute { portal, max_rows })
}

pub(crate) fn decode_flush(body: &[u8]) -> Result<FrontendMessage> {
    expect_empty(body, "Flush")?;
    Ok(FrontendMessage::Flush)
}

/// FunctionCall is recognized but deliberately unsupported; the body is
/// never inspected. This is a distinguishable outcome, not a parse error.
pub(crate) fn decode_function_call(_body: &[u8]) -> Result<FrontendMessage> {
    Err(CaptureError::NotImplemented(
        "FunctionCall messages are not supported".into(),
    ))
}

pub(crate) fn decode_parse(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let statement = take_cstr(&mut b, "Parse statement")?;
    let query = take_cstr(&mut b, "Parse query")?;
    let noids = take_u16(&mut b, "Parse parameter-type count")? as usize;
    let mut param_oids = Vec::with_capacity(noids);
    for _ in 0..noids {
        param_oids.push(take_u32(&mut b, "Parse parameter type oid")?);
    }
    Ok(FrontendMessage::Parse {
        statement,
        query,
        param_oids,
    })
}

pub(crate) fn decode_query(body: &[u8]) -> Result<FrontendMessage> {
    let mut b = body;
    let sql = take_cstr(&mut b, "Query string")?;
    Ok(FrontendMessage::Query { sql })
}

pub(crate) fn decode_sync(body: &[u8]) -> Result<FrontendMessage> {
    expect_empty(body, "Sync")?;
    Ok(FrontendMessage::Sync)
}

pub(crate) fn decode_terminate(body: &[u8]) -> Result<FrontendMessage> {
    expect_empty(body, "Terminate")?;
    Ok(FrontendMessage::Terminate)
}

pub(crate) fn decode_auth_payload(body: &[u8]) -> Result<FrontendMessage> {
    Ok(FrontendMessage::AuthPayload {
        data: Bytes::copy_from_slice(body),
    })
}

/// Decode a startup message. `src` starts at the protocol-version marker
/// (the classifier strips the 4-byte length).
pub(crate) fn decode_startup(src: &[u8]) -> Result<FrontendMessage> {
    let mut b = src;
    let version = take_u32(&mut b, "startup protocol version")?;
    if version != PROTOCOL_VERSION_3_0 {
        return Err(CaptureError::UnexpectedMessage(
            "expected a startup message".into(),
        ));
    }

    let mut parameters: Vec<(String, String)> = Vec::new();
    loop {
        let key = take_cstr(&mut b, "startup parameter key")?;
        if key.is_empty() {
            break;
        }
        let value = take_cstr(&mut b, "startup parameter value")?;
        match parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => parameters.push((key, value)),
        }
    }

    Ok(FrontendMessage::Startup { parameters })
}

// ---- byte-level helpers ----

fn need(b: &[u8], n: usize, what: &str) -> Result<()> {
    if b.len() < n {
        return Err(CaptureError::MalformedMessage(format!(
            "{what} truncated: need {n} bytes, have {}",
            b.len()
        )));
    }
    Ok(())
}

fn take_u8(b: &mut &[u8], what: &str) -> Result<u8> {
    need(b, 1, what)?;
    let v = b[0];
    *b = &b[1..];
    Ok(v)
}

fn take_u16(b: &mut &[u8], what: &str) -> Result<u16> {
    need(b, 2, what)?;
    let v = u16::from_be_bytes([b[0], b[1]]);
    *b = &b[2..];
    Ok(v)
}

fn take_i16(b: &mut &[u8], what: &str) -> Result<i16> {
    take_u16(b, what).map(|v| v as i16)
}

fn take_u32(b: &mut &[u8], what: &str) -> Result<u32> {
    need(b, 4, what)?;
    let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    *b = &b[4..];
    Ok(v)
}

fn take_i32(b: &mut &[u8], what: &str) -> Result<i32> {
    take_u32(b, what).map(|v| v as i32)
}

fn take_cstr(b: &mut &[u8], what: &str) -> Result<String> {
    let pos = b.iter().position(|&x| x == 0).ok_or_else(|| {
        CaptureError::MalformedMessage(format!("unterminated string in {what}"))
    })?;
    let s = String::from_utf8_lossy(&b[..pos]).into_owned();
    *b = &b[pos + 1..];
    Ok(s)
}

fn expect_empty(body: &[u8], what: &str) -> Result<()> {
    if !body.is_empty() {
        return Err(CaptureError::MalformedMessage(format!(
            "{what} carries no body, found {} bytes",
            body.len()
        )));
    }
    Ok(())
}
