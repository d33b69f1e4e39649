use std::io::{BufRead, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::addr::Addr;
use crate::error::{CaptureError, Result};

/// One "row" of a replay log: a captured TCP chunk with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Capture instant, UTC, nanosecond resolution.
    pub timestamp: DateTime<Utc>,
    pub client_addr: Addr,
    pub server_addr: Addr,
    /// The raw captured chunk, exactly as it crossed the wire.
    pub payload: Bytes,
}

impl CapturedRecord {
    /// Read and parse the next record from a buffered byte source.
    ///
    /// Returns the record together with the exact number of bytes consumed.
    /// A clean end of stream (zero bytes available at the first read) is
    /// `Ok(None)`; a stream that ends anywhere inside a record fails with
    /// [`CaptureError::UnexpectedEnd`].
    pub fn read_from<R: BufRead>(rd: &mut R) -> Result<Option<(CapturedRecord, usize)>> {
        let mut consumed = 0usize;

        let mut ts_bytes = [0u8; 8];
        let n = read_available(rd, &mut ts_bytes)?;
        if n == 0 {
            return Ok(None);
        }
        consumed += n;
        if n < ts_bytes.len() {
            return Err(CaptureError::UnexpectedEnd(
                "stream ended inside timestamp".into(),
            ));
        }
        let timestamp = timestamp_from_nanos(u64::from_be_bytes(ts_bytes))?;

        let client_addr = read_addr_token(rd, &mut consumed, "client address")?;
        let server_addr = read_addr_token(rd, &mut consumed, "server address")?;

        let mut len_bytes = [0u8; 4];
        read_field(rd, &mut len_bytes, &mut consumed, "payload length")?;
        let payload_len = u32::from_be_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; payload_len];
        read_field(rd, &mut payload, &mut consumed, "payload")?;

        Ok(Some((
            CapturedRecord {
                timestamp,
                client_addr,
                server_addr,
                payload: Bytes::from(payload),
            },
            consumed,
        )))
    }

    /// Encode this record in the replay-log wire form.
    ///
    /// Byte-exact inverse of [`read_from`](Self::read_from): decoding the
    /// returned bytes reproduces this record.
    pub fn encode(&self) -> Result<Bytes> {
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| {
            CaptureError::MalformedMessage(format!(
                "payload too large for a u32 length field: {} bytes",
                self.payload.len()
            ))
        })?;

        let mut buf = BytesMut::with_capacity(8 + 48 + 4 + self.payload.len());
        buf.put_u64(timestamp_to_nanos(&self.timestamp)?);
        buf.extend_from_slice(self.client_addr.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.extend_from_slice(self.server_addr.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_u32(payload_len);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Encode and write this record, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, wr: &mut W) -> Result<usize> {
        let encoded = self.encode()?;
        wr.write_all(&encoded)?;
        Ok(encoded.len())
    }
}

/// Fill `buf` from `rd`, stopping early only at end of stream.
/// Returns how many bytes were read.
fn read_available<R: Read>(rd: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match rd.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn read_field<R: Read>(
    rd: &mut R,
    buf: &mut [u8],
    consumed: &mut usize,
    what: &str,
) -> Result<()> {
    let n = read_available(rd, buf)?;
    *consumed += n;
    if n < buf.len() {
        return Err(CaptureError::UnexpectedEnd(format!(
            "stream ended inside {what}"
        )));
    }
    Ok(())
}

/// Read bytes up to and including the next 0x20 and parse the token before
/// it as an address.
fn read_addr_token<R: BufRead>(rd: &mut R, consumed: &mut usize, what: &str) -> Result<Addr> {
    let mut token = Vec::new();
    let n = rd.read_until(b' ', &mut token)?;
    *consumed += n;
    if token.last() != Some(&b' ') {
        return Err(CaptureError::UnexpectedEnd(format!(
            "stream ended inside {what} token"
        )));
    }
    token.pop();
    let token = std::str::from_utf8(&token)
        .map_err(|_| CaptureError::InvalidAddress(format!("non-ASCII {what} token")))?;
    Addr::parse(token)
}

fn timestamp_from_nanos(nanos: u64) -> Result<DateTime<Utc>> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec).ok_or_else(|| {
        CaptureError::MalformedMessage(format!("timestamp out of range: {nanos}ns"))
    })
}

fn timestamp_to_nanos(ts: &DateTime<Utc>) -> Result<u64> {
    let nanos = ts.timestamp_nanos_opt().ok_or_else(|| {
        CaptureError::MalformedMessage(format!("timestamp not representable in nanoseconds: {ts}"))
    })?;
    u64::try_from(nanos).map_err(|_| {
        CaptureError::MalformedMessage(format!("timestamp precedes the unix epoch: {ts}"))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;
    use chrono::{DateTime, Utc};

    use super::CapturedRecord;
    use crate::addr::Addr;

    fn sample_record() -> CapturedRecord {
        CapturedRecord {
            timestamp: super::timestamp_from_nanos(1_611_246_561_685_581_000).unwrap(),
            client_addr: Addr::parse("127.0.0.1:64245").unwrap(),
            server_addr: Addr::parse("127.0.0.1:5432").unwrap(),
            payload: Bytes::from_static(b"Q\x00\x00\x00\x0cSELECT~\x00"),
        }
    }

    fn sample_wire() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&1_611_246_561_685_581_000u64.to_be_bytes());
        v.extend_from_slice(b"127.0.0.1:64245 ");
        v.extend_from_slice(b"127.0.0.1:5432 ");
        v.extend_from_slice(&13u32.to_be_bytes());
        v.extend_from_slice(b"Q\x00\x00\x00\x0cSELECT~\x00");
        v
    }

    #[test]
    fn timestamp_wire_vector() {
        let ts = super::timestamp_from_nanos(1_611_246_561_685_581_000).unwrap();
        let expected: DateTime<Utc> = "2021-01-21T16:29:21.685581Z".parse().unwrap();
        assert_eq!(ts, expected);
        assert_eq!(
            super::timestamp_to_nanos(&ts).unwrap(),
            1_611_246_561_685_581_000
        );
    }

    #[test]
    fn read_parses_all_fields() {
        let wire = sample_wire();
        let (rec, consumed) = CapturedRecord::read_from(&mut Cursor::new(&wire))
            .unwrap()
            .unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(rec, sample_record());
    }

    #[test]
    fn roundtrip_is_byte_exact() {
        let rec = sample_record();
        let encoded = rec.encode().unwrap();
        assert_eq!(&encoded[..], &sample_wire()[..]);

        let (back, consumed) = CapturedRecord::read_from(&mut Cursor::new(&encoded))
            .unwrap()
            .unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(back, rec);
    }

    #[test]
    fn roundtrip_ipv6_and_empty_payload() {
        let rec = CapturedRecord {
            timestamp: super::timestamp_from_nanos(0).unwrap(),
            client_addr: Addr::parse("[::1]:49152").unwrap(),
            server_addr: Addr::parse("[2001:db8::5]:5432").unwrap(),
            payload: Bytes::new(),
        };
        let encoded = rec.encode().unwrap();
        let (back, _) = CapturedRecord::read_from(&mut Cursor::new(&encoded))
            .unwrap()
            .unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn clean_end_is_none() {
        assert!(CapturedRecord::read_from(&mut Cursor::new(Vec::new()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn truncated_timestamp() {
        let wire = &sample_wire()[..5];
        let err = CapturedRecord::read_from(&mut Cursor::new(wire)).unwrap_err();
        assert!(err.is_unexpected_end());
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn truncated_address_token() {
        let wire = &sample_wire()[..12]; // inside the client token
        let err = CapturedRecord::read_from(&mut Cursor::new(wire)).unwrap_err();
        assert!(err.is_unexpected_end());
        assert!(err.to_string().contains("client address"));
    }

    #[test]
    fn truncated_length_field() {
        let full = sample_wire();
        let wire = &full[..full.len() - 13 - 2]; // inside the 4-byte length
        let err = CapturedRecord::read_from(&mut Cursor::new(wire)).unwrap_err();
        assert!(err.is_unexpected_end());
        assert!(err.to_string().contains("payload length"));
    }

    #[test]
    fn truncated_payload_is_never_a_short_record() {
        let full = sample_wire();
        let wire = &full[..full.len() - 1];
        let err = CapturedRecord::read_from(&mut Cursor::new(wire)).unwrap_err();
        assert!(err.is_unexpected_end());
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn bad_address_token_is_invalid_address() {
        let mut v = Vec::new();
        v.extend_from_slice(&0u64.to_be_bytes());
        v.extend_from_slice(b"not-an-ip:x ");
        let err = CapturedRecord::read_from(&mut Cursor::new(&v)).unwrap_err();
        assert!(matches!(err, crate::error::CaptureError::InvalidAddress(_)));
    }
}
