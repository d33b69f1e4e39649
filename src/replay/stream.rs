use std::io::{BufReader, Read, Write};

use tracing::trace;

use crate::error::Result;
use crate::replay::record::CapturedRecord;

/// A forward-only parser over a replay-log byte source.
///
/// Not restartable and not seekable; a caller needing to re-read must reopen
/// the underlying source. Safe for exactly one logical reader at a time.
pub struct ReplayLogStream<R: Read> {
    rd: BufReader<R>,
}

impl<R: Read> ReplayLogStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            rd: BufReader::new(source),
        }
    }

    /// Produce the next record in the stream.
    ///
    /// `Ok(None)` signals a clean end exactly at a record boundary; a stream
    /// cut off mid-record fails per the [`CapturedRecord::read_from`]
    /// contract.
    pub fn next_record(&mut self) -> Result<Option<CapturedRecord>> {
        match CapturedRecord::read_from(&mut self.rd)? {
            Some((record, consumed)) => {
                trace!(
                    bytes = consumed,
                    payload = record.payload.len(),
                    "read replay record"
                );
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

impl<R: Read> Iterator for ReplayLogStream<R> {
    type Item = Result<CapturedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// The persistence half of the codec: appends records to a byte sink in the
/// replay-log wire form.
pub struct ReplayLogWriter<W: Write> {
    wr: W,
}

impl<W: Write> ReplayLogWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { wr: sink }
    }

    /// Append one record, returning the number of bytes written.
    pub fn append(&mut self, record: &CapturedRecord) -> Result<usize> {
        let written = record.write_to(&mut self.wr)?;
        trace!(bytes = written, "appended replay record");
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.wr.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.wr.flush()?;
        Ok(self.wr)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    use super::{ReplayLogStream, ReplayLogWriter};
    use crate::addr::Addr;
    use crate::replay::record::CapturedRecord;

    fn record(port: u16, payload: &'static [u8]) -> CapturedRecord {
        CapturedRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000, 123).unwrap(),
            client_addr: Addr::parse(&format!("192.168.0.7:{port}")).unwrap(),
            server_addr: Addr::parse("10.0.0.2:5432").unwrap(),
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn writer_then_stream_roundtrip() {
        let records = vec![
            record(50000, b"S\x00\x00\x00\x04"),
            record(50001, b""),
            record(50002, b"Q\x00\x00\x00\x09test\x00"),
        ];

        let mut writer = ReplayLogWriter::new(Vec::new());
        for r in &records {
            writer.append(r).unwrap();
        }
        let log = writer.into_inner().unwrap();

        let read: Vec<_> = ReplayLogStream::new(Cursor::new(log))
            .map(Result::unwrap)
            .collect();
        assert_eq!(read, records);
    }

    #[test]
    fn empty_source_is_clean_end() {
        let mut stream = ReplayLogStream::new(Cursor::new(Vec::new()));
        assert!(stream.next_record().unwrap().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn truncation_mid_record_fails() {
        let mut writer = ReplayLogWriter::new(Vec::new());
        writer.append(&record(50000, b"payload-bytes")).unwrap();
        let mut log = writer.into_inner().unwrap();
        log.truncate(log.len() - 4);

        let mut stream = ReplayLogStream::new(Cursor::new(log));
        let err = stream.next_record().unwrap_err();
        assert!(err.is_unexpected_end());
    }

    #[test]
    fn stops_at_first_error() {
        // A good record followed by a truncated one: yield, then fail.
        let mut writer = ReplayLogWriter::new(Vec::new());
        writer.append(&record(50000, b"first")).unwrap();
        writer.append(&record(50001, b"second")).unwrap();
        let mut log = writer.into_inner().unwrap();
        log.truncate(log.len() - 2);

        let mut stream = ReplayLogStream::new(Cursor::new(log));
        assert!(stream.next_record().unwrap().is_some());
        assert!(stream.next_record().unwrap_err().is_unexpected_end());
    }
}
