// ============================================================
// Layer 4: TFRecord Reader
// ============================================================
// TFRecord is a simple length-prefixed framing format. Every
// record on disk looks like:
//
//   u64  length            (little endian)
//   u32  masked_crc(length bytes)
//   [u8] data[length]
//   u32  masked_crc(data)
//
// The checksum is CRC-32C, rotated right by 15 bits and offset
// by a constant so that a CRC of a CRC is not trivially zero.
//
// index_shard() walks only the headers and returns the offset of
// every payload, so the dataset can later seek straight to record
// N with read_span(). Header lengths are untrusted: payloads are
// read incrementally and never preallocated from the header.

use anyhow::{bail, ensure, Context, Result};
use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

const MASK_DELTA: u32 = 0xa282_ead8;
const HEADER_LEN: usize = 12;
const FOOTER_LEN: u64 = 4;

/// CRC-32C of `data`, masked the way TFRecord stores it.
pub fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Where one record's payload lives inside its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    /// Byte offset of the first payload byte
    pub offset: u64,
    /// Payload length in bytes
    pub len: u64,
}

/// Streams records out of any `Read`.
#[cfg(test)]
pub struct TfRecordReader<R> {
    inner:  R,
    /// Offset of the next header, used in error messages
    offset: u64,
}

#[cfg(test)]
impl TfRecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open TFRecord shard '{}'", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[cfg(test)]
impl<R: Read> TfRecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Read the next record payload, `None` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(len) = read_header(&mut self.inner, self.offset)? else {
            return Ok(None);
        };

        let data = read_payload(&mut self.inner, len)
            .with_context(|| format!("Truncated record payload at offset {}", self.offset))?;

        let mut footer = [0u8; 4];
        self.inner
            .read_exact(&mut footer)
            .with_context(|| format!("Truncated record footer at offset {}", self.offset))?;
        verify_payload(&data, footer, self.offset)?;

        self.offset += HEADER_LEN as u64 + len + FOOTER_LEN;
        Ok(Some(data))
    }
}

#[cfg(test)]
impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Walk every header in a shard and return the payload spans.
/// Payloads are skipped, not read, so indexing large shards is cheap.
pub fn index_shard(path: &Path) -> Result<Vec<RecordSpan>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open TFRecord shard '{}'", path.display()))?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut spans  = Vec::new();
    let mut offset = 0u64;
    while let Some(len) = read_header(&mut reader, offset)
        .with_context(|| format!("Corrupt shard '{}'", path.display()))?
    {
        let payload = offset + HEADER_LEN as u64;
        let end = payload
            .checked_add(len)
            .and_then(|n| n.checked_add(FOOTER_LEN))
            .filter(|end| *end <= file_len);
        let Some(end) = end else {
            bail!(
                "Corrupt shard '{}': record at offset {} runs past end of file",
                path.display(),
                offset
            );
        };
        spans.push(RecordSpan { offset: payload, len });
        offset = end;
        reader.seek(SeekFrom::Start(offset))?;
    }

    tracing::debug!("Indexed {} records in '{}'", spans.len(), path.display());
    Ok(spans)
}

/// Read one payload given its span, verifying the data checksum.
pub fn read_span<R: Read + Seek>(reader: &mut R, span: RecordSpan) -> Result<Vec<u8>> {
    let header_at = span.offset.saturating_sub(HEADER_LEN as u64);
    reader.seek(SeekFrom::Start(span.offset))?;
    let data = read_payload(reader, span.len)
        .with_context(|| format!("Truncated record payload at offset {header_at}"))?;
    let mut footer = [0u8; 4];
    reader.read_exact(&mut footer)?;
    verify_payload(&data, footer, header_at)?;
    Ok(data)
}

/// Read exactly `len` bytes, growing the buffer as data arrives.
fn read_payload<R: Read>(reader: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    ensure!(
        data.len() as u64 == len,
        "expected {len} payload bytes, found {}",
        data.len()
    );
    Ok(data)
}

/// Frame `data` as one TFRecord.
#[cfg(test)]
pub fn write_record<W: std::io::Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = (data.len() as u64).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
    writer.write_all(data)?;
    writer.write_all(&masked_crc32c(data).to_le_bytes())?;
    Ok(())
}

/// Returns the payload length, or `None` if the stream ended exactly
/// on a record boundary.
fn read_header<R: Read>(reader: &mut R, offset: u64) -> Result<Option<u64>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_LEN {
        bail!("Truncated record header at offset {offset}");
    }

    let (len_bytes, crc_bytes) = header.split_at(8);
    let expected = u32::from_le_bytes(crc_bytes.try_into()?);
    ensure!(
        masked_crc32c(len_bytes) == expected,
        "Length checksum mismatch at offset {offset}"
    );
    Ok(Some(u64::from_le_bytes(len_bytes.try_into()?)))
}

fn verify_payload(data: &[u8], footer: [u8; 4], offset: u64) -> Result<()> {
    ensure!(
        masked_crc32c(data) == u32::from_le_bytes(footer),
        "Data checksum mismatch in record at offset {offset}"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(records: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for r in records {
            write_record(&mut buf, r).unwrap();
        }
        buf
    }

    #[test]
    fn test_known_masked_crc() {
        // crc32c("123456789") = 0xe3069283, masked per the TFRecord rule
        let crc: u32 = 0xe306_9283;
        let masked = crc.rotate_right(15).wrapping_add(MASK_DELTA);
        assert_eq!(masked_crc32c(b"123456789"), masked);
    }

    #[test]
    fn test_stream_reads_all_records() {
        let buf = framed(&[b"first", b"", b"third record"]);
        let records: Vec<Vec<u8>> = TfRecordReader::new(Cursor::new(buf))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![b"first".to_vec(), Vec::new(), b"third record".to_vec()]);
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        let mut buf = framed(&[b"payload"]);
        buf[HEADER_LEN] ^= 0xff;
        let err = TfRecordReader::new(Cursor::new(buf)).read_record().unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let mut buf = framed(&[b"payload"]);
        buf.extend_from_slice(&[1, 2, 3]);
        let mut reader = TfRecordReader::new(Cursor::new(buf));
        assert!(reader.read_record().unwrap().is_some());
        assert!(reader.read_record().is_err());
    }

    #[test]
    fn test_index_and_seek() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.tfrecord");
        std::fs::write(&path, framed(&[b"aa", b"bbbb", b"c"])).unwrap();

        let spans = index_shard(&path).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].len, 4);

        let mut file = File::open(&path).unwrap();
        assert_eq!(read_span(&mut file, spans[2]).unwrap(), b"c".to_vec());
        assert_eq!(read_span(&mut file, spans[1]).unwrap(), b"bbbb".to_vec());
    }

    fn huge_header() -> Vec<u8> {
        let len = (u64::MAX - 4).to_le_bytes();
        let mut buf = len.to_vec();
        buf.extend_from_slice(&masked_crc32c(&len).to_le_bytes());
        buf
    }

    #[test]
    fn test_index_rejects_overflowing_length() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.tfrecord");
        std::fs::write(&path, huge_header()).unwrap();

        let err = index_shard(&path).unwrap_err();
        assert!(err.to_string().contains("runs past end of file"));
    }

    #[test]
    fn test_stream_rejects_oversized_length() {
        let mut buf = huge_header();
        buf.extend_from_slice(b"short");
        assert!(TfRecordReader::new(Cursor::new(buf)).read_record().is_err());
    }

    #[test]
    fn test_span_past_end_is_rejected() {
        let buf  = framed(&[b"abc"]);
        let span = RecordSpan { offset: HEADER_LEN as u64, len: u64::MAX };
        assert!(read_span(&mut Cursor::new(buf), span).is_err());
    }
}
