// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Record envelope
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The chunked, checksummed framing layer that turns a segment file's byte
// stream into discrete records. Records are split into chunks packed into
// fixed-size blocks so a reader can resynchronize on block boundaries.
//
// ## On-disk chunk format (all integers little-endian)
//
// ```text
// [4 bytes: crc32 checksum]  -- CRC32 of type, log_num, and payload
// [2 bytes: length (u16)]    -- payload length
// [1 byte:  type]            -- 1=Full, 2=First, 3=Middle, 4=Last
// [4 bytes: log_num (u32)]   -- low 32 bits of the logical WAL number
// [N bytes: payload]
// ```
//
// Chunks never span the 32 KiB block boundary; a block's final bytes are
// zero-padded when fewer than a chunk header remain. The log number in each
// chunk lets the reader reject chunks left over from a recycled file. An
// all-zero chunk header marks the clean end of the written region in a
// preallocated file.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{WalError, WalResult};
use crate::segment::NumWal;

/// Size of a record block. Chunks are packed into blocks and never cross a
/// block boundary.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Size of the fixed chunk header (crc32 + length + type + log_num).
pub const CHUNK_HEADER_SIZE: usize = 11;

const CHUNK_FULL: u8 = 1;
const CHUNK_FIRST: u8 = 2;
const CHUNK_MIDDLE: u8 = 3;
const CHUNK_LAST: u8 = 4;

fn chunk_crc(header_tail: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(header_tail);
    hasher.update(payload);
    hasher.finalize()
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Outcome of decoding the next chunk out of the block buffer.
enum ChunkOutcome {
    /// A valid chunk; payload lives at `buf[start..start + len]`.
    Chunk { ty: u8, start: usize, len: usize },
    /// The written region of the file ended cleanly.
    Eof,
}

/// Reads records from one segment file.
///
/// Each reader is parameterized by the logical WAL number so chunks written
/// by a previous user of a recycled file fail validation instead of being
/// returned as data.
pub struct Reader<F> {
    file: F,
    /// Low 32 bits of the logical WAL number, as stored in chunk headers.
    log_num: u32,
    /// Path of the segment, carried for error context.
    path: PathBuf,
    buf: Box<[u8]>,
    buf_len: usize,
    pos: usize,
    /// File offset of `buf[0]`.
    block_start: u64,
    /// The file returned a short block; no further blocks exist.
    at_eof: bool,
}

impl<F: Read> Reader<F> {
    /// Create a reader over a segment file belonging to WAL `num_wal`.
    pub fn new(file: F, num_wal: NumWal, path: PathBuf) -> Self {
        Self {
            file,
            log_num: num_wal as u32,
            path,
            buf: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            buf_len: 0,
            pos: 0,
            block_start: 0,
            at_eof: false,
        }
    }

    /// Byte offset within the file at which the next record begins.
    pub fn position(&self) -> u64 {
        self.block_start + self.pos as u64
    }

    /// Recover the underlying file, e.g. to close it explicitly.
    pub fn into_inner(self) -> F {
        self.file
    }

    /// Append the next complete record to `buf`.
    ///
    /// Returns `Ok(false)` at the clean end of the written region. Framing,
    /// checksum, log-number, and chunk-sequencing failures are reported as
    /// [`WalError::InvalidRecord`]; these are expected at the torn tail of a
    /// segment abandoned mid-write. The record is consumed eagerly: all of
    /// its chunks are read before this returns.
    pub fn read_record(&mut self, buf: &mut Vec<u8>) -> WalResult<bool> {
        let mut in_record = false;
        loop {
            match self.next_chunk()? {
                ChunkOutcome::Eof => {
                    if in_record {
                        return Err(self.invalid(self.position(), "record missing its final chunk"));
                    }
                    return Ok(false);
                }
                ChunkOutcome::Chunk { ty, start, len } => {
                    let data = &self.buf[start..start + len];
                    match (ty, in_record) {
                        (CHUNK_FULL, false) => {
                            buf.extend_from_slice(data);
                            return Ok(true);
                        }
                        (CHUNK_FIRST, false) => {
                            buf.extend_from_slice(data);
                            in_record = true;
                        }
                        (CHUNK_MIDDLE, true) => buf.extend_from_slice(data),
                        (CHUNK_LAST, true) => {
                            buf.extend_from_slice(data);
                            return Ok(true);
                        }
                        _ => {
                            let offset = self.block_start + (start - CHUNK_HEADER_SIZE) as u64;
                            return Err(self.invalid(offset, "chunk out of sequence"));
                        }
                    }
                }
            }
        }
    }

    fn invalid(&self, offset: u64, reason: &'static str) -> WalError {
        WalError::InvalidRecord {
            path: self.path.clone(),
            offset,
            reason,
        }
    }

    fn next_chunk(&mut self) -> WalResult<ChunkOutcome> {
        loop {
            let remaining = self.buf_len - self.pos;
            if remaining < CHUNK_HEADER_SIZE {
                if remaining > 0 && self.at_eof {
                    // Partial header bytes at the end of the file: zeros are
                    // preallocation padding, anything else is a torn write.
                    if self.buf[self.pos..self.buf_len].iter().all(|b| *b == 0) {
                        self.pos = self.buf_len;
                        return Ok(ChunkOutcome::Eof);
                    }
                    return Err(self.invalid(self.position(), "truncated chunk header"));
                }
                self.pos = self.buf_len;
                if self.at_eof || !self.refill()? {
                    return Ok(ChunkOutcome::Eof);
                }
                continue;
            }

            let p = self.pos;
            let crc = u32::from_le_bytes(self.buf[p..p + 4].try_into().unwrap());
            let len = u16::from_le_bytes(self.buf[p + 4..p + 6].try_into().unwrap()) as usize;
            let ty = self.buf[p + 6];
            let log_num = u32::from_le_bytes(self.buf[p + 7..p + 11].try_into().unwrap());

            if crc == 0 && len == 0 && ty == 0 {
                // Zeroed header: clean end of the written region.
                return Ok(ChunkOutcome::Eof);
            }
            if !(CHUNK_FULL..=CHUNK_LAST).contains(&ty) {
                return Err(self.invalid(self.position(), "unknown chunk type"));
            }
            if p + CHUNK_HEADER_SIZE + len > self.buf_len {
                let reason = if self.buf_len < BLOCK_SIZE {
                    "truncated chunk payload"
                } else {
                    "chunk overruns block boundary"
                };
                return Err(self.invalid(self.position(), reason));
            }
            if log_num != self.log_num {
                return Err(self.invalid(self.position(), "chunk from another WAL (recycled file)"));
            }
            if chunk_crc(&self.buf[p + 6..p + CHUNK_HEADER_SIZE], &self.buf[p + CHUNK_HEADER_SIZE..p + CHUNK_HEADER_SIZE + len]) != crc {
                return Err(self.invalid(self.position(), "chunk checksum mismatch"));
            }

            self.pos = p + CHUNK_HEADER_SIZE + len;
            // A full block's final sub-header bytes are trailer padding; skip
            // them so `position()` points at the next chunk.
            if self.buf_len == BLOCK_SIZE && self.buf_len - self.pos < CHUNK_HEADER_SIZE {
                self.pos = self.buf_len;
            }
            return Ok(ChunkOutcome::Chunk {
                ty,
                start: p + CHUNK_HEADER_SIZE,
                len,
            });
        }
    }

    /// Read the next block. Returns `Ok(false)` if the file is exhausted.
    fn refill(&mut self) -> WalResult<bool> {
        self.block_start += self.buf_len as u64;
        self.buf_len = 0;
        self.pos = 0;
        while self.buf_len < BLOCK_SIZE {
            let n = self.file.read(&mut self.buf[self.buf_len..])?;
            if n == 0 {
                self.at_eof = true;
                break;
            }
            self.buf_len += n;
        }
        Ok(self.buf_len > 0)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes records in the chunk format consumed by [`Reader`].
///
/// This is the format encoder used by tests and tooling to produce segment
/// files; failover writing itself (segment switching, fsync scheduling) is
/// out of scope for this crate.
pub struct Writer<W> {
    dest: W,
    log_num: u32,
    /// Bytes written into the current block.
    block_offset: usize,
}

impl<W: Write> Writer<W> {
    /// Create a writer emitting chunks stamped with WAL `num_wal`.
    pub fn new(dest: W, num_wal: NumWal) -> Self {
        Self {
            dest,
            log_num: num_wal as u32,
            block_offset: 0,
        }
    }

    /// Append one record, fragmenting it into chunks as block space allows.
    pub fn append(&mut self, record: &[u8]) -> io::Result<()> {
        let mut rest = record;
        let mut first = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < CHUNK_HEADER_SIZE {
                // Zero-fill the block trailer and start a fresh block.
                self.dest.write_all(&[0u8; CHUNK_HEADER_SIZE][..leftover])?;
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - CHUNK_HEADER_SIZE;
            let frag = rest.len().min(avail);
            let done = frag == rest.len();
            let ty = match (first, done) {
                (true, true) => CHUNK_FULL,
                (true, false) => CHUNK_FIRST,
                (false, true) => CHUNK_LAST,
                (false, false) => CHUNK_MIDDLE,
            };
            self.emit_chunk(ty, &rest[..frag])?;
            rest = &rest[frag..];
            first = false;
            if done {
                return Ok(());
            }
        }
    }

    /// Flush buffered bytes to the destination.
    pub fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }

    /// Recover the underlying destination.
    pub fn into_inner(self) -> W {
        self.dest
    }

    fn emit_chunk(&mut self, ty: u8, payload: &[u8]) -> io::Result<()> {
        let mut header = [0u8; CHUNK_HEADER_SIZE];
        header[4..6].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        header[6] = ty;
        header[7..11].copy_from_slice(&self.log_num.to_le_bytes());
        let crc = chunk_crc(&header[6..], payload);
        header[0..4].copy_from_slice(&crc.to_le_bytes());

        self.dest.write_all(&header)?;
        self.dest.write_all(payload)?;
        self.block_offset += CHUNK_HEADER_SIZE + payload.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_records(num_wal: NumWal, records: &[&[u8]]) -> Vec<u8> {
        let mut writer = Writer::new(Vec::new(), num_wal);
        for record in records {
            writer.append(record).unwrap();
        }
        writer.into_inner()
    }

    fn reader(data: &[u8], num_wal: NumWal) -> Reader<&[u8]> {
        Reader::new(data, num_wal, Path::new("000007.log").to_path_buf())
    }

    #[test]
    fn test_roundtrip_small_records() {
        let data = write_records(7, &[b"alpha", b"beta", b""]);
        let mut r = reader(&data, 7);

        let mut buf = Vec::new();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, b"alpha");

        buf.clear();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, b"beta");

        buf.clear();
        assert!(r.read_record(&mut buf).unwrap());
        assert!(buf.is_empty());

        assert!(!r.read_record(&mut buf).unwrap());
    }

    #[test]
    fn test_large_record_spans_blocks() {
        let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let data = write_records(3, &[&big, b"tail"]);
        assert!(data.len() > 3 * BLOCK_SIZE);

        let mut r = reader(&data, 3);
        let mut buf = Vec::new();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, big);

        buf.clear();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, b"tail");
        assert!(!r.read_record(&mut buf).unwrap());
    }

    #[test]
    fn test_position_tracks_record_starts() {
        let data = write_records(5, &[b"aaaa", b"bb"]);
        let mut r = reader(&data, 5);
        let mut buf = Vec::new();

        assert_eq!(r.position(), 0);
        r.read_record(&mut buf).unwrap();
        assert_eq!(r.position(), (CHUNK_HEADER_SIZE + 4) as u64);

        buf.clear();
        r.read_record(&mut buf).unwrap();
        assert_eq!(r.position(), (2 * CHUNK_HEADER_SIZE + 4 + 2) as u64);
    }

    #[test]
    fn test_block_trailer_is_skipped() {
        // First record leaves 5 bytes in the block, too few for a header;
        // the writer pads them and the second record starts a new block.
        let first_len = BLOCK_SIZE - CHUNK_HEADER_SIZE - 5;
        let first = vec![0xABu8; first_len];
        let data = write_records(2, &[&first, b"next-block"]);
        assert_eq!(data.len() % BLOCK_SIZE, CHUNK_HEADER_SIZE + 10);

        let mut r = reader(&data, 2);
        let mut buf = Vec::new();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf.len(), first_len);
        assert_eq!(r.position(), BLOCK_SIZE as u64);

        buf.clear();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, b"next-block");
    }

    #[test]
    fn test_zeroed_tail_is_clean_eof() {
        let mut data = write_records(9, &[b"only"]);
        data.extend(std::iter::repeat(0u8).take(500));

        let mut r = reader(&data, 9);
        let mut buf = Vec::new();
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(buf, b"only");
        buf.clear();
        assert!(!r.read_record(&mut buf).unwrap());
    }

    #[test]
    fn test_empty_file_is_clean_eof() {
        let mut r = reader(&[], 1);
        let mut buf = Vec::new();
        assert!(!r.read_record(&mut buf).unwrap());
    }

    #[test]
    fn test_truncated_payload_is_invalid() {
        let mut data = write_records(4, &[b"doomed record"]);
        data.truncate(data.len() - 3);

        let mut r = reader(&data, 4);
        let mut buf = Vec::new();
        let err = r.read_record(&mut buf).unwrap_err();
        assert!(err.is_invalid_record(), "got {err:?}");
    }

    #[test]
    fn test_truncated_header_is_invalid() {
        let data = write_records(4, &[b"ok", b"doomed"]);
        // Cut into the second chunk's header, keeping its nonzero type byte.
        let cut = CHUNK_HEADER_SIZE + 2 + 7;
        let data = &data[..cut];

        let mut r = reader(data, 4);
        let mut buf = Vec::new();
        assert!(r.read_record(&mut buf).unwrap());
        buf.clear();
        let err = r.read_record(&mut buf).unwrap_err();
        assert!(err.is_invalid_record(), "got {err:?}");
    }

    #[test]
    fn test_checksum_flip_is_invalid() {
        let mut data = write_records(6, &[b"payload"]);
        let last = data.len() - 1;
        data[last] ^= 0xFF;

        let mut r = reader(&data, 6);
        let mut buf = Vec::new();
        let err = r.read_record(&mut buf).unwrap_err();
        assert!(err.is_invalid_record());
        match err {
            WalError::InvalidRecord { offset, reason, .. } => {
                assert_eq!(offset, 0);
                assert_eq!(reason, "chunk checksum mismatch");
            }
            other => panic!("expected InvalidRecord, got: {other:?}"),
        }
    }

    #[test]
    fn test_recycled_chunk_rejected_by_log_number() {
        // Written as WAL 7, read back expecting WAL 8: every chunk is stale.
        let data = write_records(7, &[b"stale"]);
        let mut r = reader(&data, 8);
        let mut buf = Vec::new();
        let err = r.read_record(&mut buf).unwrap_err();
        assert!(err.is_invalid_record());
    }

    #[test]
    fn test_missing_final_chunk_is_invalid() {
        let big = vec![1u8; BLOCK_SIZE * 2];
        let data = write_records(1, &[&big]);
        // Keep only the first block: FIRST chunk without its LAST.
        let data = &data[..BLOCK_SIZE];

        let mut r = reader(data, 1);
        let mut buf = Vec::new();
        let err = r.read_record(&mut buf).unwrap_err();
        assert!(err.is_invalid_record());
    }
}
