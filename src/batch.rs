// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Batch header codec
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Every record in the WAL carries an encoded batch, and every batch begins
// with the same fixed-size prefix: the sequence number assigned to the
// batch's first operation, then the count of operations it contains. The
// reader needs only this prefix; the operations themselves stay opaque.

/// Size of the fixed batch header prefix (sequence number + count).
pub const HEADER_SIZE: usize = 12;

/// The fixed-size prefix of every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    /// Sequence number of the batch's first operation. Strictly increasing
    /// across batches that carry data; the deduplication key.
    pub seq_num: u64,

    /// Number of operations in the batch. Zero marks a metadata-only batch
    /// that repeats a sequence number and is skipped during reads.
    pub count: u32,
}

/// Decode a batch header from the leading bytes of a record payload.
///
/// Returns `None` iff the slice is shorter than [`HEADER_SIZE`].
pub fn read_header(data: &[u8]) -> Option<BatchHeader> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    let seq_num = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let count = u32::from_le_bytes(data[8..12].try_into().unwrap());
    Some(BatchHeader { seq_num, count })
}

/// Encode a batch header in the writer's little-endian layout.
pub fn encode_header(seq_num: u64, count: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..8].copy_from_slice(&seq_num.to_le_bytes());
    buf[8..12].copy_from_slice(&count.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let bytes = encode_header(u64::MAX - 1, 42);
        let header = read_header(&bytes).unwrap();
        assert_eq!(header.seq_num, u64::MAX - 1);
        assert_eq!(header.count, 42);
    }

    #[test]
    fn test_short_slice_rejected() {
        assert_eq!(read_header(&[]), None);
        assert_eq!(read_header(&[0u8; HEADER_SIZE - 1]), None);
    }

    #[test]
    fn test_header_parses_from_longer_payload() {
        let mut record = encode_header(10, 1).to_vec();
        record.extend_from_slice(b"operation bytes");
        let header = read_header(&record).unwrap();
        assert_eq!(header.seq_num, 10);
        assert_eq!(header.count, 1);
    }
}
