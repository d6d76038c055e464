// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Virtual WAL reader
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `WalReader` takes the ordered physical segments of one logical WAL and
// presents their records as a single merged stream. Inflight writes to a
// stalled disk may or may not complete, so the tail of one segment can be
// duplicated at the head of its successor, torn mid-record, or both. The
// reader filters duplicates by batch sequence number and treats a torn tail
// as fatal only in the final segment.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::batch;
use crate::error::{WalError, WalResult};
use crate::fs::File;
use crate::record;
use crate::segment::{NumWal, Segment};

/// Position of a record within the physical segment file it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    /// Path of the segment file currently being read.
    pub physical_file: PathBuf,
    /// Byte offset within that file at which the record begins.
    pub physical_offset: u64,
}

/// The currently open segment and its envelope reader.
struct OpenSegment {
    /// Position within `WalReader::segments`.
    pos: usize,
    reader: record::Reader<Box<dyn File>>,
}

/// Reads one logical WAL as a merged stream over its physical segments.
///
/// Records are yielded in strictly increasing batch sequence number order.
/// At most one segment file is open at a time; `close` releases it. The
/// reader is single-threaded and blocking.
pub struct WalReader {
    num: NumWal,
    segments: Vec<Segment>,
    /// Next entry of `segments` to open.
    next_index: usize,
    curr: Option<OpenSegment>,
    off: Offset,
    /// Sequence number of the batch in the last record returned. Batches at
    /// or below this have already been returned and are skipped; the field
    /// only moves forward.
    last_seq_num: u64,
    /// Reusable buffer holding the latest record. `next_record` hands out a
    /// borrow of it, so its contents live until the next call.
    record_buf: Vec<u8>,
}

impl WalReader {
    /// Create a reader over the ordered segments of WAL `num`.
    ///
    /// `segments` must be non-empty and strictly increasing by index, as
    /// produced by [`list_logs`](crate::segment::list_logs). No file is
    /// opened until the first [`next_record`](Self::next_record) call.
    pub fn new(num: NumWal, segments: Vec<Segment>) -> Self {
        debug_assert!(!segments.is_empty());
        debug_assert!(segments.windows(2).all(|w| w[0].index < w[1].index));
        Self {
            num,
            segments,
            next_index: 0,
            curr: None,
            off: Offset {
                physical_file: PathBuf::new(),
                physical_offset: 0,
            },
            last_seq_num: 0,
            record_buf: Vec::new(),
        }
    }

    /// Return the next logical record and the physical position it was read
    /// from, or `Ok(None)` once every segment is exhausted.
    ///
    /// The returned slice borrows the reader's internal buffer and is
    /// invalidated by the next call.
    pub fn next_record(&mut self) -> WalResult<Option<(&[u8], Offset)>> {
        if self.curr.is_none() && self.next_index == 0 && !self.next_file()? {
            return Ok(None);
        }

        loop {
            let Some(open) = self.curr.as_mut() else {
                // A previous call exhausted every segment.
                return Ok(None);
            };
            let seg_pos = open.pos;
            let is_final = seg_pos + 1 == self.segments.len();

            self.off.physical_offset = open.reader.position();
            self.record_buf.clear();
            match open.reader.read_record(&mut self.record_buf) {
                Ok(true) => {}
                Ok(false) => {
                    // This segment is exhausted; continue with the next.
                    if !self.next_file()? {
                        return Ok(None);
                    }
                    continue;
                }
                Err(err) if err.is_invalid_record() && !is_final => {
                    // Torn tail from a failover. The writer could not append
                    // a clean EOF trailer before switching segments, and the
                    // missing records exist in the successor.
                    warn!(error = %err, "Skipping torn tail of WAL segment");
                    if !self.next_file()? {
                        return Ok(None);
                    }
                    continue;
                }
                Err(err) => return Err(err),
            }

            // The envelope framed this record and its checksums passed, so a
            // payload shorter than a batch header is a writer bug, not torn
            // I/O.
            let Some(header) = batch::read_header(&self.record_buf) else {
                return Err(WalError::Corruption {
                    num_wal: self.num,
                    index: self.segments[seg_pos].index,
                    path: self.segments[seg_pos].path(self.num),
                });
            };

            // A batch with no operations repeats a sequence number and is
            // never applied; returning it would defeat deduplication of the
            // data batch carrying the same number.
            if header.count == 0 {
                continue;
            }

            // Duplicate of a record already returned from the tail of an
            // earlier segment.
            if header.seq_num <= self.last_seq_num {
                continue;
            }

            self.last_seq_num = header.seq_num;
            return Ok(Some((&self.record_buf, self.off.clone())));
        }
    }

    /// Close any open segment file. Idempotent; safe to call in any state,
    /// including after exhaustion or a fatal error.
    pub fn close(&mut self) -> WalResult<()> {
        if let Some(open) = self.curr.take() {
            open.reader.into_inner().close()?;
        }
        Ok(())
    }

    /// The position of the last record returned.
    pub fn offset(&self) -> &Offset {
        &self.off
    }

    /// Sequence number of the last batch returned; zero before the first.
    pub fn last_seq_num(&self) -> u64 {
        self.last_seq_num
    }

    /// Advance to the next physical segment file, closing the current one.
    /// Returns `Ok(false)` when every segment has been consumed.
    fn next_file(&mut self) -> WalResult<bool> {
        if let Some(open) = self.curr.take() {
            open.reader.into_inner().close()?;
        }

        let pos = self.next_index;
        let Some(seg) = self.segments.get(pos) else {
            return Ok(false);
        };
        self.next_index = pos + 1;

        let path = seg.path(self.num);
        self.off = Offset {
            physical_file: path.clone(),
            physical_offset: 0,
        };
        let file = seg.dir.fs.open(&path).map_err(|source| WalError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Reading WAL segment");
        self.curr = Some(OpenSegment {
            pos,
            reader: record::Reader::new(file, self.num, path),
        });
        Ok(true)
    }
}
