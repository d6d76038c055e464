// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Failover-aware WAL reading
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reconstructs a single logical write-ahead log from the physical segment
// files a failover-capable writer leaves behind. When the primary WAL
// directory stalls, the writer switches to a new segment in a secondary
// directory while the original may still be flushing; records inflight at
// the seam may complete in the old segment, the new one, or both. This
// crate merges an ordered sequence of such segments back into the exact
// stream of committed batches: duplicates at segment seams are filtered by
// batch sequence number, torn tails of non-final segments are skipped, and
// real corruption is reported unambiguously.
//
// # Architecture
//
// A **logical WAL** is identified by a number and stored as one or more
// **segments**: `000007.log` for the primary, `000007-001.log` and up for
// failover segments, possibly in different directories. Each segment is a
// sequence of 32 KiB blocks holding length-prefixed, CRC32-protected
// chunks; one record spans one or more chunks. Every record carries an
// encoded batch whose fixed 12-byte prefix holds the batch's sequence
// number and operation count.
//
// - [`segment`] -- filename codec and the catalog that groups segment files
//   into ordered logical WALs ([`list_logs`]).
// - [`record`] -- the chunked, checksummed record envelope.
// - [`batch`] -- the batch header prefix decoder.
// - [`reader`] -- [`WalReader`], the merged view over one logical WAL.
// - [`fs`] -- the filesystem capability surface ([`Dir`], [`FileSystem`]).
// - [`error`] -- the [`WalError`] taxonomy.
//
// ## Usage
//
// ```no_run
// use failwal::{list_logs, Dir, WalReader};
//
// let dirs = [Dir::new("/data/wal"), Dir::new("/data/wal-failover")];
// let wals = list_logs(&dirs).unwrap();
// for wal in &wals {
//     let mut reader = WalReader::new(wal.num, wal.segments.clone());
//     while let Some((record, offset)) = reader.next_record().unwrap() {
//         println!("{} bytes at {:?}", record.len(), offset);
//     }
//     reader.close().unwrap();
// }
// ```

pub mod batch;
pub mod error;
pub mod fs;
pub mod reader;
pub mod record;
pub mod segment;

// Re-export the primary public API for ergonomic imports.
pub use batch::BatchHeader;
pub use error::{WalError, WalResult};
pub use fs::{Dir, FileSystem, StdFs};
pub use reader::{Offset, WalReader};
pub use segment::{find_log, list_logs, LogicalWal, NumWal, Segment, SegmentIndex};
