// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines all error conditions that can arise while cataloguing and reading
// WAL segments: directory listing failures, duplicate segment files, open
// failures, envelope-level invalid records, and batch-level corruption.
//
// The distinction between `InvalidRecord` and `Corruption` is load-bearing
// for callers. An invalid record is an envelope checksum or framing failure
// and may simply be the torn tail of a segment written during failover. A
// corruption error means the envelope checksums passed but the record itself
// is not a well-formed batch, which only a writer bug can produce.

use std::path::PathBuf;

use thiserror::Error;

use crate::segment::{NumWal, SegmentIndex};

/// Errors that can occur while listing or reading WAL segments.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or closing a segment file.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A WAL directory could not be listed.
    #[error("listing WAL directory {}: {}", .dir.display(), .source)]
    DirList {
        /// The directory that failed to list.
        dir: PathBuf,
        /// The underlying listing error.
        #[source]
        source: std::io::Error,
    },

    /// The same (WAL number, segment index) pair was found in two
    /// directories. Indicates a writer bug or leftover files.
    #[error(
        "duplicate segment index {} for WAL {:06} in {} and {}",
        .index, .num_wal, .dir_a.display(), .dir_b.display()
    )]
    DuplicateSegment {
        /// The logical WAL the segment belongs to.
        num_wal: NumWal,
        /// The segment index that appeared twice.
        index: SegmentIndex,
        /// The directory whose listing triggered the collision.
        dir_a: PathBuf,
        /// The directory already holding the segment.
        dir_b: PathBuf,
    },

    /// A segment file could not be opened.
    #[error("opening WAL segment {}: {}", .path.display(), .source)]
    Open {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying open error.
        #[source]
        source: std::io::Error,
    },

    /// A checksum or framing check failed in the record envelope. Expected
    /// at the tail of a non-final segment written during a failover; fatal
    /// only when the final segment reports it.
    #[error("invalid record at offset {} in {}: {}", .offset, .path.display(), .reason)]
    InvalidRecord {
        /// The segment file containing the offending bytes.
        path: PathBuf,
        /// Byte offset of the offending chunk within the file.
        offset: u64,
        /// What failed to validate.
        reason: &'static str,
    },

    /// The envelope framed a record with valid checksums, but its payload is
    /// shorter than a batch header. The writer truly wrote an invalid batch.
    #[error(
        "corrupt WAL {:06}: invalid batch in segment index {} ({})",
        .num_wal, .index, .path.display()
    )]
    Corruption {
        /// The logical WAL containing the bad batch.
        num_wal: NumWal,
        /// The segment index the batch was read from.
        index: SegmentIndex,
        /// The segment file the batch was read from.
        path: PathBuf,
    },
}

impl WalError {
    /// Returns `true` for envelope-level invalid record errors.
    pub fn is_invalid_record(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. })
    }

    /// Returns `true` for batch-level corruption errors.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;
