// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Segment catalog
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A logical WAL is stored as one or more physical segment files. The first
// segment is `{num:06}.log`; each failover appends a segment
// `{num:06}-{index:03}.log`, possibly in a different directory. The catalog
// scans directories, decodes filenames, and groups segments into ordered
// logical WALs.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{WalError, WalResult};
use crate::fs::Dir;

/// Identifies a logical WAL.
pub type NumWal = u64;

/// Identifies a physical segment within a logical WAL. Zero is the primary
/// segment; each failover increments the index.
pub type SegmentIndex = u32;

/// The file extension used for WAL segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// Build the canonical file name for a segment of the given WAL.
///
/// Index 0 uses the compact form (`000007.log`); failover segments embed
/// their index (`000007-001.log`).
pub fn make_log_filename(num: NumWal, index: SegmentIndex) -> String {
    if index == 0 {
        format!("{num:06}.{SEGMENT_EXTENSION}")
    } else {
        format!("{num:06}-{index:03}.{SEGMENT_EXTENSION}")
    }
}

/// Parse a directory entry name as a WAL segment filename.
///
/// Returns `None` for any name the scanner should ignore: non-WAL files,
/// temporaries, and malformed numbers. Numbers wider than the pad width are
/// accepted.
pub fn parse_log_filename(name: &str) -> Option<(NumWal, SegmentIndex)> {
    let stem = name.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    match stem.split_once('-') {
        None => Some((parse_decimal(stem)?, 0)),
        Some((num, index)) => Some((parse_decimal(num)?, parse_decimal(index)?)),
    }
}

/// Parse an unsigned decimal with no sign, whitespace, or empty string.
fn parse_decimal<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// A single physical file contributing a contiguous (possibly overlapping at
/// the head) range of a logical WAL.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position of this segment within its logical WAL's failover sequence.
    pub index: SegmentIndex,
    /// The directory root holding the segment file.
    pub dir: Dir,
}

impl Segment {
    /// Path of this segment's file for the given WAL number.
    pub fn path(&self, num: NumWal) -> PathBuf {
        self.dir.dirname.join(make_log_filename(num, self.index))
    }
}

/// A logical WAL and the ordered physical segments that make it up.
#[derive(Debug, Clone)]
pub struct LogicalWal {
    /// The logical WAL number.
    pub num: NumWal,
    /// Constituent segments, strictly increasing by index. Gaps are
    /// possible and benign; the reader uses what is present.
    pub segments: Vec<Segment>,
}

/// Find all WAL segment files in the provided directories, grouped into
/// logical WALs ordered by increasing WAL number.
///
/// Fails with [`WalError::DuplicateSegment`] if the same (WAL number,
/// segment index) pair appears in two directories, and with
/// [`WalError::DirList`] if a directory cannot be listed.
pub fn list_logs(dirs: &[Dir]) -> WalResult<Vec<LogicalWal>> {
    let mut wals: Vec<LogicalWal> = Vec::new();
    for dir in dirs {
        let names = dir.fs.list(&dir.dirname).map_err(|source| WalError::DirList {
            dir: dir.dirname.clone(),
            source,
        })?;
        for name in names {
            let Some((num, index)) = parse_log_filename(&name) else {
                continue;
            };
            let i = match wals.binary_search_by_key(&num, |w| w.num) {
                Ok(i) => i,
                Err(i) => {
                    wals.insert(
                        i,
                        LogicalWal {
                            num,
                            segments: Vec::with_capacity(1),
                        },
                    );
                    i
                }
            };
            match wals[i].segments.binary_search_by_key(&index, |s| s.index) {
                Ok(j) => {
                    return Err(WalError::DuplicateSegment {
                        num_wal: num,
                        index,
                        dir_a: dir.dirname.clone(),
                        dir_b: wals[i].segments[j].dir.dirname.clone(),
                    });
                }
                Err(j) => wals[i].segments.insert(
                    j,
                    Segment {
                        index,
                        dir: dir.clone(),
                    },
                ),
            }
        }
    }

    debug!(
        wals = wals.len(),
        dirs = dirs.len(),
        "Discovered logical WALs"
    );

    Ok(wals)
}

/// Look up one logical WAL by number in a `list_logs` result.
pub fn find_log(wals: &[LogicalWal], num: NumWal) -> Option<&LogicalWal> {
    wals.binary_search_by_key(&num, |w| w.num)
        .ok()
        .map(|i| &wals[i])
}
