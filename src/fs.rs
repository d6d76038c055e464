// SPDX-License-Identifier: PMPL-1.0-or-later
//
// failwal - Filesystem capability surface
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The reader only needs three filesystem operations: list a directory, join
// a path (provided by `std::path`), and open a file for sequential reading.
// They are expressed as a small trait so failover roots on different storage
// backends can be read through one API. `StdFs` is the `std::fs`
// implementation used in production and tests.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open segment file positioned for sequential reads.
pub trait File: Read {
    /// Close the file, surfacing any error the platform reports on release.
    fn close(self: Box<Self>) -> io::Result<()>;
}

impl File for fs::File {
    fn close(self: Box<Self>) -> io::Result<()> {
        // Read-only handles release on drop.
        drop(self);
        Ok(())
    }
}

/// Minimal filesystem operations needed to discover and read WAL segments.
pub trait FileSystem: Send + Sync {
    /// List the entry names of a directory.
    fn list(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Open a file for sequential reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn File>>;
}

/// The default local-filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl FileSystem for StdFs {
    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn File>> {
        Ok(Box::new(fs::File::open(path)?))
    }
}

/// A directory root in which WAL segment files may reside.
///
/// Failover places segments of one logical WAL in more than one root, so a
/// root carries its own filesystem handle alongside the directory name.
#[derive(Clone)]
pub struct Dir {
    /// The filesystem the directory lives on.
    pub fs: Arc<dyn FileSystem>,
    /// The directory path within that filesystem.
    pub dirname: PathBuf,
}

impl Dir {
    /// A root on the local filesystem.
    pub fn new(dirname: impl Into<PathBuf>) -> Self {
        Self {
            fs: Arc::new(StdFs),
            dirname: dirname.into(),
        }
    }
}

impl fmt::Debug for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dir").field("dirname", &self.dirname).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_std_fs_lists_entries() {
        let dir = TempDir::new().unwrap();
        fs::File::create(dir.path().join("a.log")).unwrap();
        fs::File::create(dir.path().join("b.txt")).unwrap();

        let mut names = StdFs.list(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, ["a.log", "b.txt"]);
    }

    #[test]
    fn test_std_fs_list_missing_dir_errors() {
        assert!(StdFs.list(Path::new("/nonexistent/wal/dir")).is_err());
    }

    #[test]
    fn test_std_fs_open_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.log");
        fs::File::create(&path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let mut file = StdFs.open(&path).unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"hello");
        file.close().unwrap();
    }

    #[test]
    fn test_dir_debug_omits_fs_handle() {
        let dir = Dir::new("/data/wal");
        let repr = format!("{dir:?}");
        assert!(repr.contains("/data/wal"));
    }
}
