//! File-storage gateway for media referenced by catalog records.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

/// Answers whether a referenced media file exists.
pub trait FileStore {
    fn exists(&self, filename: &str) -> io::Result<bool>;
}

/// A media directory on disk.
///
/// The directory tree is listed once and the listing cached. Call
/// [`invalidate`](Self::invalidate) after outside changes, or
/// [`record_write`](Self::record_write) after storing a file through this
/// process.
pub struct DirectoryFileStore {
    root: PathBuf,
    listing: RefCell<Option<HashSet<String>>>,
}

impl DirectoryFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listing: RefCell::new(None),
        }
    }

    /// Drop the cached listing; the next lookup re-reads the directory.
    pub fn invalidate(&self) {
        self.listing.borrow_mut().take();
    }

    /// Note a file written under the root without re-listing.
    pub fn record_write(&self, filename: &str) {
        if let Some(listing) = self.listing.borrow_mut().as_mut() {
            listing.insert(normalize(filename));
        }
    }

    fn list(&self) -> io::Result<HashSet<String>> {
        let mut files = HashSet::new();
        if !self.root.is_dir() {
            return Ok(files);
        }
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    files.insert(normalize(&relative.to_string_lossy()));
                }
            }
        }
        log::debug!("Listed {} files under {}", files.len(), self.root.display());
        Ok(files)
    }
}

impl FileStore for DirectoryFileStore {
    fn exists(&self, filename: &str) -> io::Result<bool> {
        if self.listing.borrow().is_none() {
            let listing = self.list()?;
            *self.listing.borrow_mut() = Some(listing);
        }
        Ok(self
            .listing
            .borrow()
            .as_ref()
            .is_some_and(|l| l.contains(&normalize(filename))))
    }
}

fn normalize(filename: &str) -> String {
    filename.trim().replace('\\', "/").trim_start_matches("./").to_string()
}
