//! Include/ignore matching for watched paths

use regex::Regex;
use std::path::Path;

use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Regex,
    ignore: Regex,
}

impl PathFilter {
    pub fn new(include: &str, ignore: &str) -> Result<Self> {
        Ok(Self {
            include: Regex::new(include)?,
            ignore: Regex::new(ignore)?,
        })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.is_match(&path.to_string_lossy())
    }

    /// A change to this path should trigger a restart
    pub fn should_signal(&self, path: &Path) -> bool {
        self.include.is_match(&path.to_string_lossy()) && !self.is_ignored(path)
    }

    /// This path should be registered with the watcher. Directories are
    /// registered even when the include pattern does not match them.
    pub fn should_watch(&self, path: &Path, is_dir: bool) -> bool {
        (is_dir || self.include.is_match(&path.to_string_lossy())) && !self.is_ignored(path)
    }
}
