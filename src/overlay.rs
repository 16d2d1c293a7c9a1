//! The chain of byte sources a new handle is bound against.
//!
//! Archives are searched before loose files so that a pack can override or patch what is on disk.  Within a tier, the
//! first source added wins.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::*;

#[derive(Default)]
pub(crate) struct SourceOverlay {
    /// Archive-tier sources, with the path they were opened from if they came from disk.
    archives: Vec<(Option<PathBuf>, Arc<dyn ByteSource>)>,
    loose: Vec<Arc<dyn ByteSource>>,
}

impl SourceOverlay {
    pub(crate) fn has_archive_path(&self, path: &Path) -> bool {
        self.archives
            .iter()
            .any(|(p, _)| p.as_deref() == Some(path))
    }

    pub(crate) fn push_archive(&mut self, path: Option<PathBuf>, source: Arc<dyn ByteSource>) {
        self.archives.push((path, source));
    }

    pub(crate) fn push_loose(&mut self, source: Arc<dyn ByteSource>) {
        self.loose.push(source);
    }

    /// Find the first source which has `key`.
    pub(crate) fn resolve(&self, key: &str) -> Option<Arc<dyn ByteSource>> {
        self.archives
            .iter()
            .map(|(_, s)| s)
            .chain(self.loose.iter())
            .find(|s| s.contains(key))
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.archives.len() + self.loose.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archives_win_over_loose_files() {
        let loose = Arc::new(MemorySource::new());
        loose.insert("a", b"loose".to_vec());
        loose.insert("b", b"loose".to_vec());
        let first = Arc::new(MemorySource::new());
        first.insert("a", b"first".to_vec());
        let second = Arc::new(MemorySource::new());
        second.insert("a", b"second".to_vec());
        second.insert("c", b"second".to_vec());

        let mut overlay = SourceOverlay::default();
        // Loose goes in first to show that insertion order across tiers doesn't matter.
        overlay.push_loose(loose);
        overlay.push_archive(None, first);
        overlay.push_archive(Some(PathBuf::from("second.pack")), second);
        assert_eq!(overlay.len(), 3);

        let read = |k: &str| overlay.resolve(k).map(|s| s.read(k).unwrap());
        assert_eq!(read("a").as_deref(), Some(&b"first"[..]));
        assert_eq!(read("b").as_deref(), Some(&b"loose"[..]));
        assert_eq!(read("c").as_deref(), Some(&b"second"[..]));
        assert!(read("d").is_none());

        assert!(overlay.has_archive_path(Path::new("second.pack")));
        assert!(!overlay.has_archive_path(Path::new("first.pack")));
    }
}
