use std::io::*;
use std::path::{Path, PathBuf};

use crate::*;

/// A byte source which is backed by a given root directory.
///
/// Keys are `/`-separated and relative to the root, so `b/c` and `/b/c` name the same file (behavior with `\` is
/// undefined).  Keys which use `..` to climb out of the root are rejected, primarily as a measure to detect bugs.
#[derive(Debug)]
pub struct FilesystemSource {
    root_path: PathBuf,
}

fn conv_path(path: impl AsRef<Path>) -> Result<relative_path::RelativePathBuf> {
    relative_path::RelativePathBuf::from_path(path)
        .map_err(|_| Error::new(ErrorKind::Other, "Invalid path"))
}

impl FilesystemSource {
    pub fn new(root_path: &Path) -> FilesystemSource {
        FilesystemSource {
            root_path: root_path.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Map a key to a path under the root, refusing anything which would land outside of it.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        // On Windows, canonicalize is currently very broken when relative path segments appear in the middle of a
        // path, and stdlib doesn't help us out. Go via `RelativePathBuf` to clean it up.
        let absolute = conv_path(key.trim_start_matches('/'))?.to_logical_path(&self.root_path);
        if !absolute.starts_with(&self.root_path) {
            return Err(Error::new(
                ErrorKind::Other,
                "path is outside the source root directory",
            ));
        }
        Ok(absolute)
    }
}

impl ByteSource for FilesystemSource {
    fn contains(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        std::fs::read(self.resolve(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_source() {
        let tmp_dir = tempfile::tempdir().unwrap();

        // Create a directory under the temporary directory so that we can test relative paths.
        let mut root = tmp_dir.path().to_path_buf();
        root.push("actual_dir");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        let source = FilesystemSource::new(&root);

        std::fs::write(root.join("a"), "aaaa").unwrap();
        std::fs::write(root.join("sub").join("b"), "bbbb").unwrap();
        // Now, we want to write something outside the root.
        std::fs::write(root.parent().unwrap().join("d"), "dddd").unwrap();

        assert!(source.contains("a"));
        assert!(source.contains("sub/b"));
        assert!(source.contains("/sub/b"));
        assert_eq!(source.read("/a").unwrap(), b"aaaa");
        assert!(!source.contains("sub"));
        assert!(!source.contains("c"));
        assert_eq!(source.read("a").unwrap(), b"aaaa");
        assert_eq!(source.read("sub/../sub/b").unwrap(), b"bbbb");
        assert_eq!(
            source.read("c").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        // d exists but is outside, so it must look missing and fail to read with a specific error.
        assert!(!source.contains("../d"));
        let e = source.read("../d").unwrap_err();
        if e.kind() != ErrorKind::Other {
            panic!(
                "Should get an other error for paths outside the source root: {:?}",
                e
            );
        }
    }
}
