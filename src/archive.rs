//! Read-only access to pack archives.
//!
//! An archive is a single file with an index at the front:
//!
//! ```text
//! u32 count
//! count * { u32 path_len, [u8; path_len] path, u32 size, u32 offset }
//! data...
//! ```
//!
//! All integers are little-endian and `offset` is absolute within the file.  The index is read once when the archive
//! is opened; file contents are read from disk whenever a key is asked for, so an archive costs little memory until
//! something in it is actually loaded.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::*;

#[derive(Copy, Clone, Debug)]
struct ArchiveEntry {
    offset: u64,
    size: u64,
}

#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    entries: HashMap<String, ArchiveEntry, ahash::RandomState>,
}

fn invalid(msg: String) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn to_u32(value: usize, what: &str) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| invalid(format!("{} does not fit in an archive", what)))
}

impl Archive {
    /// Open an archive and read its index.
    pub fn open(path: &Path) -> Result<Archive, Error> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let count = read_u32(&mut reader)?;
        let mut entries: HashMap<String, ArchiveEntry, ahash::RandomState> = Default::default();
        for _ in 0..count {
            let path_len = read_u32(&mut reader)? as u64;
            if path_len > file_len {
                return Err(invalid(format!(
                    "entry path length {} exceeds archive size",
                    path_len
                )));
            }
            let mut name = vec![0u8; path_len as usize];
            reader.read_exact(&mut name)?;
            let name = String::from_utf8(name)
                .map_err(|_| invalid("entry path is not UTF-8".to_string()))?;

            let size = read_u32(&mut reader)? as u64;
            let offset = read_u32(&mut reader)? as u64;
            if offset + size > file_len {
                return Err(invalid(format!(
                    "entry {:?} runs past the end of the archive",
                    name
                )));
            }

            if entries.insert(name.clone(), ArchiveEntry { offset, size }).is_some() {
                log::warn!("{:?} appears twice in {}", name, path.display());
            }
        }

        log::info!("Opened archive {} ({} files)", path.display(), entries.len());
        Ok(Archive {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|x| x.as_str())
    }
}

impl ByteSource for Archive {
    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, Error> {
        let entry = self.entries.get(key).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("{:?} is not in {}", key, self.path.display()),
            )
        })?;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut out = vec![0u8; entry.size as usize];
        file.read_exact(&mut out)?;
        Ok(out)
    }
}

/// Write `files` as an archive at `path`, in the layout [Archive::open] reads.
pub fn write_archive<'a, I>(path: &Path, files: I) -> Result<(), Error>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let files = files.into_iter().collect::<Vec<_>>();

    let header_len = 4 + files
        .iter()
        .map(|(name, _)| 12 + name.len())
        .sum::<usize>();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&to_u32(files.len(), "file count")?.to_le_bytes())?;

    let mut offset = header_len;
    for (name, data) in files.iter() {
        writer.write_all(&to_u32(name.len(), "path length")?.to_le_bytes())?;
        writer.write_all(name.as_bytes())?;
        writer.write_all(&to_u32(data.len(), "file size")?.to_le_bytes())?;
        writer.write_all(&to_u32(offset, "file offset")?.to_le_bytes())?;
        offset += data.len();
    }

    for (_, data) in files.iter() {
        writer.write_all(data)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.pack");
        let big = vec![0xabu8; 4096];
        write_archive(
            &path,
            vec![
                ("textures/a.tex", &big[..]),
                ("sounds/b.wav", &b"bbbb"[..]),
                ("empty", &b""[..]),
            ],
        )
        .unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.len(), 3);
        let mut keys = archive.keys().collect::<Vec<_>>();
        keys.sort_unstable();
        assert_eq!(keys, vec!["empty", "sounds/b.wav", "textures/a.tex"]);

        assert!(archive.contains("sounds/b.wav"));
        assert!(!archive.contains("sounds/c.wav"));
        assert_eq!(archive.read("textures/a.tex").unwrap(), big);
        assert_eq!(archive.read("sounds/b.wav").unwrap(), b"bbbb");
        assert!(archive.read("empty").unwrap().is_empty());
        assert_eq!(
            archive.read("missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_truncated_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pack");
        write_archive(&path, vec![("a", &b"abcdefgh"[..])]).unwrap();

        // Chop the data off so the entry points past the end.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let e = Archive::open(&path).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let e = Archive::open(&dir.path().join("nope.pack")).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }
}
