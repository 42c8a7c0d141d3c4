use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{map_io_err, EditError, EditResult};

/// File content together with the digest it had when read
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub text: String,
    pub digest: String,
}

/// Read a whole UTF-8 file and remember its digest
pub fn read_snapshot(path: impl AsRef<Path>) -> EditResult<Snapshot> {
    let path = path.as_ref();
    debug!("Reading file: {}", path.display());

    let text = fs::read_to_string(path).map_err(map_io_err(path))?;
    let digest = calculate_string_hash(&text);

    Ok(Snapshot {
        path: path.to_path_buf(),
        text,
        digest,
    })
}

/// SHA-256 of a string, hex encoded
pub fn calculate_string_hash(content: &str) -> String {
    calculate_bytes_hash(content.as_bytes())
}

fn calculate_bytes_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's current bytes, hex encoded
pub fn calculate_file_hash(path: impl AsRef<Path>) -> EditResult<String> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(map_io_err(path))?;
    Ok(calculate_bytes_hash(&content))
}

/// Replace `path` with `content` atomically.
///
/// The content goes to a temporary file in the same directory, is flushed and
/// synced, and only then renamed over `path`. If `expected_digest` is given the
/// current file must still hash to it right before the rename, otherwise the
/// write is abandoned with `ConcurrentModification`. On any error the temporary
/// file is removed and `path` is left as it was.
pub fn write_atomic(path: impl AsRef<Path>, content: &str, expected_digest: Option<&str>) -> EditResult<()> {
    write_atomic_with(path.as_ref(), expected_digest, |file| {
        file.write_all(content.as_bytes())
    })
}

/// [`write_atomic`] with a caller-supplied body writer
pub(crate) fn write_atomic_with<F>(path: &Path, expected_digest: Option<&str>, write_body: F) -> EditResult<()>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    debug!("Writing file atomically: {}", path.display());

    // Write through symlinks: the rename must land on the link's target
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(EditError::io_error(e, Some(path))),
    };
    let path = resolved.as_path();

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(map_io_err(parent))?;

    // keep the mode of the file being replaced
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(map_io_err(temp.path()))?;
    }

    write_body(temp.as_file_mut()).map_err(map_io_err(temp.path()))?;
    temp.as_file_mut().flush().map_err(map_io_err(temp.path()))?;
    temp.as_file().sync_all().map_err(map_io_err(temp.path()))?;

    if let Some(expected) = expected_digest {
        let current = calculate_file_hash(path)?;
        if current != expected {
            warn!("File {} was modified since it was read, not writing", path.display());
            return Err(EditError::ConcurrentModification {
                path: path.to_path_buf(),
            });
        }
    }

    temp.persist(path)
        .map_err(|e| EditError::io_error(e.error, Some(path)))?;

    debug!("Replaced {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn test_read_and_write_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let content = "first\n\n  third\r\nno newline at end";
        fs::write(&path, "old").unwrap();

        write_atomic(&path, content, None).unwrap();
        let snapshot = read_snapshot(&path).unwrap();

        assert_eq!(snapshot.text, content);
        assert_eq!(snapshot.digest, calculate_file_hash(&path).unwrap());
        assert_eq!(entries(dir.path()), vec![path]);
    }

    #[test]
    fn test_failed_write_leaves_original_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "line 1\nline 2\n").unwrap();
        let before = calculate_file_hash(&path).unwrap();

        // half the body goes out, then the disk "fills up"
        let result = write_atomic_with(&path, None, |file| {
            file.write_all(b"line 1\nli")?;
            Err(io::Error::other("No space left on device"))
        });

        assert!(matches!(result, Err(EditError::Io { .. })));
        assert_eq!(calculate_file_hash(&path).unwrap(), before);
        assert_eq!(entries(dir.path()), vec![path]);
    }

    #[test]
    fn test_digest_mismatch_aborts_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "v1\n").unwrap();
        let stale = calculate_string_hash("v0\n");

        let err = write_atomic(&path, "v2\n", Some(&stale)).unwrap_err();

        assert!(matches!(err, EditError::ConcurrentModification { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "v1\n");
        assert_eq!(entries(dir.path()), vec![path]);
    }

    #[test]
    fn test_missing_file_is_io_error_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        let err = read_snapshot(&path).unwrap_err();
        match err {
            EditError::Io { source, path: Some(p) } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
                assert_eq!(p, path);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, "echo hi\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&path, "echo bye\n", None).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_goes_through_symlink() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("real.tsx");
        let link = dir.path().join("link.tsx");
        fs::write(&target, "old\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let digest = calculate_file_hash(&link).unwrap();

        write_atomic(&link, "new\n", Some(&digest)).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
        assert_eq!(entries(dir.path()), vec![link, target]);
    }
}
