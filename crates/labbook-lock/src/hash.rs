//! Blake3 signature computation over files and byte buffers

use std::io;
use std::path::{Path, PathBuf};

use crate::signature::Signature;

/// Hash a file's contents with blake3.
pub fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

/// Signature of a raw byte buffer.
pub fn signature_of_bytes(data: &[u8]) -> Signature {
    Signature::from(blake3::hash(data))
}

/// Signature of a set of files under `root`.
///
/// Entries are keyed by the raw bytes of their path relative to `root`
/// (components joined with `/`) and sorted by that key, so the input order never matters.
/// Each entry contributes its length-framed relative path followed by the
/// digest of its contents: adding, removing or renaming a file changes the
/// result.
pub fn signature_of_files(root: &Path, files: &[PathBuf]) -> io::Result<Signature> {
    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let rel = relative_key(root, path);
        let digest = hash_file(path).map_err(|e| {
            io::Error::new(e.kind(), format!("failed to hash {}: {e}", path.display()))
        })?;
        entries.push((rel, digest));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for (rel, digest) in &entries {
        hasher.update(&(rel.len() as u64).to_le_bytes());
        hasher.update(rel);
        hasher.update(digest.as_bytes());
    }
    Ok(Signature::from(hasher.finalize()))
}

/// Bind a label (e.g. a sample name) into an existing signature.
pub fn signature_with_label(label: &str, inner: &Signature) -> Signature {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(label.len() as u64).to_le_bytes());
    hasher.update(label.as_bytes());
    hasher.update(inner.as_bytes());
    Signature::from(hasher.finalize())
}

/// Non-UTF-8 names are kept byte for byte so distinct names never collide.
fn relative_key(root: &Path, path: &Path) -> Vec<u8> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut key = Vec::new();
    for (i, component) in rel.components().enumerate() {
        if i > 0 {
            key.push(b'/');
        }
        key.extend_from_slice(component.as_os_str().as_encoded_bytes());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "test.txt", b"file content");
        let h = hash_file(&path).unwrap();
        assert_eq!(Signature::from(h), signature_of_bytes(b"file content"));
    }

    #[test]
    fn bytes_signature_differs_on_content() {
        assert_ne!(signature_of_bytes(b"hello"), signature_of_bytes(b"world"));
        assert_eq!(signature_of_bytes(b"hello"), signature_of_bytes(b"hello"));
    }

    #[test]
    fn file_order_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"alpha");
        let b = write(dir.path(), "sub/b.txt", b"beta");
        let c = write(dir.path(), "c.txt", b"gamma");

        let s1 = signature_of_files(dir.path(), &[a.clone(), b.clone(), c.clone()]).unwrap();
        let s2 = signature_of_files(dir.path(), &[c, a, b]).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn extra_file_changes_signature() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"alpha");
        let before = signature_of_files(dir.path(), &[a.clone()]).unwrap();
        let extra = write(dir.path(), "extra.txt", b"");
        let after = signature_of_files(dir.path(), &[a, extra]).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn rename_changes_signature() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"same");
        let before = signature_of_files(dir.path(), &[a.clone()]).unwrap();
        let renamed = dir.path().join("b.txt");
        std::fs::rename(&a, &renamed).unwrap();
        let after = signature_of_files(dir.path(), &[renamed]).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn nested_key_uses_slash_separator() {
        let root = Path::new("/lab/corpus");
        assert_eq!(relative_key(root, &root.join("sub").join("b.txt")), b"sub/b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn rename_between_non_utf8_names_changes_signature() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join(OsStr::from_bytes(b"chunk-\xff"));
        let second = dir.path().join(OsStr::from_bytes(b"chunk-\xfe"));
        // Both names render as "chunk-\u{FFFD}" when converted lossily.
        assert_eq!(
            first.file_name().unwrap().to_string_lossy(),
            second.file_name().unwrap().to_string_lossy()
        );

        std::fs::write(&first, b"same").unwrap();
        let before = signature_of_files(dir.path(), &[first.clone()]).unwrap();
        std::fs::rename(&first, &second).unwrap();
        let after = signature_of_files(dir.path(), &[second]).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn moving_bytes_between_files_changes_signature() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a", b"xy");
        let b = write(dir.path(), "b", b"");
        let s1 = signature_of_files(dir.path(), &[a.clone(), b.clone()]).unwrap();
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"y").unwrap();
        let s2 = signature_of_files(dir.path(), &[a, b]).unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn empty_set_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let s1 = signature_of_files(dir.path(), &[]).unwrap();
        let s2 = signature_of_files(dir.path(), &[]).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        let err = signature_of_files(dir.path(), &[missing]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn label_changes_signature() {
        let inner = signature_of_bytes(b"data");
        let a = signature_with_label("sample-a", &inner);
        let b = signature_with_label("sample-b", &inner);
        assert_ne!(a, b);
        assert_ne!(a, inner);
        assert_eq!(a, signature_with_label("sample-a", &inner));
    }
}
