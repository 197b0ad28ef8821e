//! Atomic, durable writes for the JSON artifacts specforge shares with other
//! processes on disk (spec §4.B). Every write goes through a temp file in the
//! same directory, is fsynced, then atomically renamed into place so a reader
//! never observes a partially-written file.

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::error::{Result, SpecforgeError};

/// Size ceiling for a whole-document JSON read. Files larger than this route
/// to the streaming loader (§4.D) instead.
pub const JSON_READ_CEILING_BYTES: u64 = 10 * 1024 * 1024;

/// Outcome of an atomic write, useful for logging/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicWriteResult {
    pub bytes_written: usize,
    pub used_cross_filesystem_fallback: bool,
}

/// Write `content` to `path` atomically: normalize line endings to `\n`,
/// write to a sibling temp file, fsync, then rename over `path`.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = path
        .parent()
        .map(|p| p.as_std_path())
        .unwrap_or_else(|| std::path::Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(normalized.as_bytes())?;
    tmp.as_file().sync_all()?;

    let used_fallback = atomic_rename(tmp, path.as_std_path())?;

    Ok(AtomicWriteResult {
        bytes_written: normalized.len(),
        used_cross_filesystem_fallback: used_fallback,
    })
}

/// Normalize all CRLF/CR line endings to LF. specforge's JSON and Markdown
/// artifacts are always LF on disk regardless of authoring platform.
fn normalize_line_endings(content: &str) -> String {
    if !content.contains('\r') {
        return content.to_string();
    }
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Persist `tmp` over `dest`. Returns `true` if the cross-filesystem copy
/// fallback was used. On Windows, retries the rename with exponential
/// backoff since another process (an editor, an antivirus scanner) may hold
/// a transient handle on the destination.
fn atomic_rename(tmp: NamedTempFile, dest: &std::path::Path) -> Result<bool> {
    #[cfg(windows)]
    {
        let mut delay = Duration::from_millis(10);
        let mut attempt = 0;
        let mut tmp = tmp;
        loop {
            match tmp.persist(dest) {
                Ok(_) => return Ok(false),
                Err(e) if attempt < 4 => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "atomic rename retry");
                    tmp = e.file;
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_millis(250));
                    attempt += 1;
                }
                Err(e) => {
                    if is_cross_filesystem_error(&e.error) {
                        return cross_filesystem_copy_from_path(e.file.path(), dest).map(|()| true);
                    }
                    return Err(SpecforgeError::Io(e.error));
                }
            }
        }
    }

    #[cfg(not(windows))]
    {
        match tmp.persist(dest) {
            Ok(_) => Ok(false),
            Err(e) => {
                if is_cross_filesystem_error(&e.error) {
                    cross_filesystem_copy_from_path(e.file.path(), dest).map(|()| true)
                } else {
                    Err(SpecforgeError::Io(e.error))
                }
            }
        }
    }
}

/// `true` if `err` is EXDEV (rename across filesystem boundaries), which
/// `rename(2)` cannot perform directly.
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

/// Fallback for renames that cross filesystem boundaries: copy the temp
/// file's contents to `dest`, fsync, then replace. Not as atomic as a true
/// rename but avoids losing the write entirely.
fn cross_filesystem_copy_from_path(src: &std::path::Path, dest: &std::path::Path) -> Result<()> {
    debug!(?src, ?dest, "falling back to cross-filesystem copy");
    let bytes = std::fs::read(src)?;
    let tmp_dest = dest.with_extension("tmp-xfs");
    {
        let mut f = File::create(&tmp_dest)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_dest, dest)?;
    Ok(())
}

/// Read a file's contents, tolerating CRLF line endings written by other
/// tools without requiring a prior normalization pass.
pub fn read_file_with_crlf_tolerance(path: &Utf8Path) -> Result<String> {
    let raw = std::fs::read_to_string(path.as_std_path())?;
    Ok(normalize_line_endings(&raw))
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<AtomicWriteResult> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| SpecforgeError::Fatal(format!("failed to serialize {path}: {e}")))?;
    write_file_atomic(path, &rendered)
}

/// Read and parse a JSON document, enforcing the §4.B size ceiling and BOM
/// tolerance. On parse failure the corrupt file is renamed aside and `None`
/// is returned so the caller can substitute an empty default.
pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>> {
    let meta = std::fs::metadata(path.as_std_path())?;
    if meta.len() > JSON_READ_CEILING_BYTES {
        return Err(SpecforgeError::Validation {
            param: "path".to_string(),
            reason: format!("{path} exceeds the {JSON_READ_CEILING_BYTES}-byte read ceiling"),
        });
    }

    let raw = std::fs::read(path.as_std_path())?;
    let without_bom = strip_utf8_bom(&raw);

    match serde_json::from_slice::<T>(without_bom) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            error!(?path, error = %e, "corrupt JSON document, quarantining");
            quarantine_corrupt_file(path)?;
            Ok(None)
        }
    }
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
    bytes.strip_prefix(&BOM).unwrap_or(bytes)
}

/// Rename a corrupt document to `<stem>.corrupted_<epoch>.<ext>` so the
/// original bytes are preserved for forensics without blocking future loads.
fn quarantine_corrupt_file(path: &Utf8Path) -> Result<()> {
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let stem = path.file_stem().unwrap_or("document");
    let ext = path.extension().unwrap_or("json");
    let quarantined_name = format!("{stem}.corrupted_{epoch}.{ext}");
    let quarantined = path
        .parent()
        .map(|p| p.join(&quarantined_name))
        .unwrap_or_else(|| Utf8Path::new(&quarantined_name).to_path_buf());

    std::fs::rename(path.as_std_path(), quarantined.as_std_path())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn writes_basic_content() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.json");
        write_file_atomic(&path, "{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn normalizes_crlf_on_write() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.txt");
        write_file_atomic(&path, "line1\r\nline2\r\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line1\nline2\n");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "nested/deep/out.json");
        write_file_atomic(&path, "{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.json");
        write_file_atomic(&path, "first").unwrap();
        write_file_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn read_tolerates_crlf() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "crlf.txt");
        std::fs::write(&path, "a\r\nb\r\n").unwrap();
        assert_eq!(read_file_with_crlf_tolerance(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn writes_empty_content() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "empty.json");
        let result = write_file_atomic(&path, "").unwrap();
        assert_eq!(result.bytes_written, 0);
    }

    #[test]
    fn writes_large_content() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "large.json");
        let content = "x".repeat(1024 * 1024);
        let result = write_file_atomic(&path, &content).unwrap();
        assert_eq!(result.bytes_written, content.len());
    }

    #[test]
    fn writes_unicode_content() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "unicode.json");
        write_file_atomic(&path, "{\"name\":\"\u{1F980}\u{0301}\u{00e9}caf\u{00e9}\"}").unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("caf"));
    }

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn json_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "sample.json");
        let value = Sample { name: "a".into(), count: 3 };
        write_json(&path, &value).unwrap();
        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn read_json_tolerates_bom() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "bom.json");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"{\"name\":\"a\",\"count\":1}");
        std::fs::write(&path, bytes).unwrap();
        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Sample { name: "a".into(), count: 1 });
    }

    #[test]
    fn read_json_quarantines_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "broken.json");
        std::fs::write(&path, "{not valid json").unwrap();
        let loaded: Option<Sample> = read_json(&path).unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists());
        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupted_"))
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[test]
    fn read_json_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "huge.json");
        std::fs::write(&path, vec![b' '; (JSON_READ_CEILING_BYTES + 1) as usize]).unwrap();
        let err = read_json::<Sample>(&path).unwrap_err();
        assert!(matches!(err, SpecforgeError::Validation { .. }));
    }
}
