//! Streaming JSON loader for oversized queue files (spec §4.D).
//!
//! Activated once a queue file exceeds [`STREAMING_THRESHOLD_BYTES`]. Rather
//! than load the whole document with `serde_json::from_str`, this scans the
//! file in small chunks, locates the `operations` array, and yields one
//! element at a time to a caller-supplied deserializer. Unparseable elements
//! are skipped and counted rather than aborting the whole load.

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use std::io::Read;

use crate::error::{Result, SpecforgeError};

/// Queue files at or below this size are loaded with plain `serde_json`.
pub const STREAMING_THRESHOLD_BYTES: u64 = 1024 * 1024;

/// Bytes read from disk per refill; keeps peak resident scan-buffer usage
/// bounded regardless of overall queue size.
const CHUNK_SIZE: usize = 32 * 1024;

/// Result of a streamed parse: the top-level scalar fields plus whichever
/// operations parsed cleanly.
#[derive(Debug, Clone)]
pub struct StreamedQueue<T> {
    pub version: u64,
    pub last_processed: Option<String>,
    pub operations: Vec<T>,
    pub skipped: usize,
}

/// Whether `path` is large enough to require the streaming loader.
pub fn should_stream(path: &Utf8Path) -> Result<bool> {
    let meta = std::fs::metadata(path.as_std_path())?;
    Ok(meta.len() > STREAMING_THRESHOLD_BYTES)
}

/// Parse a large queue document without materializing it in full.
///
/// Scans for the top-level `version` and `last_processed` scalars, then
/// walks the `operations` array element-by-element, deserializing each into
/// `T`. Elements that fail to deserialize are skipped and tallied rather
/// than failing the whole load.
pub fn load_queue_streaming<T: DeserializeOwned>(path: &Utf8Path) -> Result<StreamedQueue<T>> {
    let file = std::fs::File::open(path.as_std_path())?;
    let mut reader = std::io::BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buf: Vec<u8> = Vec::with_capacity(CHUNK_SIZE * 2);
    let mut consumed: usize = 0;

    fill_more(&mut reader, &mut buf)?;

    let version = scan_top_level_scalar(&buf, "version")
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0);
    let last_processed = scan_top_level_scalar(&buf, "last_processed")
        .map(|raw| raw.trim_matches('"').to_string())
        .filter(|s| s != "null");

    let op_array_start = loop {
        if let Some(pos) = find_operations_array_start(&buf[consumed..]) {
            break consumed + pos;
        }
        if !fill_more(&mut reader, &mut buf)? {
            return Err(SpecforgeError::Validation {
                param: "operations".to_string(),
                reason: "queue file has no operations array".to_string(),
            });
        }
    };
    consumed = op_array_start + 1; // past the '['

    let mut operations = Vec::new();
    let mut skipped = 0usize;

    loop {
        // Skip whitespace and commas.
        while consumed < buf.len() && matches!(buf[consumed], b' ' | b'\t' | b'\n' | b'\r' | b',') {
            consumed += 1;
        }
        if consumed >= buf.len() && !fill_more(&mut reader, &mut buf)? {
            break;
        }
        while consumed < buf.len() && matches!(buf[consumed], b' ' | b'\t' | b'\n' | b'\r' | b',') {
            consumed += 1;
        }
        if consumed >= buf.len() {
            break;
        }
        if buf[consumed] == b']' {
            break;
        }

        let value_end = loop {
            match scan_balanced_value(&buf[consumed..]) {
                Some(len) => break consumed + len,
                None => {
                    if !fill_more(&mut reader, &mut buf)? {
                        return Err(SpecforgeError::Validation {
                            param: "operations".to_string(),
                            reason: "truncated operations array".to_string(),
                        });
                    }
                }
            }
        };

        match serde_json::from_slice::<T>(&buf[consumed..value_end]) {
            Ok(op) => operations.push(op),
            Err(_) => skipped += 1,
        }
        consumed = value_end;

        // Drop already-consumed bytes to keep the live buffer small.
        if consumed > CHUNK_SIZE * 4 {
            buf.drain(0..consumed);
            consumed = 0;
        }
    }

    Ok(StreamedQueue {
        version,
        last_processed,
        operations,
        skipped,
    })
}

fn fill_more(reader: &mut impl Read, buf: &mut Vec<u8>) -> Result<bool> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let n = reader.read(&mut chunk)?;
    if n == 0 {
        return Ok(false);
    }
    buf.extend_from_slice(&chunk[..n]);
    Ok(true)
}

/// Find the `[` that opens the `"operations"` array's value, scanning for
/// the key occurring outside any string literal.
fn find_operations_array_start(buf: &[u8]) -> Option<usize> {
    let needle = b"\"operations\"";
    let key_pos = find_subslice(buf, needle)?;
    let mut i = key_pos + needle.len();
    while i < buf.len() && buf[i] != b':' {
        i += 1;
    }
    i += 1; // past ':'
    while i < buf.len() && matches!(buf[i], b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    if i < buf.len() && buf[i] == b'[' {
        Some(i)
    } else {
        None
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract a scalar JSON value (`"version": 3` or `"last_processed": "..."`)
/// from the header region preceding the operations array, without a full
/// parse.
fn scan_top_level_scalar(buf: &[u8], key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let key_pos = find_subslice(buf, needle.as_bytes())?;
    let mut i = key_pos + needle.len();
    while i < buf.len() && buf[i] != b':' {
        i += 1;
    }
    i += 1;
    while i < buf.len() && matches!(buf[i], b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    if i >= buf.len() {
        return None;
    }
    let start = i;
    if buf[i] == b'"' {
        i += 1;
        while i < buf.len() {
            if buf[i] == b'\\' {
                i += 2;
                continue;
            }
            if buf[i] == b'"' {
                i += 1;
                break;
            }
            i += 1;
        }
    } else {
        while i < buf.len() && !matches!(buf[i], b',' | b'}' | b'\n' | b'\r') {
            i += 1;
        }
    }
    std::str::from_utf8(&buf[start..i]).ok().map(str::to_string)
}

/// Scan one balanced JSON value (object, array, string, or scalar) starting
/// at `buf[0]`, returning its byte length if the full value is present in
/// the buffer, or `None` if more input is needed.
fn scan_balanced_value(buf: &[u8]) -> Option<usize> {
    if buf.is_empty() {
        return None;
    }
    match buf[0] {
        b'{' | b'[' => {
            let (open, close) = if buf[0] == b'{' { (b'{', b'}') } else { (b'[', b']') };
            let mut depth = 0i32;
            let mut i = 0usize;
            let mut in_string = false;
            while i < buf.len() {
                let b = buf[i];
                if in_string {
                    if b == b'\\' {
                        i += 2;
                        continue;
                    }
                    if b == b'"' {
                        in_string = false;
                    }
                    i += 1;
                    continue;
                }
                match b {
                    b'"' => in_string = true,
                    c if c == open => depth += 1,
                    c if c == close => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i + 1);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        b'"' => {
            let mut i = 1;
            while i < buf.len() {
                if buf[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if buf[i] == b'"' {
                    return Some(i + 1);
                }
                i += 1;
            }
            None
        }
        _ => {
            let mut i = 0;
            while i < buf.len() && !matches!(buf[i], b',' | b']' | b'}' | b' ' | b'\t' | b'\n' | b'\r') {
                i += 1;
            }
            if i < buf.len() {
                Some(i)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Op {
        id: String,
        value: i32,
    }

    fn write_queue(dir: &TempDir, ops_json: &str) -> Utf8PathBuf {
        let content = format!(
            "{{\"version\": 7, \"last_processed\": \"2026-01-01T00:00:00Z\", \"operations\": [{ops_json}]}}"
        );
        let path = Utf8PathBuf::from_path_buf(dir.path().join("queue.json")).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_version_and_last_processed() {
        let dir = TempDir::new().unwrap();
        let path = write_queue(&dir, "");
        let result: StreamedQueue<Op> = load_queue_streaming(&path).unwrap();
        assert_eq!(result.version, 7);
        assert_eq!(result.last_processed.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert!(result.operations.is_empty());
    }

    #[test]
    fn parses_multiple_operations() {
        let dir = TempDir::new().unwrap();
        let path = write_queue(
            &dir,
            "{\"id\":\"a\",\"value\":1},{\"id\":\"b\",\"value\":2}",
        );
        let result: StreamedQueue<Op> = load_queue_streaming(&path).unwrap();
        assert_eq!(
            result.operations,
            vec![
                Op { id: "a".into(), value: 1 },
                Op { id: "b".into(), value: 2 },
            ]
        );
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn skips_unparseable_elements_and_counts_them() {
        let dir = TempDir::new().unwrap();
        let path = write_queue(&dir, "{\"id\":\"a\",\"value\":1},{\"bogus\":true}");
        let result: StreamedQueue<Op> = load_queue_streaming(&path).unwrap();
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn handles_strings_containing_brackets() {
        let dir = TempDir::new().unwrap();
        let path = write_queue(&dir, "{\"id\":\"a[]{}\",\"value\":9}");
        let result: StreamedQueue<Op> = load_queue_streaming(&path).unwrap();
        assert_eq!(result.operations[0].id, "a[]{}");
    }

    #[test]
    fn should_stream_reports_size_threshold() {
        let dir = TempDir::new().unwrap();
        let small = Utf8PathBuf::from_path_buf(dir.path().join("small.json")).unwrap();
        std::fs::write(&small, "{}").unwrap();
        assert!(!should_stream(&small).unwrap());

        let large = Utf8PathBuf::from_path_buf(dir.path().join("large.json")).unwrap();
        std::fs::write(&large, vec![b' '; (STREAMING_THRESHOLD_BYTES + 1) as usize]).unwrap();
        assert!(should_stream(&large).unwrap());
    }
}
