//! Shared write-to-temp-then-rename helper used by every coordination file.
//!
//! Readers must treat "file missing" and "file exists but JSON-parse-fails"
//! as equivalent to "absent" (spec §3, §9, P6).

use std::path::Path;

use serde::Serialize;

/// Atomically write `value` as JSON to `path`.
///
/// Writes to a sibling `<path>.tmp.<pid>.<random>` file first, then renames
/// over the target. Rename is atomic on the same filesystem, so concurrent
/// readers never observe a partial write.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let contents = serde_json::to_vec(value).map_err(std::io::Error::other)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp_name = format!(
        ".{}.tmp.{}.{:x}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("coord"),
        std::process::id(),
        rand::random::<u32>()
    );
    let tmp_path = dir.join(tmp_name);

    std::fs::write(&tmp_path, &contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and parse a JSON coordination file.
///
/// Any failure (missing file, unreadable, malformed JSON) is reported as
/// `Ok(None)` rather than an error — "absent" is a normal state for every
/// coordination file.
pub fn read_json_lenient<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read(path).ok()?;
    serde_json::from_slice(&contents).ok()
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let value = Sample {
            a: 7,
            b: "hi".into(),
        };
        write_json_atomic(&path, &value).unwrap();
        let read: Sample = read_json_lenient(&path).unwrap();
        assert_eq!(value, read);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let read: Option<Sample> = read_json_lenient(&path);
        assert!(read.is_none());
    }

    #[test]
    fn malformed_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"not json").unwrap();
        let read: Option<Sample> = read_json_lenient(&path);
        assert!(read.is_none());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        write_json_atomic(&path, &Sample { a: 1, b: "x".into() }).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
