//! Checksummed record files.
//!
//! Each record is one JSON file:
//!
//! ```json
//! {"checksum": "1a2b3c4d", "data": { ... }}
//! ```
//!
//! where `checksum` is the CRC32C of the serialized `data` value. Files are
//! replaced atomically by writing a `.tmp` sibling and renaming it over the
//! target.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Extension of a complete record file.
pub const RECORD_EXT: &str = "json";

/// Extension of a record file that is still being written.
pub const TEMP_EXT: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    checksum: String,
    data: Value,
}

fn checksum(data: &Value) -> Result<String, StorageError> {
    let bytes = serde_json::to_vec(data)?;
    Ok(format!("{:08x}", crc32c::crc32c(&bytes)))
}

/// Serializes `value` into a checksummed record file at `path`.
pub fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_value(value)?;
    let record = StoredRecord {
        checksum: checksum(&data)?,
        data,
    };
    let bytes = serde_json::to_vec_pretty(&record)?;

    let tmp_path = path.with_extension(TEMP_EXT);
    let mut file = File::create(&tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and verifies a record file.
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path)?;
    let record: StoredRecord = serde_json::from_slice(&bytes)?;

    let actual = checksum(&record.data)?;
    if actual != record.checksum {
        return Err(StorageError::Corruption(format!(
            "{}: checksum mismatch (expected {}, got {})",
            path.display(),
            record.checksum,
            actual
        )));
    }

    Ok(serde_json::from_value(record.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.json");

        write_record(&path, &json!({"id": "doc", "states": []})).unwrap();
        let value: Value = read_record(&path).unwrap();

        assert_eq!(value["id"], "doc");
        assert!(!path.with_extension(TEMP_EXT).exists());
    }

    #[test]
    fn test_tampered_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.json");
        write_record(&path, &json!({"currentState": "draft"})).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("draft", "approved")).unwrap();

        let err = read_record::<Value>(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.json");

        write_record(&path, &json!({"n": 1})).unwrap();
        write_record(&path, &json!({"n": 2})).unwrap();

        let value: Value = read_record(&path).unwrap();
        assert_eq!(value["n"], 2);
    }
}
