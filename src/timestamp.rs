//! The persisted timestamp marker.
//!
//! A small out-of-band record co-located with the index files, holding the
//! instant of the last successful synchronization. Absence means "never
//! synced" and tells downstream consumers a full resync is required.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SorbusError};
use crate::storage::Storage;

/// Name of the timestamp marker file.
pub const TIMESTAMP_FILE: &str = "timestamp";

/// Read the marker; `None` when the index has never been synced.
pub fn read_timestamp(storage: &dyn Storage) -> Result<Option<DateTime<Utc>>> {
    if !storage.file_exists(TIMESTAMP_FILE)? {
        return Ok(None);
    }
    let data = storage.read_file(TIMESTAMP_FILE)?;
    let text = std::str::from_utf8(&data)
        .map_err(|e| SorbusError::index(format!("invalid timestamp marker: {e}")))?;
    let parsed = DateTime::parse_from_rfc3339(text.trim())
        .map_err(|e| SorbusError::index(format!("invalid timestamp marker: {e}")))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Write the marker; `None` removes it.
pub fn write_timestamp(storage: &dyn Storage, timestamp: Option<DateTime<Utc>>) -> Result<()> {
    match timestamp {
        Some(ts) => {
            let text = ts.to_rfc3339_opts(SecondsFormat::Micros, true);
            storage.write_file(TIMESTAMP_FILE, text.as_bytes())
        }
        None => delete_timestamp(storage),
    }
}

/// Remove the marker if present.
pub fn delete_timestamp(storage: &dyn Storage) -> Result<()> {
    match storage.delete_file(TIMESTAMP_FILE) {
        Ok(()) => Ok(()),
        Err(SorbusError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    #[test]
    fn test_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(read_timestamp(&storage).unwrap(), None);

        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap();
        write_timestamp(&storage, Some(ts)).unwrap();
        assert_eq!(read_timestamp(&storage).unwrap(), Some(ts));
    }

    #[test]
    fn test_write_none_removes_marker() {
        let storage = MemoryStorage::new();
        write_timestamp(&storage, Some(Utc::now())).unwrap();
        assert!(storage.file_exists(TIMESTAMP_FILE).unwrap());

        write_timestamp(&storage, None).unwrap();
        assert!(!storage.file_exists(TIMESTAMP_FILE).unwrap());
        // deleting an absent marker is fine
        delete_timestamp(&storage).unwrap();
    }

    #[test]
    fn test_garbage_marker_is_an_index_error() {
        let storage = MemoryStorage::new();
        storage.write_file(TIMESTAMP_FILE, b"yesterday").unwrap();
        assert!(matches!(
            read_timestamp(&storage).unwrap_err(),
            SorbusError::Index(_)
        ));
    }
}
