//! This module provides a single-document JSON database.
//!
//! The document is read whole and written whole. Writes go to a sibling
//! temporary file which is then renamed over the target, so a reader never
//! observes a partially written document.
//!
//! # Traits
//!
//! - `JsonDbOps`: Defines read and write operations for the document.
//!
//! # Structs
//!
//! - `JsonFileDb`: A file backed document that implements `JsonDbOps`.

use crate::error::{NetError, Result};
use log::{error, info};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

#[cfg(test)]
use mockall::automock;

/// A trait defining operations for a single-document JSON database.
#[cfg_attr(test, automock)]
pub trait JsonDbOps: Send + Sync + 'static {
    /// Reads the document.
    ///
    /// # Returns
    ///
    /// `None` if the document does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `NetError::Persistence` if the document is unreadable or corrupt.
    fn read<ItemType>(&self) -> Result<Option<ItemType>>
    where
        ItemType: DeserializeOwned + 'static;

    /// Atomically replaces the document.
    fn write<ItemType>(&self, data: &ItemType) -> Result<()>
    where
        ItemType: Serialize + 'static;
}

/// A JSON document stored in a file.
pub struct JsonFileDb {
    path: PathBuf,
}

impl JsonFileDb {
    /// Opens the document at the given path, the file may not exist yet.
    pub fn open_from<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl JsonDbOps for JsonFileDb {
    fn read<ItemType>(&self) -> Result<Option<ItemType>>
    where
        ItemType: DeserializeOwned,
    {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Document {:?} not found", self.path);
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to read {:?}, error: {}", self.path, e);
                return Err(NetError::Persistence(format!(
                    "failed to read {:?}: {}",
                    self.path, e
                ))
                .into());
            }
        };

        let item = serde_json::from_str::<ItemType>(&content).map_err(|e| {
            error!("Failed to parse {:?}, error: {}", self.path, e);
            NetError::Persistence(format!(
                "failed to parse {:?}: {}",
                self.path, e
            ))
        })?;

        Ok(Some(item))
    }

    fn write<ItemType>(&self, data: &ItemType) -> Result<()>
    where
        ItemType: Serialize,
    {
        let serialized = serde_json::to_string_pretty(data)
            .map_err(|e| NetError::Persistence(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp_path = self.tmp_path();
        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(serialized.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            error!("Failed to replace {:?}, error: {}", self.path, e);
            NetError::Persistence(format!(
                "failed to replace {:?}: {}",
                self.path, e
            ))
        })?;

        info!("Document {:?} written", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        field: String,
    }

    #[test]
    fn test_read_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let db = JsonFileDb::open_from(dir.path().join("doc.json"));
        assert!(db.read::<Doc>().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let db = JsonFileDb::open_from(&path);

        db.write(&Doc { field: "value".to_string() }).unwrap();

        assert_eq!(
            db.read::<Doc>().unwrap(),
            Some(Doc { field: "value".to_string() })
        );
        assert!(!dir.path().join("doc.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_document_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{\"field\": ").unwrap();
        let db = JsonFileDb::open_from(&path);

        let err = db.read::<Doc>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NetError>(),
            Some(NetError::Persistence(_))
        ));
        // the corrupt file is left untouched
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"field\": ");
    }
}
