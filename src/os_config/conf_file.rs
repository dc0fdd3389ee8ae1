//! Plain text config file helpers.
//!
//! The live files are replaced through a sibling temporary file so the OS
//! daemons never read a half written configuration.

use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{error, info};

use crate::error::Result;

/// A text config file at a fixed path.
pub struct ConfFile {
    path: PathBuf,
}

impl ConfFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Reads the whole file, a missing file reads as empty.
    pub fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => {
                error!("Failed to read {:?}, error: {}", self.path, e);
                Err(e).with_context(|| format!("failed to read {:?}", self.path))
            }
        }
    }

    /// Replaces the whole file content.
    pub fn write(&self, content: &str) -> Result<()> {
        info!("Writing config file: {:?}", self.path);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp_path)
            .with_context(|| format!("failed to create {:?}", tmp_path))?;
        if let Err(e) = file.write_all(content.as_bytes()) {
            error!("Failed to write data to file: {:?}, error: {}", tmp_path, e);
            return Err(e.into());
        }
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace {:?}", self.path))?;
        Ok(())
    }
}

/// Copies a file if it exists, returning whether the copy happened.
pub fn copy_if_exists(src: &Path, dest: &Path) -> Result<bool> {
    match fs::copy(src, dest) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(format!("failed to copy {src:?} to {dest:?}")),
    }
}

/// Renames a file if it exists, returning whether the rename happened.
pub fn rename_if_exists(src: &Path, dest: &Path) -> Result<bool> {
    match fs::rename(src, dest) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            Err(e).context(format!("failed to rename {src:?} to {dest:?}"))
        }
    }
}

/// Removes a file if it exists, returning whether it was there.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(format!("failed to remove {path:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfFile::from_path(dir.path().join("missing.conf"));
        assert_eq!(file.read().unwrap(), "");
    }

    #[test]
    fn test_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfFile::from_path(dir.path().join("etc").join("a.conf"));

        file.write("first\n").unwrap();
        file.write("second\n").unwrap();

        assert_eq!(file.read().unwrap(), "second\n");
        assert!(!dir.path().join("etc").join("a.conf.tmp").exists());
    }

    #[test]
    fn test_if_exists_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");

        assert!(!copy_if_exists(&src, &dest).unwrap());
        assert!(!rename_if_exists(&src, &dest).unwrap());
        assert!(!remove_if_exists(&src).unwrap());

        fs::write(&src, "data").unwrap();
        assert!(copy_if_exists(&src, &dest).unwrap());
        assert!(remove_if_exists(&dest).unwrap());
        assert!(rename_if_exists(&src, &dest).unwrap());
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "data");
    }
}
