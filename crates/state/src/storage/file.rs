use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use super::{validate_key, KeyValueStorage, StorageError};
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file, open_private_truncate};

const RECORD_FILE_EXT: &str = "json";

/// Stores each key as `{dir}/{key}.json`, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create state directory `{}`", dir.display()))?;
        ensure_owner_only_dir(&dir)
            .with_context(|| format!("failed to set owner-only mode on `{}`", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_FILE_EXT}"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        self.dir.join(format!("{key}.tmp.{nonce}"))
    }

    fn write_atomic(&self, key: &str, value: &str) -> io::Result<()> {
        let target_path = self.record_path(key);
        let tmp_path = self.temp_path_for(key);

        let result = (|| {
            let mut file = open_private_truncate(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_data()?;
            drop(file);
            fs::rename(&tmp_path, &target_path)?;
            ensure_owner_only_file(&target_path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        match fs::read_to_string(self.record_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.write_atomic(key, value)
            .map_err(|source| StorageError::Io { key: key.to_string(), source })
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }
}
