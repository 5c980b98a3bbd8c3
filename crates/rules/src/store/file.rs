//! Rule store backed by one JSON file per record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use herald_core::{RuleId, RuleRecord};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::sort_records;
use crate::error::{Result, RuleError};
use crate::ports::{RecordMutation, RuleStore};

/// Stores each record as `<dir>/<id>.json` (pretty-printed).
///
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written record. A store-wide mutex serializes writers.
#[derive(Debug)]
pub struct FileRuleStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRuleStore {
    /// Open (and create if needed) the record directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error(&dir, e))?;
        debug!(dir = %dir.display(), "file rule store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: RuleId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(&self, id: RuleId) -> Result<Option<RuleRecord>> {
        let path = self.record_path(id);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| RuleError::Store(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error(&path, e)),
        }
    }

    async fn write(&self, record: &RuleRecord) -> Result<()> {
        let path = self.record_path(record.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", record.id));
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| RuleError::Store(format!("cannot serialize {}: {e}", record.id)))?;
        fs::write(&tmp, json).await.map_err(|e| store_error(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| store_error(&path, e))
    }

    async fn load_all(&self) -> Result<Vec<RuleRecord>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error(&self.dir, e))?;
        let mut records = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error(&self.dir, e))?
        {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted between listing and reading.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(store_error(&path, e)),
            };
            match serde_json::from_slice::<RuleRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable rule record"),
            }
        }

        sort_records(&mut records);
        Ok(records)
    }
}

fn store_error(path: &Path, e: std::io::Error) -> RuleError {
    RuleError::Store(format!("{}: {e}", path.display()))
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn save(&self, record: &RuleRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(record).await
    }

    async fn find_by_id(&self, id: RuleId) -> Result<Option<RuleRecord>> {
        self.read(id).await
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.owner == owner);
        Ok(records)
    }

    async fn find_active(&self) -> Result<Vec<RuleRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.active);
        Ok(records)
    }

    async fn find_active_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.active && r.owner == owner);
        Ok(records)
    }

    async fn delete(&self, id: RuleId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_error(&path, e)),
        }
    }

    async fn modify(&self, id: RuleId, mutation: RecordMutation) -> Result<Option<RuleRecord>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.read(id).await? else {
            return Ok(None);
        };
        mutation(&mut record);
        self.write(&record).await?;
        Ok(Some(record))
    }
}
