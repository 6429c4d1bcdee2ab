// src/rl/persistence.rs
//! Save/load of learned Q-tables as flat, checksummed records.
//!
//! Persistence runs between episodes only; a training loop never interleaves
//! a save with an in-flight update.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use super::q_table::{QTable, QTableRow};
use crate::errors::{PlpError, PlpResult};

pub const FORMAT_VERSION: u32 = 1;

/// Provenance stored next to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub run_id: Option<String>,
    pub episodes_trained: usize,
    pub epsilon: f64,
}

/// On-disk envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTable {
    pub format_version: u32,
    pub table_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub metadata: TableMetadata,
    pub default_value: f64,
    pub entry_count: usize,
    /// Hex SHA-256 over the JSON encoding of `rows`.
    pub checksum: String,
    pub rows: Vec<QTableRow>,
}

impl PersistedTable {
    pub fn from_table(table: &QTable, metadata: &TableMetadata) -> PlpResult<Self> {
        let rows = table.to_rows();
        let checksum = rows_checksum(&rows)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            table_id: Uuid::new_v4(),
            saved_at: Utc::now(),
            metadata: metadata.clone(),
            default_value: table.default_value(),
            entry_count: rows.len(),
            checksum,
            rows,
        })
    }

    /// Verifies version, row count and checksum, then rebuilds the table.
    pub fn into_table(self) -> PlpResult<QTable> {
        if self.format_version != FORMAT_VERSION {
            return Err(PlpError::persistence(
                format!(
                    "unsupported table format version {} (expected {})",
                    self.format_version, FORMAT_VERSION
                ),
                None,
            ));
        }
        if self.entry_count != self.rows.len() {
            return Err(PlpError::persistence(
                format!(
                    "entry count {} does not match {} stored rows",
                    self.entry_count,
                    self.rows.len()
                ),
                None,
            ));
        }
        let checksum = rows_checksum(&self.rows)?;
        if checksum != self.checksum {
            return Err(PlpError::persistence(
                format!("checksum mismatch for table {}", self.table_id),
                None,
            ));
        }
        QTable::from_rows(self.default_value, &self.rows)
    }
}

fn rows_checksum(rows: &[QTableRow]) -> PlpResult<String> {
    let encoded = serde_json::to_vec(rows)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Storage medium for learned tables.
pub trait QTableStore {
    fn save(&self, table: &QTable, metadata: &TableMetadata) -> PlpResult<()>;

    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> PlpResult<Option<QTable>>;

    fn describe(&self) -> String;
}

/// Single JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "q_table.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QTableStore for JsonFileStore {
    fn save(&self, table: &QTable, metadata: &TableMetadata) -> PlpResult<()> {
        let persisted = PersistedTable::from_table(table, metadata)?;
        let encoded = serde_json::to_vec_pretty(&persisted)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PlpError::persistence_io("failed to create table directory", parent.to_path_buf(), e)
            })?;
        }

        let tmp = self.temp_path();
        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()
        };
        write_tmp().map_err(|e| PlpError::persistence_io("failed to write table", tmp.clone(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            PlpError::persistence_io("failed to move table into place", self.path.clone(), e)
        })?;

        info!(
            "💾 Saved Q-table {} ({} entries) to {}",
            persisted.table_id,
            persisted.entry_count,
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> PlpResult<Option<QTable>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)
            .map_err(|e| PlpError::persistence_io("failed to read table", self.path.clone(), e))?;
        let persisted: PersistedTable = serde_json::from_slice(&bytes).map_err(|e| {
            PlpError::Persistence {
                message: "table file is not a valid persisted table".to_string(),
                path: Some(self.path.clone()),
                source: Some(Box::new(e)),
            }
        })?;
        let table_id = persisted.table_id;
        let table = persisted.into_table().map_err(|e| match e {
            PlpError::Persistence { message, source, .. } => PlpError::Persistence {
                message,
                path: Some(self.path.clone()),
                source,
            },
            other => other,
        })?;
        info!(
            "Loaded Q-table {} ({} entries) from {}",
            table_id,
            table.len(),
            self.path.display()
        );
        Ok(Some(table))
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

/// In-process store holding the last saved envelope.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<PersistedTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_saved(&self) -> Option<PersistedTable> {
        self.slot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl QTableStore for MemoryStore {
    fn save(&self, table: &QTable, metadata: &TableMetadata) -> PlpResult<()> {
        let persisted = PersistedTable::from_table(table, metadata)?;
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| PlpError::persistence("memory store lock poisoned", None))?;
        *guard = Some(persisted);
        Ok(())
    }

    fn load(&self) -> PlpResult<Option<QTable>> {
        let guard = self
            .slot
            .lock()
            .map_err(|_| PlpError::persistence("memory store lock poisoned", None))?;
        guard.clone().map(PersistedTable::into_table).transpose()
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

/// How the starting table was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadOutcome {
    Loaded { entries: usize },
    /// The store had no table yet.
    Fresh,
    /// Loading failed; training proceeds from a fresh table.
    FreshAfterFailure { reason: String },
}

/// Loads the stored table, or creates an empty one. A failed load is logged
/// and reported through [`LoadOutcome::FreshAfterFailure`].
pub fn load_or_create(store: &dyn QTableStore, initial_q_value: f64) -> (QTable, LoadOutcome) {
    match store.load() {
        Ok(Some(table)) => {
            let entries = table.len();
            (table, LoadOutcome::Loaded { entries })
        }
        Ok(None) => {
            info!("No existing Q-table in {}. Starting fresh.", store.describe());
            (QTable::new(initial_q_value), LoadOutcome::Fresh)
        }
        Err(e) => {
            warn!(
                "Could not load Q-table from {}: {}. Starting with a fresh table.",
                store.describe(),
                e
            );
            (
                QTable::new(initial_q_value),
                LoadOutcome::FreshAfterFailure {
                    reason: e.to_string(),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::StudentState;
    use crate::models::student_profile::KolbStyle;

    fn sample_table() -> QTable {
        let mut table = QTable::new(0.5);
        for level in 0..3u8 {
            let state = StudentState {
                motivation: level % 2,
                self_efficacy: 1,
                aptitude: 0,
                style: KolbStyle::Divergent,
                mastery: [level, 1, 0, 2],
            };
            table.set(state, level as u16, level as f64 * 0.25 - 0.1);
            table.set(state, 40, -1.5);
        }
        table
    }

    fn metadata() -> TableMetadata {
        TableMetadata {
            run_id: Some("run-1".to_string()),
            episodes_trained: 10,
            epsilon: 0.2,
        }
    }

    #[test]
    fn test_json_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("tables").join("q.json"));
        assert!(store.load().unwrap().is_none());

        let table = sample_table();
        store.save(&table, &metadata()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.default_value(), 0.5);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_tampered_file_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let store = JsonFileStore::new(&path);
        store.save(&sample_table(), &metadata()).unwrap();

        let mut persisted: PersistedTable =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        persisted.rows[0].value += 1.0;
        fs::write(&path, serde_json::to_vec(&persisted).unwrap()).unwrap();

        match store.load() {
            Err(PlpError::Persistence { path: Some(p), message, .. }) => {
                assert_eq!(p, path);
                assert!(message.contains("checksum"));
            }
            other => panic!("expected persistence failure, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_file_reports_failure_and_load_or_create_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        fs::write(&path, b"not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.load(), Err(PlpError::Persistence { .. })));
        let (table, outcome) = load_or_create(&store, 0.0);
        assert!(table.is_empty());
        assert!(matches!(outcome, LoadOutcome::FreshAfterFailure { .. }));
    }

    #[test]
    fn test_memory_store_round_trip_and_outcomes() {
        let store = MemoryStore::new();
        let (_, outcome) = load_or_create(&store, 0.0);
        assert_eq!(outcome, LoadOutcome::Fresh);

        let table = sample_table();
        store.save(&table, &metadata()).unwrap();
        let (loaded, outcome) = load_or_create(&store, 0.0);
        assert_eq!(loaded, table);
        assert_eq!(outcome, LoadOutcome::Loaded { entries: 6 });
        assert_eq!(store.last_saved().unwrap().metadata, metadata());
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let mut persisted = PersistedTable::from_table(&sample_table(), &metadata()).unwrap();
        persisted.format_version = 99;
        assert!(matches!(persisted.into_table(), Err(PlpError::Persistence { .. })));
    }
}
