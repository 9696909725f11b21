use chrono::NaiveDate;
use pulse_core::metrics::DATE_FORMAT;
use pulse_core::{MetricsSnapshot, StoredRecord};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS system_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time_lapse INTEGER,
        timestamp DATE,
        monitoring_time TEXT,
        cpu_percent REAL,
        gpu_load REAL,
        ram_free_mb REAL,
        ram_total_mb REAL,
        disk_free_gb REAL,
        disk_total_gb REAL
    )";

/// Append-only store of metric snapshots backed by SQLite.
///
/// The connection mutex is the single writer lock shared by the sampling
/// path and user-triggered list/clear.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        info!("Metrics database initialized at {:?}", path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Validate and persist a snapshot. Returns false if it was rejected or
    /// the write failed.
    pub fn append(&self, snapshot: &MetricsSnapshot) -> bool {
        if let Err(e) = snapshot.validate() {
            warn!("Rejected metrics snapshot: {}", e);
            return false;
        }

        match self.insert(snapshot) {
            Ok(id) => {
                debug!(id, "Metrics stored");
                true
            }
            Err(e) => {
                error!("Failed to store metrics: {}", e);
                false
            }
        }
    }

    /// Validate a loosely-typed record and persist it
    pub fn append_value(&self, value: &Value) -> bool {
        match MetricsSnapshot::from_value(value) {
            Ok(snapshot) => self.append(&snapshot),
            Err(e) => {
                warn!("Rejected metrics record: {}", e);
                false
            }
        }
    }

    fn insert(&self, snapshot: &MetricsSnapshot) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        conn.execute(
            "INSERT INTO system_metrics (
                time_lapse, timestamp, monitoring_time, cpu_percent, gpu_load,
                ram_free_mb, ram_total_mb, disk_free_gb, disk_total_gb
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.time_lapse,
                snapshot.captured_on.format(DATE_FORMAT).to_string(),
                snapshot.monitoring_time,
                snapshot.cpu_percent,
                snapshot.gpu_load,
                snapshot.ram_free_mb,
                snapshot.ram_total_mb,
                snapshot.disk_free_gb,
                snapshot.disk_total_gb,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Every record in insertion order; empty if the store cannot be read
    pub fn list_all(&self) -> Vec<StoredRecord> {
        match self.query_all() {
            Ok(records) => {
                debug!(count = records.len(), "Loaded metric records");
                records
            }
            Err(e) => {
                warn!("Failed to read metrics: {}", e);
                Vec::new()
            }
        }
    }

    fn query_all(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut stmt = conn.prepare(
            "SELECT id, time_lapse, timestamp, monitoring_time, cpu_percent, gpu_load,
                    ram_free_mb, ram_total_mb, disk_free_gb, disk_total_gb
             FROM system_metrics ORDER BY id",
        )?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count(&self) -> usize {
        let Ok(conn) = self.conn.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM system_metrics", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }

    /// Delete every record, recreating the table if it has gone missing
    pub fn clear(&self) -> bool {
        match self.try_clear() {
            Ok(()) => {
                info!("Cleared all metrics");
                true
            }
            Err(e) => {
                error!("Failed to clear metrics: {}", e);
                false
            }
        }
    }

    fn try_clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let table: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'system_metrics'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match table {
            Some(_) => {
                conn.execute("DELETE FROM system_metrics", [])?;
            }
            None => {
                warn!("Metrics table missing, recreating");
                conn.execute_batch(CREATE_TABLE)?;
            }
        }
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let date: String = row.get(2)?;
    let captured_on = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(StoredRecord {
        id: row.get(0)?,
        snapshot: MetricsSnapshot {
            time_lapse: row.get(1)?,
            captured_on,
            monitoring_time: row.get(3)?,
            cpu_percent: row.get(4)?,
            gpu_load: row.get(5)?,
            ram_free_mb: row.get(6)?,
            ram_total_mb: row.get(7)?,
            disk_free_gb: row.get(8)?,
            disk_total_gb: row.get(9)?,
        },
    })
}
