use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use duckdb::Connection;
use miniprof_core::error::{ProfilerError, Result};
use miniprof_core::time::{Clock, SystemClock, from_unix_millis, to_unix_millis};
use serde::Serialize;

use crate::schema::SCHEMA_SQL;

pub const DEFAULT_NAMESPACE: &str = "mini_profile";

/// Result and call-stats storage backed by DuckDB.
///
/// Expiry is evaluated against the injected [`Clock`] on every read, so an
/// expired record is invisible even before retention has deleted it.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
    namespace: String,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreStatus {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub namespace: String,
    pub results_count: usize,
    pub live_results: usize,
    pub call_stats_count: usize,
    pub next_expiry: Option<DateTime<Utc>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| ProfilerError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ProfilerError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=2;")
            .map_err(|e| ProfilerError::Store(format!("failed to set pragmas: {e}")))?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ProfilerError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, db_path: String) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| ProfilerError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            namespace: DEFAULT_NAMESPACE.to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    pub(crate) fn now_millis(&self) -> i64 {
        to_unix_millis(self.clock.now())
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let now = self.now_millis();
        let conn = self.conn();

        let results_count = scalar_usize(&conn, "SELECT COUNT(*) FROM results", None)?;
        let live_results = scalar_usize(
            &conn,
            "SELECT COUNT(*) FROM results WHERE expires_at > ?",
            Some(now),
        )?;
        let call_stats_count = scalar_usize(&conn, "SELECT COUNT(*) FROM call_stats", None)?;
        let next_expiry = conn
            .query_row(
                "SELECT MIN(expires_at) FROM results WHERE expires_at > ?",
                [now],
                |row| row.get::<_, Option<i64>>(0),
            )
            .map_err(|e| ProfilerError::Store(format!("query failed: {e}")))?
            .map(from_unix_millis)
            .transpose()?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStatus {
            db_path: self.db_path.clone(),
            db_size_bytes,
            namespace: self.namespace.clone(),
            results_count,
            live_results,
            call_stats_count,
            next_expiry,
        })
    }
}

fn scalar_usize(conn: &Connection, sql: &str, arg: Option<i64>) -> Result<usize> {
    let res = match arg {
        Some(v) => conn.query_row(sql, [v], |row| row.get::<_, i64>(0)),
        None => conn.query_row(sql, [], |row| row.get::<_, i64>(0)),
    };
    res.map(|v| v as usize)
        .map_err(|e| ProfilerError::Store(format!("query failed: {e}")))
}
