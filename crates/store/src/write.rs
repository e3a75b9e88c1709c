use std::time::Duration;

use duckdb::params;
use miniprof_core::error::{ProfilerError, Result};
use miniprof_core::ids::RequestId;
use miniprof_core::model::record::ResultRecord;
use miniprof_core::model::stats::RequestStats;
use miniprof_core::store::record_key;
use tracing::debug;

use crate::Store;

impl Store {
    /// Stores `record` under `id` until `ttl` elapses.
    ///
    /// A live record for the same id is never overwritten. An expired one that
    /// retention has not removed yet is replaced.
    pub fn put_result(&self, id: &RequestId, record: &ResultRecord, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| ProfilerError::Internal(format!("encode result failed: {e}")))?;
        let key = record_key(self.namespace(), id);
        let now = self.now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| ProfilerError::Store(format!("begin tx failed: {e}")))?;

        tx.execute(
            "DELETE FROM results WHERE key = ? AND expires_at <= ?",
            params![key, now],
        )
        .map_err(|e| ProfilerError::Store(format!("clear expired result failed: {e}")))?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO results (key, request_id, created_at, expires_at, payload)
                 VALUES (?, ?, ?, ?, ?)",
                params![key, id.as_str(), now, expires_at, payload],
            )
            .map_err(|e| ProfilerError::Store(format!("insert result failed: {e}")))?;

        tx.commit()
            .map_err(|e| ProfilerError::Store(format!("commit result failed: {e}")))?;

        if inserted == 0 {
            debug!(request_id = %id, "result already stored; keeping the first write");
        }
        Ok(())
    }

    /// Records call statistics under `reference`, replacing earlier data.
    pub fn put_call_stats(&self, reference: u64, stats: &RequestStats) -> Result<()> {
        let payload = serde_json::to_string(stats)
            .map_err(|e| ProfilerError::Internal(format!("encode call stats failed: {e}")))?;
        let reference = reference_param(reference)?;
        let now = self.now_millis();

        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO call_stats (reference, recorded_at, payload) VALUES (?, ?, ?)",
            params![reference, now, payload],
        )
        .map_err(|e| ProfilerError::Store(format!("insert call stats failed: {e}")))?;
        Ok(())
    }
}

pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

pub(crate) fn reference_param(reference: u64) -> Result<i64> {
    i64::try_from(reference)
        .map_err(|_| ProfilerError::InvalidArgument(format!("stats reference too large: {reference}")))
}
