use std::time::Duration;

use duckdb::params;
use miniprof_core::error::{ProfilerError, Result};
use serde::Serialize;

use crate::Store;
use crate::write::ttl_millis;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PruneReport {
    pub results: usize,
    pub call_stats: usize,
}

impl Store {
    pub fn run_retention(&self, call_stats_ttl: Duration) -> Result<PruneReport> {
        Ok(PruneReport {
            results: self.prune_expired()?,
            call_stats: self.prune_call_stats(call_stats_ttl)?,
        })
    }

    /// Deletes every result whose TTL has elapsed. Reads already hide them;
    /// this only reclaims space.
    pub fn prune_expired(&self) -> Result<usize> {
        let now = self.now_millis();
        let conn = self.conn();
        conn.execute("DELETE FROM results WHERE expires_at <= ?", params![now])
            .map_err(|e| ProfilerError::Store(format!("retention results delete failed: {e}")))
    }

    pub fn prune_call_stats(&self, older_than: Duration) -> Result<usize> {
        let cutoff = self.now_millis().saturating_sub(ttl_millis(older_than));
        let conn = self.conn();
        conn.execute(
            "DELETE FROM call_stats WHERE recorded_at < ?",
            params![cutoff],
        )
        .map_err(|e| ProfilerError::Store(format!("retention call stats delete failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use miniprof_core::time::ManualClock;
    use testkit::{base_time, request_id, sample_record, sample_stats};

    use crate::Store;

    #[test]
    fn prunes_only_expired_results() {
        let clock = ManualClock::new(base_time());
        let store = Store::open_in_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        store
            .put_result(&request_id("1"), &sample_record("1"), Duration::from_secs(10))
            .unwrap();
        store
            .put_result(&request_id("2"), &sample_record("2"), Duration::from_secs(60))
            .unwrap();

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.prune_expired().unwrap(), 1);

        let status = store.status().unwrap();
        assert_eq!(status.results_count, 1);
        assert_eq!(status.live_results, 1);
        assert_eq!(
            status.next_expiry,
            Some(base_time() + chrono::Duration::seconds(60))
        );
    }

    #[test]
    fn retention_reports_counts() {
        let clock = ManualClock::new(base_time());
        let store = Store::open_in_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        store
            .put_result(&request_id("1"), &sample_record("1"), Duration::from_secs(5))
            .unwrap();
        store.put_call_stats(10, &sample_stats()).unwrap();

        clock.advance(Duration::from_secs(120));
        let report = store.run_retention(Duration::from_secs(60)).unwrap();
        assert_eq!(report.results, 1);
        assert_eq!(report.call_stats, 1);
        assert_eq!(store.status().unwrap().call_stats_count, 0);
    }
}
