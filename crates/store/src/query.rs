use std::time::Duration;

use duckdb::params;
use miniprof_core::error::{ProfilerError, Result};
use miniprof_core::ids::RequestId;
use miniprof_core::model::record::ResultRecord;
use miniprof_core::model::stats::RequestStats;
use miniprof_core::stats::StatsSource;
use miniprof_core::store::{ResultStore, record_key};

use crate::Store;
use crate::write::reference_param;

impl Store {
    /// Returns the live record for `id`, or `None` once it has expired.
    pub fn get_result(&self, id: &RequestId) -> Result<Option<ResultRecord>> {
        let key = record_key(self.namespace(), id);
        let now = self.now_millis();

        let payload = self.single_payload(
            "SELECT payload FROM results WHERE key = ? AND expires_at > ?",
            params![key, now],
            "result",
        )?;
        payload
            .map(|raw| {
                serde_json::from_str::<ResultRecord>(&raw).map_err(|e| {
                    ProfilerError::Store(format!("corrupt result payload for {id}: {e}"))
                })
            })
            .transpose()
    }

    pub fn get_call_stats(&self, reference: u64) -> Result<Option<RequestStats>> {
        let reference = reference_param(reference)?;
        let payload = self.single_payload(
            "SELECT payload FROM call_stats WHERE reference = ?",
            params![reference],
            "call stats",
        )?;
        payload
            .map(|raw| {
                serde_json::from_str::<RequestStats>(&raw).map_err(|e| {
                    ProfilerError::Stats(format!("corrupt call stats for {reference}: {e}"))
                })
            })
            .transpose()
    }

    fn single_payload(
        &self,
        sql: &str,
        args: &[&dyn duckdb::ToSql],
        what: &str,
    ) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ProfilerError::Store(format!("prepare {what} lookup failed: {e}")))?;
        let mut rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(|e| ProfilerError::Store(format!("query {what} failed: {e}")))?;

        rows.next()
            .transpose()
            .map_err(|e| ProfilerError::Store(format!("map {what} failed: {e}")))
    }
}

impl ResultStore for Store {
    fn put(&self, id: &RequestId, record: &ResultRecord, ttl: Duration) -> Result<()> {
        self.put_result(id, record, ttl)
    }

    fn get(&self, id: &RequestId) -> Result<Option<ResultRecord>> {
        self.get_result(id)
    }
}

impl StatsSource for Store {
    fn lookup(&self, reference: u64) -> Result<Option<RequestStats>> {
        self.get_call_stats(reference)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use miniprof_core::aggregate::ResultAggregator;
    use miniprof_core::time::ManualClock;
    use testkit::{base_time, request_id, sample_record, sample_stats};

    use super::*;

    fn store_at_base() -> (Store, ManualClock) {
        let clock = ManualClock::new(base_time());
        let store = Store::open_in_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn record_visible_until_ttl_elapses() {
        let (store, clock) = store_at_base();
        let id = request_id("3");
        store
            .put(&id, &sample_record("3"), Duration::from_secs(30))
            .unwrap();

        clock.advance(Duration::from_secs(29));
        let found = store.get(&id).unwrap().unwrap();
        assert_eq!(found, sample_record("3"));

        clock.advance(Duration::from_secs(1));
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn one_second_ttl() {
        let (store, clock) = store_at_base();
        let id = request_id("9");
        store
            .put(&id, &sample_record("9"), Duration::from_secs(1))
            .unwrap();
        assert!(store.get(&id).unwrap().is_some());

        clock.advance(Duration::from_millis(1001));
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn first_write_wins_while_live() {
        let (store, _clock) = store_at_base();
        let id = request_id("4");
        let first = sample_record("4");
        let mut second = sample_record("4");
        second.request_url = "/other".to_string();

        store.put(&id, &first, Duration::from_secs(30)).unwrap();
        store.put(&id, &second, Duration::from_secs(30)).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().request_url, first.request_url);
    }

    #[test]
    fn expired_record_can_be_written_again() {
        let (store, clock) = store_at_base();
        let id = request_id("5");
        store
            .put(&id, &sample_record("5"), Duration::from_secs(1))
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let mut fresh = sample_record("5");
        fresh.request_url = "/fresh".to_string();
        store.put(&id, &fresh, Duration::from_secs(30)).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().request_url, "/fresh");
    }

    #[test]
    fn namespaces_do_not_see_each_other() {
        let (store, _clock) = store_at_base();
        let other = store.clone().with_namespace("other_app");
        let id = request_id("6");
        store
            .put(&id, &sample_record("6"), Duration::from_secs(30))
            .unwrap();
        assert!(other.get(&id).unwrap().is_none());
        assert!(store.get(&id).unwrap().is_some());
    }

    #[test]
    fn call_stats_lookup() {
        let (store, _clock) = store_at_base();
        store.put_call_stats(1_700_000_000_123, &sample_stats()).unwrap();
        assert_eq!(
            store.lookup(1_700_000_000_123).unwrap().unwrap(),
            sample_stats()
        );
        assert!(store.lookup(1).unwrap().is_none());
        assert!(store.lookup(u64::MAX).is_err());
    }

    #[test]
    fn aggregator_over_duckdb() {
        let (store, _clock) = store_at_base();
        let store = Arc::new(store);
        let mut record = sample_record("7");
        record.external_stats_ref = Some("99".to_string());
        store
            .put(&record.request_id, &record, Duration::from_secs(30))
            .unwrap();
        store.put_call_stats(99, &sample_stats()).unwrap();

        let agg = ResultAggregator::new(store.clone()).with_stats(store, Some(1));
        let set = agg.get_raw(Some("7,8"));
        assert!(set.ok);
        assert_eq!(set.results().len(), 1);
        let appstats = set.results()[0].appstats.as_ref().unwrap();
        assert_eq!(appstats.total_time, 180);
        let calls = appstats.rpc_calls.as_ref().unwrap();
        assert!(calls.iter().all(|c| c.call_stack.len() <= 1));
    }
}
