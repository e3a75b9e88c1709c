use std::time::Duration;

use crate::error::Result;
use crate::ids::RequestId;
use crate::model::record::ResultRecord;

/// Short-lived storage for finished sessions.
///
/// Each id is written once. A record is readable until its TTL elapses and
/// absent afterwards; implementations must answer immediately either way.
pub trait ResultStore: Send + Sync {
    fn put(&self, id: &RequestId, record: &ResultRecord, ttl: Duration) -> Result<()>;

    fn get(&self, id: &RequestId) -> Result<Option<ResultRecord>>;
}

/// Storage key of a request id inside `namespace`.
pub fn record_key(namespace: &str, id: &RequestId) -> String {
    format!("{namespace}_request_{id}")
}
