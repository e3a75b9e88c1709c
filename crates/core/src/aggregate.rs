use std::sync::Arc;

use tracing::warn;

use crate::ids::RequestId;
use crate::model::record::{EnrichedResult, ResultSet};
use crate::redirect::RedirectChain;
use crate::stats::{self, StatsSource};
use crate::store::ResultStore;

/// Read path of the viewer: resolves ids against the store and attaches
/// call stats where a record references them.
#[derive(Clone)]
pub struct ResultAggregator {
    store: Arc<dyn ResultStore>,
    stats: Option<Arc<dyn StatsSource>>,
    max_stack_frames: Option<usize>,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            store,
            stats: None,
            max_stack_frames: None,
        }
    }

    pub fn with_stats(
        mut self,
        source: Arc<dyn StatsSource>,
        max_stack_frames: Option<usize>,
    ) -> Self {
        self.stats = Some(source);
        self.max_stack_frames = max_stack_frames;
        self
    }

    /// Results for `ids` in input order. Unknown, expired and unreadable ids
    /// are left out; an empty `ids` is answered with `ok == false`.
    pub fn get(&self, ids: &[RequestId]) -> ResultSet {
        if ids.is_empty() {
            return ResultSet::nothing_requested();
        }
        ResultSet::found(self.collect(ids))
    }

    /// Same as [`ResultAggregator::get`] for the raw `ids` query value.
    pub fn get_raw(&self, raw: Option<&str>) -> ResultSet {
        match raw.map(str::trim) {
            None | Some("") => ResultSet::nothing_requested(),
            Some(raw) => {
                let chain = RedirectChain::parse_list(raw);
                ResultSet::found(self.collect(chain.ids()))
            }
        }
    }

    fn collect(&self, ids: &[RequestId]) -> Vec<EnrichedResult> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match self.store.get(id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(request_id = %id, error = %e, "result lookup failed");
                    continue;
                }
            };

            let appstats = match (&self.stats, record.external_stats_ref.as_deref()) {
                (Some(source), Some(reference)) => {
                    stats::enrich(source.as_ref(), reference, self.max_stack_frames)
                }
                _ => None,
            };
            out.push(EnrichedResult::from_record(record, appstats));
        }
        out
    }
}
