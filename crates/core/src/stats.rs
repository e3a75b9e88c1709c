use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::model::stats::{Appstats, CallInfo, RequestStats, RpcTotals};

/// Longest request/response summary kept per call.
pub const MAX_SUMMARY_LEN: usize = 100;

/// Lookup of RPC call statistics recorded by another subsystem.
pub trait StatsSource: Send + Sync {
    fn lookup(&self, reference: u64) -> Result<Option<RequestStats>>;
}

/// Resolves `reference` against `source` and projects it for display.
///
/// Every failure (unparseable reference, backend error, no data) comes back
/// as `None` so a single bad entry never affects the rest of a result set.
pub fn enrich(
    source: &dyn StatsSource,
    reference: &str,
    max_stack_frames: Option<usize>,
) -> Option<Appstats> {
    let Some(key) = parse_reference(reference) else {
        debug!(reference, "ignoring malformed call stats reference");
        return None;
    };
    match source.lookup(key) {
        Ok(stats) => stats.map(|s| summarize(&s, max_stack_frames)),
        Err(e) => {
            debug!(reference, error = %e, "call stats lookup failed");
            None
        }
    }
}

pub fn parse_reference(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub fn summarize(stats: &RequestStats, max_stack_frames: Option<usize>) -> Appstats {
    let mut totals: BTreeMap<String, RpcTotals> = BTreeMap::new();
    for agg in &stats.rpc_stats {
        totals.insert(
            agg.service_call_name.clone(),
            RpcTotals {
                total_calls: agg.total_calls,
                total_time: 0,
            },
        );
    }

    let mut calls = Vec::with_capacity(stats.calls.len());
    for call in &stats.calls {
        totals
            .entry(call.service_call_name.clone())
            .or_insert(RpcTotals {
                total_calls: 0,
                total_time: 0,
            })
            .total_time += call.duration_ms;

        let frames = max_stack_frames.unwrap_or(usize::MAX);
        calls.push(CallInfo {
            service_call_name: call.service_call_name.clone(),
            total_time: call.duration_ms,
            start_offset: call.start_offset_ms,
            request: truncate(&call.request_summary, MAX_SUMMARY_LEN),
            response: truncate(&call.response_summary, MAX_SUMMARY_LEN),
            call_stack: call
                .call_stack
                .iter()
                .take(frames)
                .map(|f| format!("{}.{}:{}", f.class_or_file_name, f.function_name, f.line_number))
                .collect(),
        });
    }

    Appstats {
        total_time: stats.duration_ms,
        rpc_stats: (!totals.is_empty()).then_some(totals),
        rpc_calls: (!calls.is_empty()).then_some(calls),
    }
}

/// Keeps at most `max` characters of `s`.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
