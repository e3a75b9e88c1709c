use chrono::{DateTime, Duration, TimeZone, Utc};
use miniprof_core::ids::RequestId;
use miniprof_core::model::record::ResultRecord;
use miniprof_core::model::span::Span;
use miniprof_core::model::stats::{AggregateRpcStats, RequestStats, RpcCall, StackFrame};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn request_id(raw: &str) -> RequestId {
    RequestId::parse(raw).unwrap()
}

fn closed(name: &str, start_ms: i64, len_ms: i64, depth: usize, children: Vec<Span>) -> Span {
    let start = base_time() + Duration::milliseconds(start_ms);
    Span {
        name: name.to_string(),
        start_time: start,
        end_time: Some(start + Duration::milliseconds(len_ms)),
        duration: Some(len_ms as u64 * 1_000_000),
        depth,
        children,
    }
}

/// `Request` root with a cache lookup and a nested query under a render step.
pub fn sample_profile() -> Span {
    closed(
        "Request",
        0,
        180,
        0,
        vec![
            closed("cache.get orders", 2, 12, 1, Vec::new()),
            closed(
                "render orders",
                20,
                150,
                1,
                vec![closed("datastore query", 25, 90, 2, Vec::new())],
            ),
        ],
    )
}

pub fn sample_record(id: &str) -> ResultRecord {
    ResultRecord {
        request_id: request_id(id),
        request_url: format!("/orders?page={id}"),
        timestamp: base_time(),
        did_redirect: false,
        external_stats_ref: None,
        profile: sample_profile(),
    }
}

pub fn sample_stats() -> RequestStats {
    let frame = |n: i32| StackFrame {
        class_or_file_name: "app.orders".to_string(),
        function_name: "list".to_string(),
        line_number: n,
    };
    RequestStats {
        duration_ms: 180,
        rpc_stats: vec![
            AggregateRpcStats {
                service_call_name: "datastore_v3.RunQuery".to_string(),
                total_calls: 1,
            },
            AggregateRpcStats {
                service_call_name: "memcache.Get".to_string(),
                total_calls: 1,
            },
        ],
        calls: vec![
            RpcCall {
                service_call_name: "memcache.Get".to_string(),
                duration_ms: 12,
                start_offset_ms: 2,
                request_summary: "key=orders:page:1".to_string(),
                response_summary: "miss".to_string(),
                call_stack: vec![frame(10)],
            },
            RpcCall {
                service_call_name: "datastore_v3.RunQuery".to_string(),
                duration_ms: 90,
                start_offset_ms: 25,
                request_summary: "kind=Order limit=20".to_string(),
                response_summary: "20 entities".to_string(),
                call_stack: vec![frame(42), frame(17), frame(3)],
            },
        ],
    }
}
