//! A small application served by `miniprof run` so the profiler has
//! something to measure.

use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use miniprof_core::model::stats::{AggregateRpcStats, RequestStats, RpcCall, StackFrame};
use miniprof_core::redirect::TRACE_URL_HEADER;
use miniprof_core::step;
use miniprof_store::Store;
use miniprof_web::ProfileContext;
use serde::Deserialize;
use tokio::time::{Instant, sleep};
use tower_http::trace::TraceLayer;
use tracing::warn;

const STATS_PATH: &str = "/_stats/details";

#[derive(Clone)]
struct DemoState {
    store: Store,
}

#[derive(Debug, Deserialize)]
struct ChainQuery {
    hops: Option<u32>,
}

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/work", get(work))
        .route("/redirect", get(redirect))
        .route("/chain", get(chain))
        .layer(TraceLayer::new_for_http())
        .with_state(DemoState { store })
}

async fn index(req: Request) -> Html<String> {
    let includes = ProfileContext::of(&req)
        .and_then(|ctx| ctx.includes.clone())
        .unwrap_or_default();
    let body = {
        let _render = step("render index");
        format!(
            "<!doctype html>\n<html>\n<head>\n<title>miniprof demo</title>\n{includes}\n</head>\n<body>\n\
             <h1>miniprof demo</h1>\n<ul>\n\
             <li><a href=\"/work\">/work</a> profiled steps and call stats</li>\n\
             <li><a href=\"/redirect\">/redirect</a> one redirect back here</li>\n\
             <li><a href=\"/chain?hops=3\">/chain?hops=3</a> several redirects in a row</li>\n\
             </ul>\n<button onclick=\"var x = new XMLHttpRequest(); x.open('GET', '/work'); x.send();\">\
             ajax /work</button>\n</body>\n</html>\n"
        )
    };
    Html(body)
}

/// Simulates a handler that hits a cache and a database, recording both as
/// steps and as call statistics.
async fn work(State(state): State<DemoState>) -> Response {
    let started = Instant::now();
    let reference = Utc::now().timestamp_micros().unsigned_abs();
    let mut calls = Vec::new();

    let cache = step("cache lookup");
    let offset = elapsed_ms(started);
    sleep(Duration::from_millis(3)).await;
    calls.push(rpc(
        "memcache.Get",
        offset,
        elapsed_ms(started) - offset,
        "key=orders:1",
        "miss",
        line!(),
    ));
    cache.close();

    let load = step("load orders");
    {
        let _query = step("query orders");
        let offset = elapsed_ms(started);
        sleep(Duration::from_millis(8)).await;
        calls.push(rpc(
            "datastore_v3.RunQuery",
            offset,
            elapsed_ms(started) - offset,
            "kind=Order limit=20",
            "20 entities",
            line!(),
        ));
    }
    {
        let _fill = step("fill cache");
        let offset = elapsed_ms(started);
        sleep(Duration::from_millis(2)).await;
        calls.push(rpc(
            "memcache.Set",
            offset,
            elapsed_ms(started) - offset,
            "key=orders:1",
            "ok",
            line!(),
        ));
    }
    load.close();

    let stats = RequestStats {
        duration_ms: elapsed_ms(started),
        rpc_stats: ["memcache.Get", "datastore_v3.RunQuery", "memcache.Set"]
            .into_iter()
            .map(|name| AggregateRpcStats {
                service_call_name: name.to_string(),
                total_calls: 1,
            })
            .collect(),
        calls,
    };
    if let Err(e) = state.store.put_call_stats(reference, &stats) {
        warn!(error = ?e, "failed to record call stats");
    }

    let trace_url = format!("{STATS_PATH}?time={reference}");
    ([(TRACE_URL_HEADER, trace_url)], "orders loaded\n").into_response()
}

async fn redirect() -> Redirect {
    let _decide = step("decide target");
    sleep(Duration::from_millis(1)).await;
    Redirect::to("/")
}

async fn chain(Query(q): Query<ChainQuery>) -> Redirect {
    let hops = q.hops.unwrap_or(0);
    let _hop = step(format!("hop {hops}"));
    sleep(Duration::from_millis(1)).await;
    if hops == 0 {
        Redirect::to("/")
    } else {
        Redirect::to(&format!("/chain?hops={}", hops - 1))
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn rpc(
    name: &str,
    start_offset_ms: i64,
    duration_ms: i64,
    request: &str,
    response: &str,
    line: u32,
) -> RpcCall {
    RpcCall {
        service_call_name: name.to_string(),
        duration_ms,
        start_offset_ms,
        request_summary: request.to_string(),
        response_summary: response.to_string(),
        call_stack: vec![StackFrame {
            class_or_file_name: file!().to_string(),
            function_name: "work".to_string(),
            line_number: line as i32,
        }],
    }
}
