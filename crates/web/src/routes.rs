use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use miniprof_core::time::http_date;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Level, debug};

use crate::Profiler;
use crate::resources::content_type_for;

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub ids: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    pub id: Option<String>,
}

/// `GET {base}results` and `GET {base}resource`.
pub fn router(profiler: Profiler) -> Router {
    let base = profiler.config().base_path.clone();
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route(&format!("{base}results"), get(results))
        .route(&format!("{base}resource"), get(resource))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(profiler)
}

async fn results(State(profiler): State<Profiler>, Query(q): Query<ResultsQuery>) -> Response {
    let set = profiler.aggregator().get_raw(q.ids.as_deref());
    debug!(ok = set.ok, returned = set.results().len(), "results requested");
    ([(CACHE_CONTROL, "no-cache")], Json(set)).into_response()
}

async fn resource(State(profiler): State<Profiler>, Query(q): Query<ResourceQuery>) -> Response {
    let Some(name) = q.id.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(body) = profiler.resources().get(name) else {
        debug!(resource = name, "unknown resource requested");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = (
        [(CONTENT_TYPE, content_type_for(name))],
        body.to_string(),
    )
        .into_response();
    let headers = response.headers_mut();

    let cache_for = profiler.config().resource_cache;
    match chrono::Duration::from_std(cache_for) {
        Ok(delta) if !cache_for.is_zero() => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, must-revalidate"));
            if let Some(expires) = Utc::now().checked_add_signed(delta)
                && let Ok(value) = HeaderValue::from_str(&http_date(expires))
            {
                headers.insert(EXPIRES, value);
            }
        }
        _ => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use miniprof_core::config::Config;
    use miniprof_core::stats::StatsSource;
    use miniprof_core::store::ResultStore;
    use miniprof_store::Store;
    use testkit::{request_id, sample_record, sample_stats};
    use tower::ServiceExt;

    use super::*;

    fn profiler_with(config: Config) -> (Profiler, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let stats: Arc<dyn StatsSource> = store.clone();
        let profiler = Profiler::new(config, store.clone(), Some(stats)).unwrap();
        (profiler, store)
    }

    async fn get_uri(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn results_endpoint_returns_stored_profiles() {
        let (profiler, store) = profiler_with(Config::default());
        let mut record = sample_record("3");
        record.external_stats_ref = Some("77".to_string());
        store
            .put(&request_id("3"), &record, Duration::from_secs(30))
            .unwrap();
        store.put_call_stats(77, &sample_stats()).unwrap();

        let resp = get_uri(router(profiler), "/mini_profile/results?ids=3,4").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-cache");

        let body = json_body(resp).await;
        assert_eq!(body["ok"], true);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["id"], "3");
        assert_eq!(requests[0]["requestURL"], "/orders?page=3");
        assert_eq!(requests[0]["appstats"]["totalTime"], 180);
        assert_eq!(
            requests[0]["appstats"]["rpcStats"]["memcache.Get"]["totalTime"],
            12
        );
    }

    #[tokio::test]
    async fn results_without_ids_is_not_ok() {
        let (profiler, _store) = profiler_with(Config::default());
        let body = json_body(get_uri(router(profiler), "/mini_profile/results").await).await;
        assert_eq!(body["ok"], false);
        assert!(body.get("requests").is_none());
    }

    #[tokio::test]
    async fn resource_headers_follow_cache_setting() {
        let (profiler, _store) = profiler_with(Config::default());
        let resp = get_uri(
            router(profiler),
            "/mini_profile/resource?id=mini_profiler.css",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/css");
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-cache");
        assert!(resp.headers().get(EXPIRES).is_none());

        let cached = Config {
            resource_cache: Duration::from_secs(3600),
            ..Config::default()
        };
        let (profiler, _store) = profiler_with(cached);
        let resp = get_uri(
            router(profiler),
            "/mini_profile/resource?id=mini_profiler.js",
        )
        .await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/javascript");
        assert_eq!(resp.headers()[CACHE_CONTROL], "public, must-revalidate");
        let expires = resp.headers()[EXPIRES].to_str().unwrap().to_string();
        assert!(expires.ends_with(" GMT"));
    }

    #[tokio::test]
    async fn unknown_or_missing_resource_is_404() {
        let (profiler, _store) = profiler_with(Config::default());
        let app = router(profiler);
        let resp = get_uri(app.clone(), "/mini_profile/resource?id=nope.js").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = get_uri(app, "/mini_profile/resource").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
