use axum::extract::{Request, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use miniprof_core::access::Viewer;
use miniprof_core::ids::RequestId;
use miniprof_core::model::record::ResultRecord;
use miniprof_core::redirect::{
    REQUEST_ID_HEADER, RedirectChain, TRACE_URL_HEADER, stats_ref_from_trace_url,
};
use miniprof_core::session;
use tracing::{debug, warn};

use crate::Profiler;

/// Inserted into the extensions of every profiled request.
#[derive(Debug, Clone)]
pub struct ProfileContext {
    pub request_id: RequestId,
    /// Predecessor ids followed by this request's id.
    pub chain: RedirectChain,
    /// Widget snippet to place in the page `<head>`.
    pub includes: Option<String>,
}

impl ProfileContext {
    pub fn of(req: &Request) -> Option<&Self> {
        req.extensions().get::<Self>()
    }
}

pub async fn profile_request(
    State(profiler): State<Profiler>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let viewer = req.extensions().get::<Viewer>();
    if !profiler.policy().should_profile(&path, viewer) {
        return next.run(req).await;
    }

    let request_id = profiler.next_id();
    let predecessors = RedirectChain::from_query(req.uri().query());
    let chain = predecessors.extended(request_id.clone());
    let request_url = match req.uri().query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    req.extensions_mut().insert(ProfileContext {
        request_id: request_id.clone(),
        chain: chain.clone(),
        includes: profiler.resources().includes(&request_id),
    });

    let session_id = request_id.clone();
    let (mut response, finished) = session::scope(async move {
        session::start_with(session_id, predecessors.into_ids());
        let response = next.run(req).await;
        (response, session::stop())
    })
    .await;

    let headers = response.headers_mut();
    set_header(headers, HeaderName::from_static(REQUEST_ID_HEADER), &chain.joined());

    let did_redirect = rewrite_redirect(&mut response, &chain);
    let external_stats_ref = response
        .headers()
        .get(TRACE_URL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(stats_ref_from_trace_url);

    let Some(finished) = finished else {
        warn!(request_id = %request_id, "profiling session vanished before the response");
        return response;
    };
    let record = ResultRecord {
        request_id: request_id.clone(),
        request_url,
        timestamp: finished.started_at,
        did_redirect,
        external_stats_ref,
        profile: finished.root,
    };

    if let Err(e) = profiler
        .store()
        .put(&request_id, &record, profiler.config().data_expiry)
    {
        warn!(request_id = %request_id, error = ?e, "failed to store profile");
    } else {
        debug!(
            request_id = %request_id,
            url = %record.request_url,
            duration_ms = ?record.profile.duration_ms(),
            "profile stored"
        );
    }
    response
}

/// Carries the chain onto the redirect target. Returns whether the response
/// was a redirect.
fn rewrite_redirect(response: &mut Response, chain: &RedirectChain) -> bool {
    if !response.status().is_redirection() {
        return false;
    }
    let Some(location) = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return false;
    };
    set_header(
        response.headers_mut(),
        LOCATION,
        &chain.append_to_location(&location),
    );
    true
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => warn!(header = %name, error = ?e, "unrepresentable header value"),
    }
}
