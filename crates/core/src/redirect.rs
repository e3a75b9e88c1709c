//! Propagation of request ids across HTTP redirects.
//!
//! No state is kept on the server. The chain of ids travels in the redirect
//! target's query string and is echoed in a response header, so the viewer
//! can fetch every hop of a redirect sequence at once.

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::ids::RequestId;

/// Response header carrying the current id, or the whole chain.
pub const REQUEST_ID_HEADER: &str = "x-mini-profile-request-id";
/// Query parameter carrying predecessor ids on a redirect target.
pub const REDIRECT_PARAM: &str = "_mprid_";
/// Response header set by the RPC recorder, pointing at its stats page.
pub const TRACE_URL_HEADER: &str = "x-traceurl";
/// Query parameter of [`TRACE_URL_HEADER`] that holds the stats reference.
pub const TRACE_URL_ID_PARAM: &str = "time";

/// Ordered, append-only list of request ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedirectChain {
    ids: Vec<RequestId>,
}

impl RedirectChain {
    pub fn new(ids: Vec<RequestId>) -> Self {
        Self { ids }
    }

    /// Reads predecessor ids from a raw query string. Missing parameter or
    /// garbage yields an empty chain.
    pub fn from_query(query: Option<&str>) -> Self {
        query
            .and_then(|q| query_param(q, REDIRECT_PARAM))
            .map(|raw| Self::parse_list(&raw))
            .unwrap_or_default()
    }

    /// Parses a comma-separated id list, skipping segments that are not
    /// valid ids.
    pub fn parse_list(raw: &str) -> Self {
        let ids = raw
            .split(',')
            .filter_map(|part| RequestId::parse(part).ok())
            .collect();
        Self { ids }
    }

    pub fn ids(&self) -> &[RequestId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// The chain with `id` appended as the newest hop.
    pub fn extended(&self, id: RequestId) -> Self {
        let mut ids = self.ids.clone();
        ids.push(id);
        Self { ids }
    }

    pub fn joined(&self) -> String {
        self.ids
            .iter()
            .map(RequestId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn into_ids(self) -> Vec<RequestId> {
        self.ids
    }

    /// Appends this chain as the redirect parameter to `location`, keeping any
    /// fragment at the end. An empty location is returned untouched.
    pub fn append_to_location(&self, location: &str) -> String {
        if location.trim().is_empty() || self.ids.is_empty() {
            return location.to_string();
        }

        let (base, fragment) = match location.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (location, None),
        };
        let separator = if base.contains('?') { '&' } else { '?' };
        let encoded = utf8_percent_encode(&self.joined(), NON_ALPHANUMERIC).to_string();

        let mut out = format!("{base}{separator}{REDIRECT_PARAM}={encoded}");
        if let Some(fragment) = fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Returns the decoded value of the first `name=value` pair in `query`.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
    })
}

/// Pulls the stats reference out of a trace URL such as
/// `/_ah/stats/details?time=1700000000123`.
pub fn stats_ref_from_trace_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query_param(query, TRACE_URL_ID_PARAM).filter(|v| !v.trim().is_empty())
}
