use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RequestId;
use crate::model::span::Span;
use crate::model::stats::Appstats;

/// Persisted form of one finished profiling session. Written once, never
/// updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub request_id: RequestId,
    #[serde(rename = "requestURL")]
    pub request_url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub did_redirect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_stats_ref: Option<String>,
    pub profile: Span,
}

/// A stored record projected for display, with optional call-stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedResult {
    pub id: RequestId,
    #[serde(rename = "requestURL")]
    pub request_url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub redirect: bool,
    pub profile: Span,
    pub appstats: Option<Appstats>,
}

impl EnrichedResult {
    pub fn from_record(record: ResultRecord, appstats: Option<Appstats>) -> Self {
        Self {
            id: record.request_id,
            request_url: record.request_url,
            timestamp: record.timestamp,
            redirect: record.did_redirect,
            profile: record.profile,
            appstats,
        }
    }
}

/// Response of the results endpoint.
///
/// `ok == false` means no ids were requested at all; `ok == true` with an
/// empty list means ids were requested but none are (still) stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSet {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<EnrichedResult>>,
}

impl ResultSet {
    pub fn nothing_requested() -> Self {
        Self {
            ok: false,
            requests: None,
        }
    }

    pub fn found(requests: Vec<EnrichedResult>) -> Self {
        Self {
            ok: true,
            requests: Some(requests),
        }
    }

    pub fn results(&self) -> &[EnrichedResult] {
        self.requests.as_deref().unwrap_or(&[])
    }
}
