use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Call statistics recorded for one request by an external RPC recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub duration_ms: i64,
    #[serde(default)]
    pub rpc_stats: Vec<AggregateRpcStats>,
    #[serde(default)]
    pub calls: Vec<RpcCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRpcStats {
    pub service_call_name: String,
    pub total_calls: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcCall {
    pub service_call_name: String,
    pub duration_ms: i64,
    pub start_offset_ms: i64,
    pub request_summary: String,
    pub response_summary: String,
    #[serde(default)]
    pub call_stack: Vec<StackFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub class_or_file_name: String,
    pub function_name: String,
    pub line_number: i32,
}

/// Display projection of [`RequestStats`], attached to an enriched result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appstats {
    pub total_time: i64,
    pub rpc_stats: Option<BTreeMap<String, RpcTotals>>,
    pub rpc_calls: Option<Vec<CallInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTotals {
    pub total_calls: i64,
    pub total_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub service_call_name: String,
    pub total_time: i64,
    pub start_offset: i64,
    pub request: String,
    pub response: String,
    pub call_stack: Vec<String>,
}
