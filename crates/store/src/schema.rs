pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS results (
  key TEXT PRIMARY KEY,
  request_id TEXT NOT NULL,
  created_at BIGINT NOT NULL,
  expires_at BIGINT NOT NULL,
  payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS call_stats (
  reference BIGINT PRIMARY KEY,
  recorded_at BIGINT NOT NULL,
  payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_expires ON results(expires_at);
CREATE INDEX IF NOT EXISTS idx_call_stats_recorded ON call_stats(recorded_at);
"#;
