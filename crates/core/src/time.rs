use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ProfilerError, Result};

/// Source of wall-clock time for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        if let Ok(mut now) = self.now.lock()
            && let Some(next) = now.checked_add_signed(delta)
        {
            *now = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ProfilerError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn to_unix_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_unix_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ProfilerError::Parse(format!("timestamp out of range: {ms}")))
}

/// Formats a timestamp the way HTTP `Expires`/`Date` headers expect.
pub fn http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let shared = clock.clone();
        clock.advance(Duration::from_millis(1500));
        assert_eq!((shared.now() - start).num_milliseconds(), 1500);
    }

    #[test]
    fn parses_duration() {
        assert_eq!(parse_duration_str("30s").unwrap(), Duration::from_secs(30));
        assert!(parse_duration_str("soon").is_err());
    }

    #[test]
    fn millis_roundtrip_is_exact() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 12, 30, 0).unwrap();
        assert_eq!(from_unix_millis(to_unix_millis(ts)).unwrap(), ts);
    }

    #[test]
    fn formats_http_date() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 12, 30, 5).unwrap();
        assert_eq!(http_date(ts), "Sun, 01 Feb 2026 12:30:05 GMT");
    }
}
