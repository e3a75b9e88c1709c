use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};

/// Opaque identifier of one profiled request.
///
/// Ids only need to be unique while their result is alive in the store, so
/// a process-local counter is enough. They travel through query strings and
/// headers, which is why the accepted alphabet is kept URL-safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > 64 || !trimmed.chars().all(is_id_char) {
            return Err(ProfilerError::Parse(format!("invalid request id: {input}")));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Counter,
    Random,
}

impl FromStr for IdStrategy {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" | "monotonic" => Ok(Self::Counter),
            "random" | "uuid" => Ok(Self::Random),
            _ => Err(ProfilerError::Parse(format!("unknown id strategy: {s}"))),
        }
    }
}

#[derive(Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            counter: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        match self.strategy {
            IdStrategy::Counter => {
                RequestId(self.counter.fetch_add(1, Ordering::Relaxed).to_string())
            }
            IdStrategy::Random => RequestId(uuid::Uuid::new_v4().simple().to_string()),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::Counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        assert_eq!(RequestId::parse("42").unwrap().as_str(), "42");
        assert_eq!(RequestId::parse(" 7 ").unwrap().as_str(), "7");
        assert_eq!(
            RequestId::parse("4bf92f3577b34da6a3ce929d0e0e4736")
                .unwrap()
                .as_str(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(RequestId::parse("").is_err());
        assert!(RequestId::parse("a b").is_err());
        assert!(RequestId::parse("<script>").is_err());
        assert!(RequestId::parse(&"9".repeat(65)).is_err());
    }

    #[test]
    fn counter_ids_are_monotonic() {
        let ids = IdGenerator::new(IdStrategy::Counter);
        let a: u64 = ids.next_id().as_str().parse().unwrap();
        let b: u64 = ids.next_id().as_str().parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn random_ids_are_distinct_and_valid() {
        let ids = IdGenerator::new(IdStrategy::Random);
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(RequestId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn strategy_parse() {
        assert_eq!(IdStrategy::from_str("Counter").unwrap(), IdStrategy::Counter);
        assert_eq!(IdStrategy::from_str("random").unwrap(), IdStrategy::Random);
        assert!(IdStrategy::from_str("sequential-ish").is_err());
    }
}
