use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ProfilerError, Result};

/// The signed-in user making a request, as established by the host's
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub email: String,
    pub is_admin: bool,
}

/// Decides which requests get profiled.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    base_path: String,
    url_patterns: Vec<Regex>,
    admins_only: bool,
    emails: HashSet<String>,
}

impl AccessPolicy {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            url_patterns: Vec::new(),
            admins_only: false,
            emails: HashSet::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut policy = Self::new(cfg.base_path.clone()).admins_only(cfg.restrict_to_admins);
        policy = policy.allow_emails(cfg.restrict_to_emails.iter().cloned());
        for pattern in &cfg.restrict_to_urls {
            policy = policy.allow_url_pattern(pattern)?;
        }
        Ok(policy)
    }

    pub fn admins_only(mut self, yes: bool) -> Self {
        self.admins_only = yes;
        self
    }

    pub fn allow_emails<I: IntoIterator<Item = String>>(mut self, emails: I) -> Self {
        self.emails.extend(
            emails
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        );
        self
    }

    pub fn allow_url_pattern(mut self, pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(self);
        }
        let re = Regex::new(pattern)
            .map_err(|e| ProfilerError::Config(format!("bad url pattern {pattern}: {e}")))?;
        self.url_patterns.push(re);
        Ok(self)
    }

    fn restricted_to_users(&self) -> bool {
        self.admins_only || !self.emails.is_empty()
    }

    pub fn should_profile(&self, path: &str, viewer: Option<&Viewer>) -> bool {
        if path.starts_with(&self.base_path) {
            return false;
        }

        if !self.url_patterns.is_empty() && !self.url_patterns.iter().any(|p| p.is_match(path)) {
            return false;
        }

        if self.restricted_to_users() {
            let Some(viewer) = viewer else {
                return false;
            };
            if self.admins_only && !viewer.is_admin {
                return false;
            }
            if !self.emails.is_empty() && !self.emails.contains(&viewer.email) {
                return false;
            }
        }

        true
    }
}
