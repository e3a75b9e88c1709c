use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};
use crate::ids::IdStrategy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Path prefix of the results/resource endpoints. Always ends in `/`.
    pub base_path: String,
    /// How long finished profiles stay retrievable.
    pub data_expiry: Duration,
    pub namespace: String,
    pub id_strategy: IdStrategy,
    pub html_id_prefix: String,
    pub max_stack_frames: Option<usize>,
    /// Browser cache lifetime of the UI resources; zero disables caching.
    pub resource_cache: Duration,
    pub restrict_to_admins: bool,
    pub restrict_to_emails: Vec<String>,
    pub restrict_to_urls: Vec<String>,
    pub db_path: Option<PathBuf>,
    pub listen_addr: String,
    pub retention_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: "/mini_profile/".to_string(),
            data_expiry: Duration::from_secs(30),
            namespace: "mini_profile".to_string(),
            id_strategy: IdStrategy::Counter,
            html_id_prefix: "mp".to_string(),
            max_stack_frames: None,
            resource_cache: Duration::ZERO,
            restrict_to_admins: false,
            restrict_to_emails: Vec::new(),
            restrict_to_urls: Vec::new(),
            db_path: None,
            listen_addr: "127.0.0.1:8080".to_string(),
            retention_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    base_path: Option<String>,
    data_expiry: Option<String>,
    namespace: Option<String>,
    id_strategy: Option<String>,
    html_id_prefix: Option<String>,
    max_stack_frames: Option<usize>,
    resource_cache: Option<String>,
    restrict_to_admins: Option<bool>,
    restrict_to_emails: Option<String>,
    restrict_to_urls: Option<String>,
    db_path: Option<PathBuf>,
    listen_addr: Option<String>,
    retention_interval: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("MINIPROF_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("miniprof/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ProfilerError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ProfilerError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let max_stack_frames = match env::var("MINIPROF_MAX_STACK_FRAMES") {
        Ok(v) => Some(v.parse::<usize>().map_err(|e| {
            ProfilerError::Config(format!("bad MINIPROF_MAX_STACK_FRAMES in environment: {e}"))
        })?),
        Err(_) => None,
    };
    let restrict_to_admins = match env::var("MINIPROF_RESTRICT_TO_ADMINS") {
        Ok(v) => Some(parse_bool(&v).ok_or_else(|| {
            ProfilerError::Config(format!(
                "bad MINIPROF_RESTRICT_TO_ADMINS in environment: {v}"
            ))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        base_path: env::var("MINIPROF_BASE_PATH").ok(),
        data_expiry: env::var("MINIPROF_DATA_EXPIRY").ok(),
        namespace: env::var("MINIPROF_NAMESPACE").ok(),
        id_strategy: env::var("MINIPROF_ID_STRATEGY").ok(),
        html_id_prefix: env::var("MINIPROF_HTML_ID_PREFIX").ok(),
        max_stack_frames,
        resource_cache: env::var("MINIPROF_RESOURCE_CACHE").ok(),
        restrict_to_admins,
        restrict_to_emails: env::var("MINIPROF_RESTRICT_TO_EMAILS").ok(),
        restrict_to_urls: env::var("MINIPROF_RESTRICT_TO_URLS").ok(),
        db_path: env::var("MINIPROF_DB_PATH").ok().map(PathBuf::from),
        listen_addr: env::var("MINIPROF_LISTEN_ADDR").ok(),
        retention_interval: env::var("MINIPROF_RETENTION_INTERVAL").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.base_path {
        cfg.base_path = normalize_base_path(&v);
    }
    if let Some(v) = overrides.data_expiry {
        cfg.data_expiry = parse_duration_field("data_expiry", &v, source)?;
    }
    if let Some(v) = overrides.namespace {
        let v = v.trim();
        if v.is_empty() {
            return Err(ProfilerError::Config(format!(
                "namespace in {source} cannot be empty"
            )));
        }
        cfg.namespace = v.to_string();
    }
    if let Some(v) = overrides.id_strategy {
        cfg.id_strategy = IdStrategy::from_str(&v).map_err(|e| {
            ProfilerError::Config(format!("bad id_strategy in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.html_id_prefix {
        cfg.html_id_prefix = v.trim().to_string();
    }
    if let Some(v) = overrides.max_stack_frames {
        cfg.max_stack_frames = Some(v);
    }
    if let Some(v) = overrides.resource_cache {
        cfg.resource_cache = parse_duration_field("resource_cache", &v, source)?;
    }
    if let Some(v) = overrides.restrict_to_admins {
        cfg.restrict_to_admins = v;
    }
    if let Some(v) = overrides.restrict_to_emails {
        cfg.restrict_to_emails = split_list(&v);
    }
    if let Some(v) = overrides.restrict_to_urls {
        cfg.restrict_to_urls = split_list(&v);
    }
    if let Some(v) = overrides.db_path {
        cfg.db_path = Some(v);
    }
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.retention_interval {
        cfg.retention_interval = parse_duration_field("retention_interval", &v, source)?;
    }
    Ok(())
}

fn parse_duration_field(field: &str, value: &str, source: &str) -> Result<Duration> {
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(value).map_err(|e| {
        ProfilerError::Config(format!("bad {field} in {source}: {e} (value={value})"))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    format!("/{trimmed}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.base_path, "/mini_profile/");
        assert_eq!(cfg.data_expiry, Duration::from_secs(30));
        assert_eq!(cfg.namespace, "mini_profile");
        assert_eq!(cfg.html_id_prefix, "mp");
        assert_eq!(cfg.resource_cache, Duration::ZERO);
        assert!(cfg.max_stack_frames.is_none());
        assert!(!cfg.restrict_to_admins);
    }

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" a@example.com, ,b@example.com "),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
    }

    #[test]
    fn normalizes_base_path() {
        assert_eq!(normalize_base_path("profiler"), "/profiler/");
        assert_eq!(normalize_base_path("/profiler/"), "/profiler/");
        assert_eq!(normalize_base_path(""), "/");
    }

    #[test]
    fn apply_file_overrides() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r#"
            base_path = "gae_mini_profile"
            data_expiry = "1m"
            id_strategy = "random"
            max_stack_frames = 8
            resource_cache = "2h"
            restrict_to_admins = true
            restrict_to_emails = "test@example.com,test2@example.com"
            restrict_to_urls = "^/test/url$, ^/test/regex/.*$"
            "#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.base_path, "/gae_mini_profile/");
        assert_eq!(cfg.data_expiry, Duration::from_secs(60));
        assert_eq!(cfg.id_strategy, IdStrategy::Random);
        assert_eq!(cfg.max_stack_frames, Some(8));
        assert_eq!(cfg.resource_cache, Duration::from_secs(7200));
        assert!(cfg.restrict_to_admins);
        assert_eq!(cfg.restrict_to_emails.len(), 2);
        assert_eq!(
            cfg.restrict_to_urls,
            vec!["^/test/url$".to_string(), "^/test/regex/.*$".to_string()]
        );
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        let bad_ttl = ConfigOverrides {
            data_expiry: Some("whenever".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad_ttl, "environment").is_err());

        let bad_ns = ConfigOverrides {
            namespace: Some("  ".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad_ns, "environment").is_err());
    }

    #[test]
    fn zero_cache_duration_is_accepted() {
        assert_eq!(
            parse_duration_field("resource_cache", "0", "test").unwrap(),
            Duration::ZERO
        );
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }
}
