use crate::scan::{CallbackRegistry, CursorPolicy, PatternTemplate};
use crate::store::StoreConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_STORE_URL: &str = "KEYSCAN_STORE_URL";
pub const ENV_STORE_USERNAME: &str = "KEYSCAN_STORE_USERNAME";
pub const ENV_STORE_PASSWORD: &str = "KEYSCAN_STORE_PASSWORD";

const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One scan endpoint: which query parameters feed which template slot.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Route path, e.g. `/users/scan`.
    pub path: String,
    /// Query parameter carrying the environment value.
    pub env_param: String,
    /// Query parameter carrying the parent namespace value.
    pub parent_param: String,
    /// Query parameter carrying the child namespace value.
    pub child_param: String,
    /// Fixed entity substituted into the first placeholder.
    pub entity: String,
    /// Pattern template with up to four `%s` placeholders.
    pub pattern: String,
    #[serde(default)]
    pub callbacks: Vec<String>,
    #[serde(default)]
    pub cursor_policy: CursorPolicy,
}

/// Service configuration, loaded from TOML.
///
/// ```toml
/// listen = "0.0.0.0:8080"
/// scan_timeout_ms = 30000
///
/// [store]
/// engine = "redis"
/// url = "redis://127.0.0.1:6379/0"
///
/// [[endpoint]]
/// path = "/sessions"
/// env_param = "env"
/// parent_param = "team"
/// child_param = "sub"
/// entity = "session"
/// pattern = "user:%s:%s:%s:%s"
/// callbacks = ["touch"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: String,
    pub log_level: String,
    /// Per-request scan deadline; unset means scans run until the store finishes.
    pub scan_timeout_ms: Option<u64>,
    pub store: StoreConfig,
    #[serde(rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            log_level: "info".into(),
            scan_timeout_ms: None,
            store: StoreConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }

    /// Overlay store connection settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_STORE_URL) {
            self.store.url = url;
        }
        if let Some(user) = lookup(ENV_STORE_USERNAME) {
            self.store.username = Some(user);
        }
        if let Some(pass) = lookup(ENV_STORE_PASSWORD) {
            self.store.password = Some(pass);
        }
    }

    /// Check the config is servable. Returns warnings for things that work but are
    /// probably mistakes, such as callbacks the registry does not know.
    pub fn validate(&self, registry: &CallbackRegistry) -> Result<Vec<String>, ConfigError> {
        let mut warnings = Vec::new();
        if self.store.page_hint == 0 {
            return Err(ConfigError::Invalid("store.page_hint must be greater than zero".into()));
        }
        if self.scan_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("scan_timeout_ms must be greater than zero".into()));
        }

        let mut paths = HashSet::new();
        for ep in &self.endpoints {
            if !ep.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!("endpoint path {:?} must start with '/'", ep.path)));
            }
            if RESERVED_PATHS.contains(&ep.path.as_str()) {
                return Err(ConfigError::Invalid(format!("endpoint path {} is reserved", ep.path)));
            }
            if !paths.insert(ep.path.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate endpoint path {}", ep.path)));
            }
            for (field, name) in [("env_param", &ep.env_param), ("parent_param", &ep.parent_param), ("child_param", &ep.child_param)] {
                if name.is_empty() || name == "cursor" {
                    return Err(ConfigError::Invalid(format!("{}: {} must be non-empty and not \"cursor\"", ep.path, field)));
                }
            }
            PatternTemplate::parse(&ep.pattern)
                .map_err(|e| ConfigError::Invalid(format!("{}: {}", ep.path, e)))?;
            for id in &ep.callbacks {
                if !registry.contains(id) {
                    warnings.push(format!("{}: unknown callback {:?} will be skipped", ep.path, id));
                }
            }
        }
        if self.endpoints.is_empty() {
            warnings.push("no [[endpoint]] configured; only /health and /metrics will be served".into());
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreEngine;
    use std::io::Write;

    const SAMPLE: &str = r#"
listen = "127.0.0.1:9000"
scan_timeout_ms = 500

[store]
engine = "memory"
page_hint = 25
seed = ["user:session:prod:a:b"]

[[endpoint]]
path = "/sessions"
env_param = "env"
parent_param = "team"
child_param = "sub"
entity = "session"
pattern = "user:%s:%s:%s:%s"
callbacks = ["touch", "nope"]
cursor_policy = "reject"
"#;

    #[test]
    fn test_parse_sample() {
        let cfg = ServiceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.store.engine, StoreEngine::Memory);
        assert_eq!(cfg.store.page_hint, 25);
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.endpoints[0].cursor_policy, CursorPolicy::Reject);

        let warnings = cfg.validate(&CallbackRegistry::with_builtins()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("nope"));
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = ServiceConfig::load(f.path()).unwrap();
        assert_eq!(cfg.scan_timeout_ms, Some(500));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ServiceConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides_store_target() {
        let mut cfg = ServiceConfig::default();
        cfg.apply_env_with(|name| match name {
            ENV_STORE_URL => Some("redis://cache:6380".into()),
            ENV_STORE_PASSWORD => Some("hunter2".into()),
            _ => None,
        });
        assert_eq!(cfg.store.url, "redis://cache:6380");
        assert_eq!(cfg.store.username, None);
        assert_eq!(cfg.store.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let registry = CallbackRegistry::with_builtins();
        let mut cfg = ServiceConfig::from_toml_str(SAMPLE).unwrap();

        cfg.endpoints[0].pattern = "user:%d".into();
        assert!(matches!(cfg.validate(&registry), Err(ConfigError::Invalid(_))));

        let mut cfg = ServiceConfig::from_toml_str(SAMPLE).unwrap();
        cfg.endpoints[0].path = "/metrics".into();
        assert!(cfg.validate(&registry).is_err());

        let mut cfg = ServiceConfig::from_toml_str(SAMPLE).unwrap();
        let dup = cfg.endpoints[0].clone();
        cfg.endpoints.push(dup);
        assert!(cfg.validate(&registry).is_err());

        let mut cfg = ServiceConfig::from_toml_str(SAMPLE).unwrap();
        cfg.endpoints[0].env_param = "cursor".into();
        assert!(cfg.validate(&registry).is_err());
    }
}
