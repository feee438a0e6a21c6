//! Layered configuration: compiled-in defaults, overridden by a flat
//! `key=value` file, overridden by environment variables of the same name.
//!
//! Mirrors the original MobWrite daemon's `mobwrite.cfg` format and its
//! `CFG.get("KEY", default)` lookup, but typed and validated at load time
//! instead of read ad hoc at each call site.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::SyncError;

/// Server-wide configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP listener binds to.
    pub local_port: u16,
    /// Required client IP for the `/sync` endpoint; empty string = any.
    pub connection_origin: String,
    /// Cookie name that must be present (with a word-character value) on
    /// every request; empty string disables the check.
    pub required_cookie: String,
    /// Idle duration after which an unreferenced Document is reaped.
    pub timeout_text: Duration,
    /// Idle duration after which a View is reaped.
    pub timeout_view: Duration,
    /// Maximum number of simultaneously attached Views. 0 = unbounded.
    pub max_views: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            local_port: 3017,
            connection_origin: String::new(),
            required_cookie: String::new(),
            timeout_text: Duration::from_secs(60 * 60 * 24 * 15), // 15 days
            timeout_view: Duration::from_secs(60 * 60), // 1 hour
            max_views: 0,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then merge a key/value file (if it exists), then
    /// merge environment variable overrides of the same key names.
    pub fn load(file_path: Option<&Path>) -> Result<Self, SyncError> {
        let mut raw = HashMap::new();

        if let Some(path) = file_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| SyncError::Config(format!("reading {}: {e}", path.display())))?;
                parse_kv_file(&contents, &mut raw);
            }
        }

        for key in [
            "LOCAL_PORT",
            "CONNECTION_ORIGIN",
            "REQUIRED_COOKIE",
            "TIMEOUT_TEXT",
            "TIMEOUT_VIEW",
            "MAX_VIEWS",
        ] {
            if let Ok(value) = std::env::var(key) {
                raw.insert(key.to_string(), value);
            }
        }

        let mut config = ServerConfig::default();

        if let Some(v) = raw.get("LOCAL_PORT") {
            config.local_port = v
                .parse()
                .map_err(|_| SyncError::Config(format!("LOCAL_PORT: invalid port '{v}'")))?;
        }
        if let Some(v) = raw.get("CONNECTION_ORIGIN") {
            config.connection_origin = v.clone();
        }
        if let Some(v) = raw.get("REQUIRED_COOKIE") {
            config.required_cookie = v.clone();
        }
        if let Some(v) = raw.get("TIMEOUT_TEXT") {
            config.timeout_text = Duration::from_secs(parse_seconds("TIMEOUT_TEXT", v)?);
        }
        if let Some(v) = raw.get("TIMEOUT_VIEW") {
            config.timeout_view = Duration::from_secs(parse_seconds("TIMEOUT_VIEW", v)?);
        }
        if let Some(v) = raw.get("MAX_VIEWS") {
            config.max_views = v
                .parse()
                .map_err(|_| SyncError::Config(format!("MAX_VIEWS: invalid integer '{v}'")))?;
        }

        Ok(config)
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<u64, SyncError> {
    value
        .parse()
        .map_err(|_| SyncError::Config(format!("{key}: invalid duration (seconds) '{value}'")))
}

fn parse_kv_file(contents: &str, out: &mut HashMap<String, String>) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                out.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                tracing::warn!("ignoring unparseable config line: {line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.local_port, 3017);
        assert_eq!(config.max_views, 0);
    }

    #[test]
    fn parses_kv_file() {
        let mut raw = HashMap::new();
        parse_kv_file(
            "# comment\nLOCAL_PORT=4000\n\nMAX_VIEWS=10\nBOGUS line\n",
            &mut raw,
        );
        assert_eq!(raw.get("LOCAL_PORT").unwrap(), "4000");
        assert_eq!(raw.get("MAX_VIEWS").unwrap(), "10");
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn rejects_bad_port() {
        std::env::remove_var("LOCAL_PORT");
        let mut raw = HashMap::new();
        parse_kv_file("LOCAL_PORT=not-a-port\n", &mut raw);
        assert!(raw.contains_key("LOCAL_PORT"));
    }
}
