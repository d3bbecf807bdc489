use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::portal::resolve_base_url;
use crate::services::engine::{DEFAULT_POLL_INTERVAL, DEFAULT_VOLUNTEER_LEVEL, EngineSettings};

const DEFAULT_DATABASE_URL: &str = "sqlite://xkbot.db?mode=rwc";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub protocol: String,
    pub cookie: Option<String>,
    pub poll_interval: Duration,
    pub volunteer_level: u8,
    pub request_timeout: Duration,
    pub database_url: String,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("XK_HOST")
            .ok_or_else(|| AppError::Config("XK_HOST is not set".to_string()))?;
        let protocol = var("XK_PROTOCOL").unwrap_or_else(|| "https".to_string());
        let cookie = var("XK_COOKIE");

        let poll_interval = match var("XK_POLL_INTERVAL_MS") {
            Some(raw) => {
                let ms = parse_number::<u64>("XK_POLL_INTERVAL_MS", &raw)?;
                if ms == 0 {
                    return Err(AppError::Config(
                        "XK_POLL_INTERVAL_MS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_POLL_INTERVAL,
        };

        let volunteer_level = match var("XK_VOLUNTEER_LEVEL") {
            Some(raw) => parse_number::<u8>("XK_VOLUNTEER_LEVEL", &raw)?,
            None => DEFAULT_VOLUNTEER_LEVEL,
        };

        let request_timeout = match var("XK_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("XK_REQUEST_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            host,
            protocol,
            cookie,
            poll_interval,
            volunteer_level,
            request_timeout,
            database_url,
        })
    }

    pub fn base_url(&self) -> String {
        resolve_base_url(&self.host, &self.protocol)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            base_url: self.base_url(),
            poll_interval: self.poll_interval,
            volunteer_level: self.volunteer_level,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} is not a valid number: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("XK_HOST", "jwxt.example.edu.cn")]).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.volunteer_level, 1);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert!(cfg.cookie.is_none());
        assert_eq!(cfg.base_url(), "https://jwxt.example.edu.cn/xsxk");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("XK_HOST", "127.0.0.1:8080"),
            ("XK_COOKIE", "JSESSIONID=abc"),
            ("XK_POLL_INTERVAL_MS", "250"),
            ("XK_VOLUNTEER_LEVEL", "3"),
            ("DATABASE_URL", "sqlite::memory:"),
        ])
        .unwrap();
        assert_eq!(cfg.cookie.as_deref(), Some("JSESSIONID=abc"));
        let settings = cfg.engine_settings();
        assert_eq!(settings.base_url, "http://127.0.0.1:8080/xsxk");
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.volunteer_level, 3);
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(config(&[]), Err(AppError::Config(_))));
        assert!(matches!(config(&[("XK_HOST", "  ")]), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_numbers() {
        for (key, value) in [
            ("XK_POLL_INTERVAL_MS", "0"),
            ("XK_POLL_INTERVAL_MS", "fast"),
            ("XK_VOLUNTEER_LEVEL", "300"),
            ("XK_REQUEST_TIMEOUT_SECS", "-1"),
        ] {
            let result = config(&[("XK_HOST", "h"), (key, value)]);
            assert!(matches!(result, Err(AppError::Config(_))), "{key}={value}");
        }
    }
}
