//! Application configuration loaded once from the process environment.
//!
//! `main` calls [`AppConfig::from_env`] after `dotenvy` has populated the
//! environment; every component receives its settings through its
//! constructor and never touches `std::env` itself.

use chrono::FixedOffset;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_GOOGLE_REDIRECT_URI: &str = "http://localhost:8080/api/auth/google/callback";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which document store backs durable (non-guest) user data.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Memory,
    Postgres { database_url: String },
    Firebase { database_url: String, auth: Option<String> },
}

impl StoreConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Postgres { .. } => "postgres",
            StoreConfig::Firebase { .. } => "firebase",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub jwt_secret: String,
    pub completion: CompletionConfig,
    /// Number of prior messages sent as context with each completion.
    pub history_window: usize,
    pub store: StoreConfig,
    /// `None` disables Google sign-in; guests can still chat.
    pub google: Option<GoogleOAuthConfig>,
    /// Offset used for "today" and reminder due times. `None` means host local time.
    pub utc_offset: Option<FixedOffset>,
    /// `None` disables the reminder poller.
    pub reminder_poll: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let http_addr = match get("HTTP_ADDR") {
            Some(addr) => addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                name: "HTTP_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = require("JWT_SECRET")?;

        let completion = CompletionConfig {
            api_key: require("GROQ_API_KEY")?,
            url: get("COMPLETION_URL").unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            model: get("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
        };

        let history_window = match get("HISTORY_WINDOW") {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "HISTORY_WINDOW",
                reason: e.to_string(),
            })?,
            None => DEFAULT_HISTORY_WINDOW,
        };

        let store = match get("STORE_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => StoreConfig::Memory,
            "postgres" => StoreConfig::Postgres {
                database_url: require("DATABASE_URL")?,
            },
            "firebase" => StoreConfig::Firebase {
                database_url: require("FIREBASE_DATABASE_URL")?,
                auth: get("FIREBASE_AUTH"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    reason: format!("unknown backend '{}', expected memory, postgres or firebase", other),
                })
            }
        };

        let google = match (get("GOOGLE_OAUTH_CLIENT_ID"), get("GOOGLE_OAUTH_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_uri: get("GOOGLE_OAUTH_REDIRECT_URI")
                    .unwrap_or_else(|| DEFAULT_GOOGLE_REDIRECT_URI.to_string()),
            }),
            _ => None,
        };

        let utc_offset = match get("LOCAL_UTC_OFFSET") {
            Some(raw) => Some(parse_utc_offset(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "LOCAL_UTC_OFFSET",
                reason: format!("expected +HH:MM or -HH:MM, got '{}'", raw),
            })?),
            None => None,
        };

        let reminder_poll = match get("REMINDER_POLL_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "REMINDER_POLL_SECS",
                    reason: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "REMINDER_POLL_SECS",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            http_addr,
            jwt_secret,
            completion,
            history_window,
            store,
            google,
            utc_offset,
            reminder_poll,
        })
    }
}

/// Parses `+HH:MM`, `-HH:MM` or `Z`.
fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    if raw.eq_ignore_ascii_case("z") || raw == "+00:00" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret"), ("GROQ_API_KEY", "gsk")])).unwrap();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.history_window, 10);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.completion.model, DEFAULT_COMPLETION_MODEL);
        assert!(config.google.is_none());
        assert!(config.reminder_poll.is_none());
    }

    #[test]
    fn test_missing_required_fields() {
        let err = AppConfig::from_lookup(lookup(&[("GROQ_API_KEY", "gsk")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));

        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("GROQ_API_KEY", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GROQ_API_KEY"));
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("GROQ_API_KEY", "k"),
            ("STORE_BACKEND", "postgres"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_unknown_backend_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("GROQ_API_KEY", "k"),
            ("STORE_BACKEND", "mongo"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STORE_BACKEND", .. }));
    }

    #[test]
    fn test_google_requires_both_credentials() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("GROQ_API_KEY", "k"),
            ("GOOGLE_OAUTH_CLIENT_ID", "id"),
        ]))
        .unwrap();
        assert!(config.google.is_none());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("-05:00"), FixedOffset::west_opt(5 * 3600));
        assert_eq!(parse_utc_offset("+05:30"), FixedOffset::east_opt(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("0500"), None);
        assert_eq!(parse_utc_offset("+25:00"), None);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("GROQ_API_KEY", "k"),
            ("REMINDER_POLL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REMINDER_POLL_SECS", .. }));
    }
}
