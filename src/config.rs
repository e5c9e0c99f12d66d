use std::net::SocketAddr;

use thiserror::Error;

use crate::auth::ProviderKeys;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MIN_SESSION_KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub session_key: String,
    pub bind_addr: SocketAddr,
    pub public_url: String,
    pub page_size: u32,
    pub secure_cookies: bool,
    pub google: Option<ProviderKeys>,
    pub github: Option<ProviderKeys>,
}

impl Config {
    /// Reads configuration from the process environment, honouring a `.env`
    /// file when present.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let session_key = get("SESSION_KEY").ok_or(ConfigError::Missing("SESSION_KEY"))?;
        if session_key.len() < MIN_SESSION_KEY_LEN {
            return Err(ConfigError::Invalid {
                name: "SESSION_KEY",
                reason: format!("must be at least {MIN_SESSION_KEY_LEN} bytes"),
            });
        }

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => addr.parse().map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let public_url = get("PUBLIC_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_owned())
            .trim_end_matches('/')
            .to_owned();

        let page_size = match get("PAGE_SIZE") {
            Some(size) => match size.parse::<u32>() {
                Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "PAGE_SIZE",
                        reason: format!("expected 1..={MAX_PAGE_SIZE}, got {size}"),
                    });
                }
            },
            None => DEFAULT_PAGE_SIZE,
        };

        let secure_cookies = match get("SECURE_COOKIES").as_deref() {
            None => false,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SECURE_COOKIES",
                    reason: format!("expected a boolean, got {other}"),
                });
            }
        };

        let provider = |id: &'static str, secret: &'static str| -> Result<Option<ProviderKeys>, ConfigError> {
            match (get(id), get(secret)) {
                (Some(client_id), Some(client_secret)) => Ok(Some(ProviderKeys { client_id, client_secret })),
                (None, None) => Ok(None),
                (Some(_), None) => Err(ConfigError::Missing(secret)),
                (None, Some(_)) => Err(ConfigError::Missing(id)),
            }
        };

        Ok(Config {
            database_url,
            session_key,
            bind_addr,
            public_url,
            page_size,
            secure_cookies,
            google: provider("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET")?,
            github: provider("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET")?,
        })
    }
}
