use std::env;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("BIND_ADDR is not a socket address: {0}")]
    InvalidBindAddr(String),

    #[error("{name} must be true or false, got {value:?}")]
    InvalidFlag { name: &'static str, value: String },
}

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Mark the session cookie `Secure`. Enable behind HTTPS.
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/immo.db".to_string());

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddr(value))?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let secure_cookies = match env::var("SECURE_COOKIES") {
            Ok(value) => parse_flag("SECURE_COOKIES", &value)?,
            Err(_) => false,
        };

        Ok(Self {
            database_url,
            bind_addr,
            secure_cookies,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}
