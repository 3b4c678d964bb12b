//! # Configuration Management
//!
//! Configuration comes from the environment ("12-factor app"), with a `.env`
//! file loaded first if one exists.
//!
//! ## Environment Variables
//! - `HOST`, `PORT`: bind address (default: 127.0.0.1:8080)
//! - `DATABASE_URL`: SQLite connection string for credentials and sessions
//! - `RP_ID`: WebAuthn Relying Party ID (usually your domain)
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL)
//! - `RP_NAME`: Human-readable name shown by authenticators
//! - `CHALLENGE_TTL_SECS`: how long issued options stay valid (default: 300)
//! - `CHALLENGE_SWEEP_SECS`: interval of the expired-challenge sweep (default: 60)
//! - `REMEMBER_ME_DAYS`: lifetime of a signed-in session (default: 30, at most 3650)
//! - `LOGIN_REDIRECT_URL`: where the browser goes after a successful assertion
//! - `DIRECTORY_PATH`: JSON file with the identity provider's accounts

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Ten years; longer sessions are almost certainly a typo
const MAX_REMEMBER_ME_DAYS: u64 = 3650;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    /// Examples: "127.0.0.1" (localhost only), "0.0.0.0" (all interfaces)
    pub host: String,

    pub port: u16,

    /// SQLite database connection URL
    /// Format: "sqlite:filename.db?mode=rwc" (read, write, create if missing)
    pub database_url: String,

    /// WebAuthn Relying Party ID
    /// Must match the domain the app is served from, without scheme or port
    pub rp_id: String,

    /// WebAuthn Relying Party Origin, e.g. "https://idp.example.com"
    pub rp_origin: String,

    pub rp_name: String,

    pub challenge_ttl: Duration,
    pub challenge_sweep_interval: Duration,

    /// How long a session stays signed in after a successful assertion
    pub remember_me: time::Duration,

    pub login_redirect_url: String,
    pub directory_path: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey-idp.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=FIDO2 Server
    /// CHALLENGE_TTL_SECS=300
    /// REMEMBER_ME_DAYS=30
    /// DIRECTORY_PATH=directory.json
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (dotenvy doesn't error if file missing)
        dotenvy::dotenv().ok();

        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Missing variables
    /// get their defaults; present but unparsable ones are an error.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());
        let number = |name: &str, default: u64| -> Result<u64> {
            match var(name) {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("{} must be a number, got '{}'", name, value)),
                None => Ok(default),
            }
        };

        let rp_origin = get("RP_ORIGIN", "http://localhost:8080");
        let login_redirect_url = var("LOGIN_REDIRECT_URL")
            .unwrap_or_else(|| format!("{}/login", rp_origin.trim_end_matches('/')));

        let remember_me_days = number("REMEMBER_ME_DAYS", 30)?;
        anyhow::ensure!(
            (1..=MAX_REMEMBER_ME_DAYS).contains(&remember_me_days),
            "REMEMBER_ME_DAYS must be between 1 and {}, got {}",
            MAX_REMEMBER_ME_DAYS,
            remember_me_days
        );

        Ok(Config {
            host: get("HOST", "127.0.0.1"),
            port: get("PORT", "8080")
                .parse()
                .context("PORT must be a valid port number")?,
            database_url: get("DATABASE_URL", "sqlite:passkey-idp.db?mode=rwc"),
            rp_id: get("RP_ID", "localhost"),
            rp_origin,
            rp_name: get("RP_NAME", "FIDO2 Server"),
            challenge_ttl: Duration::from_secs(number("CHALLENGE_TTL_SECS", 300)?),
            challenge_sweep_interval: Duration::from_secs(number("CHALLENGE_SWEEP_SECS", 60)?.max(1)),
            remember_me: time::Duration::days(remember_me_days as i64),
            login_redirect_url,
            directory_path: get("DIRECTORY_PATH", "directory.json"),
        })
    }

    /// Socket address for `tokio::net::TcpListener::bind()`, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.rp_id, "localhost");
        assert_eq!(config.rp_name, "FIDO2 Server");
        assert_eq!(config.challenge_ttl, Duration::from_secs(300));
        assert_eq!(config.challenge_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.remember_me, time::Duration::days(30));
        assert_eq!(config.login_redirect_url, "http://localhost:8080/login");
        assert_eq!(config.directory_path, "directory.json");
    }

    #[test]
    fn redirect_follows_origin() {
        let derived = config(&[("RP_ORIGIN", "https://idp.example.com/")]).unwrap();
        assert_eq!(derived.login_redirect_url, "https://idp.example.com/login");

        let explicit = config(&[("LOGIN_REDIRECT_URL", "https://app.example.com/")]).unwrap();
        assert_eq!(explicit.login_redirect_url, "https://app.example.com/");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("PORT", "5001"),
            ("CHALLENGE_TTL_SECS", "30"),
            ("REMEMBER_ME_DAYS", "7"),
        ])
        .unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.challenge_ttl, Duration::from_secs(30));
        assert_eq!(config.remember_me, time::Duration::days(7));
    }

    #[test]
    fn invalid_numbers_are_errors() {
        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("CHALLENGE_TTL_SECS", "-1")]).is_err());
    }

    #[test]
    fn remember_me_must_be_a_sane_number_of_days() {
        assert!(config(&[("REMEMBER_ME_DAYS", "0")]).is_err());
        assert!(config(&[("REMEMBER_ME_DAYS", "4000000")]).is_err());
        assert!(config(&[("REMEMBER_ME_DAYS", "100000000000000")]).is_err());

        let longest = config(&[("REMEMBER_ME_DAYS", "3650")]).unwrap();
        assert_eq!(longest.remember_me, time::Duration::days(3650));
    }
}
