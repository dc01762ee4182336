use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub app_url: String,
    pub app_env: String,
    pub public_rps: u32,
    pub admin_rps: u32,
    pub mail_relay_url: Option<String>,
    pub uploads_dir: String,
    pub max_recording_bytes: usize,
    pub deadline_sweep_secs: u64,
    pub reveal_assigned_email: bool,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            jwt_secret: get_env("JWT_SECRET")?,
            app_url: get_env_or("APP_URL", "http://localhost:3000".to_string())?,
            app_env: get_env_or("APP_ENV", "development".to_string())?,
            public_rps: get_env_or("PUBLIC_RPS", 50)?,
            admin_rps: get_env_or("ADMIN_RPS", 50)?,
            mail_relay_url: env::var("MAIL_RELAY_URL").ok().filter(|v| !v.trim().is_empty()),
            uploads_dir: get_env_or("UPLOADS_DIR", "uploads".to_string())?,
            max_recording_bytes: get_env_or("MAX_RECORDING_BYTES", 10 * 1024 * 1024)?,
            deadline_sweep_secs: get_env_or("DEADLINE_SWEEP_SECS", 30)?,
            reveal_assigned_email: get_env_or("REVEAL_ASSIGNED_EMAIL", false)?,
        };
        check_url("APP_URL", &config.app_url)?;
        if let Some(relay) = &config.mail_relay_url {
            check_url("MAIL_RELAY_URL", relay)?;
        }
        Ok(config)
    }

    /// Whether error bodies may carry internal diagnostic detail.
    pub fn expose_error_details(&self) -> bool {
        !self.app_env.eq_ignore_ascii_case("production")
    }

    /// Link a candidate follows to redeem an invite.
    pub fn redemption_link(&self, token: &str) -> String {
        format!("{}/test/verify/{}", self.app_url.trim_end_matches('/'), token)
    }
}

fn check_url(name: &str, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid URL in {}: {}", name, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "Unsupported scheme {} in {}",
            other, name
        ))),
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_must_be_http() {
        assert!(check_url("APP_URL", "https://exams.example.com").is_ok());
        assert!(check_url("APP_URL", "ftp://exams.example.com").is_err());
        assert!(check_url("APP_URL", "not a url").is_err());
    }
}
