use std::env;
use std::time::Duration;

use crate::errors::Error;
use crate::Result;

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(s) => s
            .parse()
            .map_err(|_| Error::ConfigError(format!("{name}: invalid value {s:?}"))),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::ConfigError(format!("{name}: invalid boolean {s:?}"))),
        },
    }
}

/// Server configuration, read entirely from `NSCR_*` environment variables
/// per the defaults table. There is no config file -- every knob here has
/// a sane default so the binary runs out of the box.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub db_min_connections: u32,
    pub db_max_connections: u32,
    pub registry_url: Option<String>,
    pub gc_enabled: bool,
    pub gc_interval_hours: u64,
    pub max_upload_size_mb: u64,
    pub chunk_size_mb: u64,
    pub auth_enabled: bool,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub shutdown_endpoint_enabled: bool,
    pub session_ttl_hours: u64,
    pub manifest_require_blobs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env_parse("NSCR_PORT", 7000u16)?;
        let host = env_or("NSCR_HOST", "0.0.0.0");
        let database_path = env_or("NSCR_DATABASE_PATH", "./data/");
        let db_min_connections = env_parse("NSCR_DB_MIN_CONNECTIONS", 2u32)?;
        let db_max_connections = env_parse("NSCR_DB_MAX_CONNECTIONS", 10u32)?;
        let registry_url = env::var("NSCR_REGISTRY_URL").ok();
        let gc_enabled = env_bool("NSCR_GC_ENABLED", true)?;
        let gc_interval_hours = env_parse("NSCR_GC_INTERVAL_HOURS", 24u64)?;
        let max_upload_size_mb = env_parse("NSCR_MAX_UPLOAD_SIZE_MB", 1024u64)?;
        let chunk_size_mb = env_parse("NSCR_CHUNK_SIZE_MB", 10u64)?;
        let auth_enabled = env_bool("NSCR_AUTH_ENABLED", false)?;
        let auth_username = env::var("NSCR_AUTH_USERNAME").ok();
        let auth_password = env::var("NSCR_AUTH_PASSWORD").ok();
        let shutdown_endpoint_enabled = env_bool("NSCR_SHUTDOWN_ENDPOINT_ENABLED", false)?;
        let session_ttl_hours = env_parse("NSCR_SESSION_TTL_HOURS", 1u64)?;
        let manifest_require_blobs = env_bool("NSCR_MANIFEST_REQUIRE_BLOBS", true)?;

        if auth_enabled && (auth_username.is_none() || auth_password.is_none()) {
            return Err(Error::ConfigError(
                "NSCR_AUTH_ENABLED=true requires NSCR_AUTH_USERNAME and NSCR_AUTH_PASSWORD"
                    .to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            database_path,
            db_min_connections,
            db_max_connections,
            registry_url,
            gc_enabled,
            gc_interval_hours,
            max_upload_size_mb,
            chunk_size_mb,
            auth_enabled,
            auth_username,
            auth_password,
            shutdown_endpoint_enabled,
            session_ttl_hours,
            manifest_require_blobs,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The URL echoed in `Location` headers, defaulting to the loopback
    /// address the server itself is bound to.
    pub fn registry_url(&self) -> String {
        self.registry_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_hours * 3600)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_env_overrides() {
        // NSCR_AUTH_ENABLED etc are read individually so this only
        // exercises the parse path, not actual process env isolation.
        assert_eq!(env_or("NSCR_DOES_NOT_EXIST", "fallback"), "fallback");
        assert_eq!(env_parse("NSCR_DOES_NOT_EXIST", 7000u16).unwrap(), 7000);
        assert!(env_bool("NSCR_DOES_NOT_EXIST", true).unwrap());
    }
}
