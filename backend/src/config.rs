//! Server configuration read from the environment (and an optional `.env`).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_BIND: &str = "0.0.0.0:10000";
const DEFAULT_MAX_UPLOAD_MB: u64 = 200;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 300;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub workers: Option<usize>,
    pub shutdown_timeout: Duration,
    pub keep_alive: Duration,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind: SocketAddr = parse_or(&lookup, "SPLITTER_BIND", DEFAULT_BIND.parse::<SocketAddr>()?)?;
        let max_upload_mb: u64 = parse_or(&lookup, "SPLITTER_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;
        if max_upload_mb == 0 {
            anyhow::bail!("SPLITTER_MAX_UPLOAD_MB must be positive");
        }
        let workers = match lookup("SPLITTER_WORKERS") {
            Some(raw) => {
                let n: usize = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid SPLITTER_WORKERS: {raw}"))?;
                anyhow::ensure!(n > 0, "SPLITTER_WORKERS must be positive");
                Some(n)
            }
            None => None,
        };
        let shutdown_secs = parse_or(
            &lookup,
            "SPLITTER_SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?;
        let keep_alive_secs = parse_or(&lookup, "SPLITTER_KEEP_ALIVE_SECS", DEFAULT_KEEP_ALIVE_SECS)?;

        Ok(Self {
            bind,
            data_dir: lookup("SPLITTER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            workers,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
            keep_alive: Duration::from_secs(keep_alive_secs),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_deployment_profile() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind, "0.0.0.0:10000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(config.workers, None);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(300));
        assert_eq!(config.keep_alive, Duration::from_secs(5));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("SPLITTER_BIND", "127.0.0.1:8080"),
            ("SPLITTER_MAX_UPLOAD_MB", "5"),
            ("SPLITTER_WORKERS", "3"),
            ("SPLITTER_DATA_DIR", "/var/lib/splitter"),
            ("FFPROBE_PATH", "/opt/ffmpeg/bin/ffprobe"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/splitter"));
        assert_eq!(config.ffprobe_path, "/opt/ffmpeg/bin/ffprobe");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ServerConfig::from_lookup(lookup_from(&[("SPLITTER_MAX_UPLOAD_MB", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("SPLITTER_MAX_UPLOAD_MB"));

        assert!(ServerConfig::from_lookup(lookup_from(&[("SPLITTER_WORKERS", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("SPLITTER_MAX_UPLOAD_MB", "0")])).is_err());
    }
}
