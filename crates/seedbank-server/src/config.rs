//! Environment-driven configuration.
//!
//! The server is a single long-running process wired up by its launcher;
//! every knob is a `SEEDBANK_*` variable with a default. Only the netDb
//! directory and the signer ID are mandatory.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address, `host:port`.
    pub addr: String,
    /// Directory of router-info files.
    pub netdb_dir: PathBuf,
    /// SU3 signer identity, e.g. `you@mail.i2p`.
    pub signer_id: String,
    /// PEM file holding the RSA signing key.
    pub signing_key: PathBuf,
    /// TLS certificate and key; plain HTTP when either is absent.
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    /// URL prefix for the reseed route, e.g. `/netdb`.
    pub prefix: String,
    /// Trust the first X-Forwarded-For value as the remote identity.
    pub trust_proxy: bool,
    /// Newline-delimited IPs to refuse connections from.
    pub blacklist_file: Option<PathBuf>,
    /// Router infos per bundle.
    pub num_ri: usize,
    /// Bundles per rebuild; 0 sizes the population from the pool.
    pub num_su3: usize,
    pub rebuild_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let netdb_dir = PathBuf::from(require("SEEDBANK_NETDB")?);
        let signer_id = require("SEEDBANK_SIGNER")?;

        // Like the signer certificate layout: the key defaults to
        // `<signer-with-@-mapped>.pem` in the working directory.
        let default_key = format!("{}.pem", signer_id.replacen('@', "_at_", 2));
        let signing_key = PathBuf::from(env_or("SEEDBANK_SIGNING_KEY", &default_key));

        Ok(Config {
            addr: env_or("SEEDBANK_ADDR", "0.0.0.0:8443"),
            netdb_dir,
            signer_id,
            signing_key,
            tls_cert: env::var("SEEDBANK_TLS_CERT").ok().map(PathBuf::from),
            tls_key: env::var("SEEDBANK_TLS_KEY").ok().map(PathBuf::from),
            prefix: env_or("SEEDBANK_PREFIX", ""),
            trust_proxy: env::var("SEEDBANK_TRUST_PROXY").is_ok(),
            blacklist_file: env::var("SEEDBANK_BLACKLIST").ok().map(PathBuf::from),
            num_ri: parse_env("SEEDBANK_NUM_RI", 75)?,
            num_su3: parse_env("SEEDBANK_NUM_SU3", 0)?,
            rebuild_interval: duration_env(
                "SEEDBANK_REBUILD_INTERVAL",
                Duration::from_secs(24 * 60 * 60),
            )?,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn duration_env(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_duration(&value).ok_or(ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Parse `90h` / `30m` / `45s` style durations.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.len() < 2 {
        return None;
    }
    let (number, unit) = s.split_at(s.len() - 1);
    let n: u64 = number.parse().ok()?;
    let secs = match unit {
        "h" => n.checked_mul(3600)?,
        "m" => n.checked_mul(60)?,
        "s" => n,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
