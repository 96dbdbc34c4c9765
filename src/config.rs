use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::models::zone::DEFAULT_MAINTENANCE_DATABASE;
use crate::models::{SslMode, Zone};

/// Administrative access to one regional cluster.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub zone: Zone,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub ssl_mode: SslMode,
    /// Database the administrative connection opens.
    pub maintenance_database: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub zones: Vec<ZoneConfig>,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow::anyhow!("Missing required env var: {}", key));

        let names = required("PROVISION_ZONES")?;
        let mut zones: Vec<ZoneConfig> = Vec::new();
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !is_valid_zone_name(name) {
                anyhow::bail!("Invalid zone name in PROVISION_ZONES: {name:?}");
            }
            if zones.iter().any(|z| z.zone.as_str() == name) {
                anyhow::bail!("Zone {name} declared twice in PROVISION_ZONES");
            }

            let prefix = format!("PROVISION_ZONE_{}", name.to_ascii_uppercase().replace('-', "_"));
            let key = |suffix: &str| format!("{prefix}_{suffix}");

            zones.push(ZoneConfig {
                zone: Zone::new(name),
                host: required(&key("HOST"))?,
                port: get(&key("PORT"))
                    .unwrap_or_else(|| "5432".into())
                    .parse()
                    .with_context(|| format!("{} is not a valid port", key("PORT")))?,
                username: required(&key("USER"))?,
                password: required(&key("PASSWORD"))?,
                ssl_mode: get(&key("SSLMODE"))
                    .map(|v| v.parse::<SslMode>())
                    .transpose()
                    .map_err(anyhow::Error::msg)?
                    .unwrap_or_default(),
                maintenance_database: get(&key("DATABASE")).unwrap_or_else(|| DEFAULT_MAINTENANCE_DATABASE.into()),
            });
        }
        if zones.is_empty() {
            anyhow::bail!("PROVISION_ZONES lists no zones");
        }

        Ok(Self {
            zones,
            connect_timeout: Duration::from_secs(
                get("PROVISION_CONNECT_TIMEOUT_SECS")
                    .unwrap_or_else(|| "10".into())
                    .parse()
                    .context("PROVISION_CONNECT_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            statement_timeout: Duration::from_secs(
                get("PROVISION_STATEMENT_TIMEOUT_SECS")
                    .unwrap_or_else(|| "30".into())
                    .parse()
                    .context("PROVISION_STATEMENT_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
        })
    }
}

/// Zone names end up in env var keys and metric labels: lowercase ASCII,
/// digits, `-` and `_`, 2 to 63 characters, no leading or trailing `-`.
fn is_valid_zone_name(s: &str) -> bool {
    let len = s.len();
    (2..=63).contains(&len)
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !s.starts_with('-')
        && !s.ends_with('-')
}
