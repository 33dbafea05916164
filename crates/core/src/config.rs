//! Configuration types shared by the monitor and migration binaries.
//!
//! Values come from an optional TOML file overridden by the process
//! environment. Keys match the environment variable names, lowercased
//! (`STORAGE_SIZE` in the environment, `storage_size` in TOML).

use crate::size::ByteSize;
use crate::{Error, Result};
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use figment::value::Value;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variables read by the storage monitor.
pub const MONITOR_ENV_KEYS: &[&str] = &[
    "DB_URL",
    "CLICKHOUSE_USERNAME",
    "CLICKHOUSE_PASSWORD",
    "CLICKHOUSE_DATABASE",
    "TABLE_NAME",
    "MV_NAMES",
    "STORAGE_SIZE",
    "THRESHOLD",
    "DELETE_PERCENTAGE",
    "EXEC_INTERVAL",
    "SKIP_ROUNDS_NUM",
    "INSERTION_TIME_COLUMN",
];

/// Environment variables read by the schema migrator.
pub const MIGRATION_ENV_KEYS: &[&str] = &[
    "DB_URL",
    "CLICKHOUSE_USERNAME",
    "CLICKHOUSE_PASSWORD",
    "CLICKHOUSE_DATABASE",
    "TABLE_NAME",
    "THEIA_VERSION",
];

/// Variables whose values are used verbatim, even when they look like numbers.
const VERBATIM_ENV_KEYS: &[&str] = &[
    "DB_URL",
    "CLICKHOUSE_USERNAME",
    "CLICKHOUSE_PASSWORD",
    "CLICKHOUSE_DATABASE",
    "TABLE_NAME",
    "MV_NAMES",
    "STORAGE_SIZE",
    "INSERTION_TIME_COLUMN",
    "THEIA_VERSION",
];

/// Load configuration from an optional TOML file and the given environment keys.
///
/// A missing file is not an error; the environment alone may provide everything.
pub fn load<T: DeserializeOwned>(
    config_file: Option<&Path>,
    env_keys: &[&str],
) -> std::result::Result<T, figment::Error> {
    load_with_env(config_file, env_keys, |key| std::env::var(key).ok())
}

/// Like [`load`], reading variables through `lookup` instead of the process environment.
pub fn load_with_env<T, F>(
    config_file: Option<&Path>,
    env_keys: &[&str],
    lookup: F,
) -> std::result::Result<T, figment::Error>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<String>,
{
    let mut figment = Figment::new();
    if let Some(path) = config_file {
        if path.exists() {
            tracing::info!(config_path = %path.display(), "Loading configuration from file");
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::debug!("No config file found at {}", path.display());
        }
    }
    figment
        .merge(Serialized::defaults(env_values(env_keys, lookup)))
        .extract()
}

/// Environment values keyed like the TOML file.
///
/// Credentials and names stay strings; the remaining values are parsed so
/// that `THRESHOLD=0.5` becomes a number.
fn env_values<F>(env_keys: &[&str], lookup: F) -> BTreeMap<String, Value>
where
    F: Fn(&str) -> Option<String>,
{
    env_keys
        .iter()
        .filter_map(|key| {
            let raw = lookup(key)?;
            let value = if VERBATIM_ENV_KEYS.contains(key) {
                Value::from(raw)
            } else {
                raw.parse::<Value>().unwrap_or_else(|_| Value::from(raw.clone()))
            };
            Some((key.to_ascii_lowercase(), value))
        })
        .collect()
}

/// ClickHouse connection settings.
#[derive(Clone, Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP endpoint, e.g. `http://clickhouse-clickhouse:8123`.
    #[serde(rename = "db_url", deserialize_with = "de::lenient_string")]
    pub url: String,
    #[serde(rename = "clickhouse_username", deserialize_with = "de::lenient_string")]
    pub username: String,
    #[serde(rename = "clickhouse_password", deserialize_with = "de::lenient_string")]
    pub password: String,
    /// Database to use instead of the server default.
    #[serde(rename = "clickhouse_database", default)]
    pub database: Option<String>,
}

impl ClickHouseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() || self.username.is_empty() || self.password.is_empty() {
            return Err(Error::Config(
                "DB_URL, CLICKHOUSE_USERNAME and CLICKHOUSE_PASSWORD must be defined".to_string(),
            ));
        }
        Ok(())
    }
}

// Keep the password out of logs.
impl fmt::Debug for ClickHouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Retention policy applied by the storage monitor.
///
/// Immutable for the lifetime of the process.
#[derive(Clone, Debug, Deserialize)]
pub struct RetentionConfig {
    /// Base flow table.
    #[serde(default = "default_table_name", deserialize_with = "de::lenient_string")]
    pub table_name: String,
    /// Derived views pruned together with the base table, in this order.
    #[serde(rename = "mv_names", default = "default_view_names", deserialize_with = "de::view_names")]
    pub view_names: Vec<String>,
    /// Disk space allocated to the store.
    #[serde(rename = "storage_size")]
    pub allocated_space: ByteSize,
    /// Evict once free space drops below `threshold * allocated_space`.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Fraction of base-table rows removed per eviction round.
    #[serde(default = "default_delete_percentage")]
    pub delete_percentage: f64,
    /// Sleep between rounds.
    #[serde(rename = "exec_interval", default = "default_poll_interval", deserialize_with = "de::duration")]
    pub poll_interval: Duration,
    /// Rounds to stay idle after an eviction round.
    #[serde(rename = "skip_rounds_num", default = "default_idle_rounds")]
    pub idle_rounds_to_skip: u32,
    /// Column holding the row insertion time.
    #[serde(default = "default_insertion_time_column", deserialize_with = "de::lenient_string")]
    pub insertion_time_column: String,
}

fn default_table_name() -> String {
    "flows".to_string()
}

fn default_view_names() -> Vec<String> {
    ["flows_pod_view", "flows_node_view", "flows_policy_view"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_delete_percentage() -> f64 {
    0.5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_idle_rounds() -> u32 {
    3
}

fn default_insertion_time_column() -> String {
    "timeInserted".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            view_names: default_view_names(),
            allocated_space: ByteSize::default(),
            threshold: default_threshold(),
            delete_percentage: default_delete_percentage(),
            poll_interval: default_poll_interval(),
            idle_rounds_to_skip: default_idle_rounds(),
            insertion_time_column: default_insertion_time_column(),
        }
    }
}

impl RetentionConfig {
    /// All tables pruned in one round: the base table first, then each view.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table_name.as_str()).chain(self.view_names.iter().map(String::as_str))
    }

    /// Reject settings the monitor cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(Error::Config("TABLE_NAME cannot be empty".to_string()));
        }
        if let Some(name) = self.tables().find(|name| !is_identifier(name)) {
            return Err(Error::Config(format!("invalid table name: {name:?}")));
        }
        if !is_identifier(&self.insertion_time_column) {
            return Err(Error::Config(format!(
                "invalid insertion time column: {:?}",
                self.insertion_time_column
            )));
        }
        if self.allocated_space.as_u64() == 0 {
            return Err(Error::Config("STORAGE_SIZE must be greater than 0".to_string()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(Error::Config(format!(
                "THRESHOLD must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.delete_percentage > 0.0 && self.delete_percentage <= 1.0) {
            return Err(Error::Config(format!(
                "DELETE_PERCENTAGE must be in (0, 1], got {}",
                self.delete_percentage
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("EXEC_INTERVAL must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Table and column names are interpolated into SQL, so only plain
/// (optionally database-qualified) identifiers are accepted.
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Monitor process configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct MonitorSettings {
    #[serde(flatten)]
    pub clickhouse: ClickHouseConfig,
    #[serde(flatten)]
    pub retention: RetentionConfig,
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        self.clickhouse.validate()?;
        self.retention.validate()
    }
}

/// Migration process configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct MigrationSettings {
    #[serde(flatten)]
    pub clickhouse: ClickHouseConfig,
    /// Schema version of the running release.
    #[serde(rename = "theia_version", default, deserialize_with = "de::lenient_string")]
    pub target_version: String,
    /// Base flow table, checked to detect pre-versioning data.
    #[serde(default = "default_table_name", deserialize_with = "de::lenient_string")]
    pub table_name: String,
}

impl MigrationSettings {
    pub fn validate(&self) -> Result<()> {
        self.clickhouse.validate()?;
        if self.target_version.is_empty() {
            return Err(Error::Config("THEIA_VERSION must be defined".to_string()));
        }
        if !is_identifier(&self.table_name) {
            return Err(Error::Config(format!("invalid table name: {:?}", self.table_name)));
        }
        Ok(())
    }
}

/// Deserializers tolerant of environment values parsed as numbers.
mod de {
    use crate::duration::parse_duration;
    use serde::Deserializer;
    use serde::de::{self, SeqAccess, Visitor};
    use std::fmt;
    use std::time::Duration;

    pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = String;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
                Ok(v.to_string())
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
                Ok(v.to_string())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
                Ok(v.to_string())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
                Ok(v.to_string())
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
                Ok(v.to_string())
            }

            fn visit_char<E: de::Error>(self, v: char) -> Result<String, E> {
                Ok(v.to_string())
            }
        }

        d.deserialize_any(V)
    }

    /// A whitespace-separated string or a list of strings.
    pub fn view_names<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = Vec<String>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a space-separated string or a list of view names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<String>, E> {
                Ok(v.split_whitespace().map(String::from).collect())
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
                let mut names = Vec::new();
                while let Some(name) = seq.next_element::<String>()? {
                    names.push(name);
                }
                Ok(names)
            }
        }

        d.deserialize_any(V)
    }

    /// A duration string such as `1m`, or a bare number of seconds.
    pub fn duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration such as \"1m\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom(format!("negative duration: {v}")))
            }
        }

        d.deserialize_any(V)
    }
}
