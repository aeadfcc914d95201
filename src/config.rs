//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::DEFAULT_CAPACITY;
use crate::entity::EntityCacheConfig;
use crate::error::{CacheError, Result};

/// Prefix of the per-entity capacity overrides, e.g. `CACHE_CAPACITY_SCENE`.
const CAPACITY_OVERRIDE_PREFIX: &str = "CACHE_CAPACITY_";

/// Default entity TTL in seconds.
const DEFAULT_TTL_SECS: u64 = 300;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity for entity caches without a dedicated override
    pub default_capacity: usize,
    /// Time-to-live for cached entities, None = no expiry
    pub ttl: Option<Duration>,
    /// Worker limit for fan-out loads, 0 = host parallelism
    pub max_workers: usize,
    /// Per-entity capacities keyed by lowercase entity name
    pub capacities: BTreeMap<String, usize>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// Unparsable values are logged and replaced by their defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Default entity cache capacity (default: 1000)
    /// - `CACHE_TTL_SECS` - Entity TTL in seconds, 0 disables expiry (default: 300)
    /// - `CACHE_MAX_WORKERS` - Fan-out worker limit, 0 = host parallelism (default: 0)
    /// - `CACHE_CAPACITY_<NAME>` - Capacity for the entity cache named `<name>`
    pub fn from_env() -> Self {
        match Self::from_vars(unicode_vars(env::vars_os()), false) {
            Ok(config) => config,
            Err(err) => {
                warn!("falling back to default cache configuration: {}", err);
                Self::default()
            }
        }
    }

    /// Like [`CacheConfig::from_env`] but rejects unparsable values.
    pub fn try_from_env() -> Result<Self> {
        Self::from_vars(unicode_vars(env::vars_os()), true)
    }

    /// Builds a config from an explicit set of variables.
    ///
    /// With `strict` set, the first unparsable value is returned as
    /// [`CacheError::InvalidConfig`]; otherwise it is logged and skipped.
    pub fn from_vars<I>(vars: I, strict: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut config = Self::default();

        if let Some(capacity) = parse_var::<usize>(&vars, "CACHE_CAPACITY", strict)? {
            config.default_capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64>(&vars, "CACHE_TTL_SECS", strict)? {
            config.ttl = ttl_from_secs(secs);
        }
        if let Some(workers) = parse_var::<usize>(&vars, "CACHE_MAX_WORKERS", strict)? {
            config.max_workers = workers;
        }

        for name in vars.keys() {
            let Some(entity) = name.strip_prefix(CAPACITY_OVERRIDE_PREFIX) else {
                continue;
            };
            if entity.is_empty() {
                continue;
            }
            if let Some(capacity) = parse_var::<usize>(&vars, name, strict)? {
                config.capacities.insert(entity.to_lowercase(), capacity);
            }
        }

        Ok(config)
    }

    /// Capacity configured for the named entity cache.
    pub fn capacity_for(&self, name: &str) -> usize {
        self.capacities
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(self.default_capacity)
    }

    /// Derives the config of one entity cache; the key prefix is the entity name.
    pub fn entity(&self, name: &str) -> EntityCacheConfig {
        EntityCacheConfig {
            capacity: self.capacity_for(name),
            ttl: self.ttl,
            key_prefix: name.to_lowercase(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let capacities = [
            ("scene", 5000),
            ("performer", 2000),
            ("studio", 1000),
            ("tag", 1000),
        ]
        .into_iter()
        .map(|(name, capacity)| (name.to_string(), capacity))
        .collect();

        Self {
            default_capacity: DEFAULT_CAPACITY,
            ttl: ttl_from_secs(DEFAULT_TTL_SECS),
            max_workers: 0,
            capacities,
        }
    }
}

fn ttl_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Keeps variables whose name and value are valid Unicode.
fn unicode_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                let name = name.unwrap_or_else(|raw| raw.to_string_lossy().into_owned());
                warn!("skipping non-unicode environment variable {}", name);
                None
            }
        })
        .collect()
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    strict: bool,
) -> Result<Option<T>> {
    let Some(raw) = vars.get(name) else {
        return Ok(None);
    };
    match raw.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) if strict => Err(CacheError::InvalidConfig(format!(
            "{} has unparsable value {:?}",
            name, raw
        ))),
        Err(_) => {
            warn!("ignoring {}: unparsable value {:?}", name, raw);
            Ok(None)
        }
    }
}
