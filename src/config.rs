use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Append-only file under the data directory.
    Wal,
    /// Process-local; state is lost on exit.
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wal" | "file" => Ok(Self::Wal),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown storage kind {other:?}")),
        }
    }
}

/// Runtime settings, read once at startup from `FLEETBOOK_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    /// Ledger appends before the compactor rewrites the file.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            storage: StorageKind::Wal,
            cache_ttl: Duration::from_secs(120),
            cache_sweep_interval: Duration::from_secs(60),
            compact_threshold: 1000,
            metrics_port: None,
            log_filter: "info".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: get("FLEETBOOK_BIND").unwrap_or(defaults.bind),
            port: parse_or(&get, "FLEETBOOK_PORT", defaults.port),
            data_dir: get("FLEETBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            storage: parse_or(&get, "FLEETBOOK_STORAGE", defaults.storage),
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                "FLEETBOOK_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            cache_sweep_interval: Duration::from_secs(
                parse_or(
                    &get,
                    "FLEETBOOK_CACHE_SWEEP_SECS",
                    defaults.cache_sweep_interval.as_secs(),
                )
                .max(1),
            ),
            compact_threshold: parse_or(&get, "FLEETBOOK_COMPACT_THRESHOLD", defaults.compact_threshold),
            metrics_port: get("FLEETBOOK_METRICS_PORT").and_then(|s| match s.parse() {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!("ignoring FLEETBOOK_METRICS_PORT={s:?}: not a port");
                    None
                }
            }),
            log_filter: get("FLEETBOOK_LOG").unwrap_or(defaults.log_filter),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("fleetbook.wal")
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring {key}={raw:?}: unparsable, using default");
            default
        }),
    }
}
