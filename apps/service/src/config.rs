use std::collections::HashSet;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::{CheckMethod, Target};
use crate::retention::RetentionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("target {target:?} has an empty {field}")]
    EmptyTargetField { target: String, field: &'static str },

    #[error("target name {0:?} is used more than once")]
    DuplicateTarget(String),

    #[error("probe interval must be at least one second")]
    InvalidInterval,

    #[error("probe timeout ({timeout_ms} ms) must be non-zero and shorter than the interval ({interval_ms} ms)")]
    InvalidTimeout { timeout_ms: u64, interval_ms: u64 },

    #[error("tcp probes need a port")]
    MissingTcpPort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: Monitor,
    pub database: Database,
    pub server: Server,
    pub retention: RetentionPolicy,
    pub targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    pub interval_seconds: u64,
    pub timeout_ms: u64,
    pub method: CheckMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    pub history_limit: usize,
}

/// One `[[targets]]` entry, unvalidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    pub address: String,
}

impl Default for Monitor {
    fn default() -> Self {
        Self { interval_seconds: 30, timeout_ms: 1000, method: CheckMethod::Icmp, tcp_port: None }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self { path: path::PathBuf::from("sentinela.db"), pool_size: 4 }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080, history_limit: 50 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sentinel/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("sentinel/config.toml"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `name=address;name=address`
fn parse_target_list(key: &str, value: &str) -> Result<Vec<TargetEntry>, ConfigError> {
    value
        .split(';')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (name, address) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: pair.to_string(),
            })?;
            Ok(TargetEntry { name: name.trim().to_string(), address: address.trim().to_string() })
        })
        .collect()
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;

        write_title_1(f, "Monitor")?;
        write_1(f, "Interval (s)", &self.monitor.interval_seconds)?;
        write_1(f, "Timeout (ms)", &self.monitor.timeout_ms)?;
        write_1(f, "Method", &self.monitor.method)?;
        if let Some(port) = self.monitor.tcp_port {
            write_1(f, "TCP Port", &port)?;
        }

        write_title_1(f, "Targets")?;
        if self.targets.is_empty() {
            write_1(f, "(none)", &"nothing will be probed")?;
        }
        for target in &self.targets {
            write_2(f, &target.name, &target.address)?;
        }

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;

        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_1(f, "History Limit", &self.server.history_limit)?;

        write_title_1(f, "Retention")?;
        match self.retention.days {
            Some(days) => write_1(f, "Keep (days)", &days)?,
            None => write_1(f, "Keep", &"forever")?,
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/sentinel/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,no_run
    /// # use std::path;
    /// # use sentinel_service::config;
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }

    /// Overlay `SENTINEL_*` variables onto the file configuration
    ///
    /// Takes the variables explicitly; callers pass `std::env::vars()`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "SENTINEL_TARGETS" => self.targets = parse_target_list(&key, &value)?,
                "SENTINEL_DATABASE" => self.database.path = path::PathBuf::from(value),
                "SENTINEL_INTERVAL_SECS" => self.monitor.interval_seconds = parse_env(&key, &value)?,
                "SENTINEL_TIMEOUT_MS" => self.monitor.timeout_ms = parse_env(&key, &value)?,
                "SENTINEL_PROBE_METHOD" => self.monitor.method = parse_env(&key, &value)?,
                "SENTINEL_TCP_PORT" => self.monitor.tcp_port = Some(parse_env(&key, &value)?),
                "SENTINEL_BIND" => self.server.bind = value,
                "SENTINEL_PORT" => self.server.port = parse_env(&key, &value)?,
                "SENTINEL_RETENTION_DAYS" => self.retention.days = Some(parse_env(&key, &value)?),
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_seconds == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let interval_ms = self.monitor.interval_seconds.saturating_mul(1000);
        if self.monitor.timeout_ms == 0 || self.monitor.timeout_ms >= interval_ms {
            return Err(ConfigError::InvalidTimeout { timeout_ms: self.monitor.timeout_ms, interval_ms });
        }

        if self.monitor.method == CheckMethod::Tcp && self.monitor.tcp_port.is_none() {
            return Err(ConfigError::MissingTcpPort);
        }

        if self.server.history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.history_limit".to_string(),
                value: "0".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for target in self.targets()? {
            if !seen.insert(target.name.clone()) {
                return Err(ConfigError::DuplicateTarget(target.name));
            }
        }

        Ok(())
    }

    /// Build the target list in configuration order
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.targets
            .iter()
            .map(|entry| Target::new(entry.name.as_str(), entry.address.as_str()))
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.timeout_ms)
    }

    /// Port for tcp probes; icmp ignores it
    pub fn tcp_port(&self) -> Option<u16> {
        match self.monitor.method {
            CheckMethod::Tcp => self.monitor.tcp_port,
            CheckMethod::Icmp => None,
        }
    }
}
