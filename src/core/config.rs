//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{NlcdError, Result};
use crate::display::images::ImageSetConfig;
use crate::display::severity::CriticalClass;
use crate::source::filter::FilterPolicy;

/// Keys accepted in `[database] params`. Anything else is rejected at load time.
pub const DATABASE_PARAM_ALLOW_LIST: [&str; 4] = ["path", "mode", "busy_timeout_ms", "instance_name"];

/// Backend names understood by the source registry.
pub const KNOWN_PROTOCOLS: [&str; 3] = ["http", "database", "jsonfile"];

/// Full nagios-lcd configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub lcd: LcdConfig,
    pub display: DisplayConfig,
    pub images: ImageSetConfig,
    pub filter: FilterPolicy,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub jsonfile: JsonFileConfig,
    pub logging: LoggingConfig,
    /// Where this config was loaded from; not part of the file format.
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Device selection, polling cadence and panel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LcdConfig {
    /// Which panel to open when several are plugged in.
    pub index: u32,
    /// Backend used to fetch status (`http`, `database`, `jsonfile`).
    pub protocol: String,
    pub poll_interval_secs: u64,
    /// Fixed delay between attach attempts after the panel disappears.
    pub reattach_interval_secs: u64,
    /// Device node template; `{index}` is replaced with `index`.
    pub device_path: String,
    pub brightness: u8,
    pub idle_brightness: u8,
    pub dim_when_idle: bool,
}

/// Layout choices for the six problem lines and the splash screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Whether CRITICAL shares the WARNING style/rank or the DOWN one.
    pub critical_class: CriticalClass,
    pub splash_text: String,
}

/// Status-JSON over HTTP(S).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// Binary used to perform the request.
    pub curl_binary: PathBuf,
}

/// Icinga IDO database. Parameters are plain key/value pairs, never evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub params: BTreeMap<String, String>,
}

/// Status document read from a local file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct JsonFileConfig {
    pub file: Option<PathBuf>,
}

/// Diagnostic output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append every diagnostic as one JSON line here.
    pub jsonl_path: Option<PathBuf>,
    /// Print debug-level diagnostics to stderr.
    pub verbose: bool,
}

impl Default for LcdConfig {
    fn default() -> Self {
        Self {
            index: 0,
            protocol: "http".to_string(),
            poll_interval_secs: 60,
            reattach_interval_secs: 60,
            device_path: "/dev/lcdsysinfo{index}".to_string(),
            brightness: 255,
            idle_brightness: 127,
            dim_when_idle: false,
        }
    }
}

impl LcdConfig {
    /// Device node path with the index substituted.
    #[must_use]
    pub fn resolved_device_path(&self) -> PathBuf {
        PathBuf::from(
            self.device_path
                .replace("{index}", &self.index.to_string()),
        )
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            critical_class: CriticalClass::Warning,
            splash_text: "ALL UP".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            timeout_secs: 10,
            curl_binary: PathBuf::from("curl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[NLCD-CONFIG] WARNING: HOME not set, falling back to /etc");
                PathBuf::from("/etc")
            },
            PathBuf::from,
        );
        home_dir
            .join(".config")
            .join("nagios-lcd")
            .join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| NlcdError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(NlcdError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lcd.poll_interval_secs)
    }

    /// Reattach interval as a `Duration`.
    #[must_use]
    pub const fn reattach_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lcd.reattach_interval_secs)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("NLCD_LCD_INDEX") {
            self.lcd.index = parse_env("NLCD_LCD_INDEX", &raw)?;
        }
        if let Some(raw) = lookup("NLCD_PROTOCOL") {
            self.lcd.protocol = raw;
        }
        if let Some(raw) = lookup("NLCD_POLL_INTERVAL_SECS") {
            self.lcd.poll_interval_secs = parse_env("NLCD_POLL_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("NLCD_REATTACH_INTERVAL_SECS") {
            self.lcd.reattach_interval_secs = parse_env("NLCD_REATTACH_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("NLCD_DEVICE_PATH") {
            self.lcd.device_path = raw;
        }

        if let Some(raw) = lookup("NLCD_HTTP_URL") {
            self.http.url = raw;
        }
        if let Some(raw) = lookup("NLCD_HTTP_USERNAME") {
            self.http.username = Some(raw);
        }
        if let Some(raw) = lookup("NLCD_HTTP_PASSWORD") {
            self.http.password = Some(raw);
        }
        if let Some(raw) = lookup("NLCD_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_env("NLCD_HTTP_TIMEOUT_SECS", &raw)?;
        }

        if let Some(raw) = lookup("NLCD_JSONFILE_FILE") {
            self.jsonfile.file = Some(PathBuf::from(raw));
        }

        if let Some(raw) = lookup("NLCD_VERBOSE") {
            self.logging.verbose = parse_env("NLCD_VERBOSE", &raw)?;
        }
        if let Some(raw) = lookup("NLCD_JSONL_PATH") {
            self.logging.jsonl_path = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    fn normalize(&mut self) {
        self.lcd.protocol = self.lcd.protocol.trim().to_ascii_lowercase();
        if self.lcd.protocol == "mysql" {
            self.lcd.protocol = "database".to_string();
        }
        self.http.url = self.http.url.trim().to_string();
        // Blank credentials mean "no auth", same as leaving them out.
        if self.http.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.http.username = None;
        }
        if self.http.password.as_deref().is_some_and(str::is_empty) {
            self.http.password = None;
        }
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_PROTOCOLS.contains(&self.lcd.protocol.as_str()) {
            return Err(NlcdError::UnknownSource {
                name: self.lcd.protocol.clone(),
            });
        }

        for (name, val) in [
            ("lcd.poll_interval_secs", self.lcd.poll_interval_secs),
            ("lcd.reattach_interval_secs", self.lcd.reattach_interval_secs),
            ("http.timeout_secs", self.http.timeout_secs),
        ] {
            if val == 0 {
                return Err(NlcdError::InvalidConfig {
                    details: format!("{name} must be >= 1"),
                });
            }
        }

        if self.lcd.idle_brightness > self.lcd.brightness {
            return Err(NlcdError::InvalidConfig {
                details: format!(
                    "lcd.idle_brightness ({}) must be <= lcd.brightness ({})",
                    self.lcd.idle_brightness, self.lcd.brightness
                ),
            });
        }

        if self.lcd.device_path.trim().is_empty() {
            return Err(NlcdError::InvalidConfig {
                details: "lcd.device_path must not be empty".to_string(),
            });
        }

        if self.display.splash_text.chars().count() > MAX_LINE_CHARS {
            return Err(NlcdError::InvalidConfig {
                details: format!("display.splash_text must be at most {MAX_LINE_CHARS} characters"),
            });
        }

        for key in self.database.params.keys() {
            if !DATABASE_PARAM_ALLOW_LIST.contains(&key.as_str()) {
                return Err(NlcdError::InvalidConfig {
                    details: format!(
                        "database.params.{key} is not an allowed parameter (allowed: {})",
                        DATABASE_PARAM_ALLOW_LIST.join(", ")
                    ),
                });
            }
        }
        if let Some(mode) = self.database.params.get("mode")
            && !matches!(mode.as_str(), "ro" | "rw")
        {
            return Err(NlcdError::InvalidConfig {
                details: format!("database.params.mode must be \"ro\" or \"rw\", got {mode:?}"),
            });
        }
        if let Some(raw) = self.database.params.get("busy_timeout_ms") {
            raw.parse::<u64>().map_err(|error| NlcdError::InvalidConfig {
                details: format!("database.params.busy_timeout_ms={raw:?}: {error}"),
            })?;
        }

        self.images.validate()?;

        Ok(())
    }
}

/// Longest text the panel shows on one line.
const MAX_LINE_CHARS: usize = 20;

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| NlcdError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, NlcdError};
    use crate::display::severity::CriticalClass;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.lcd.poll_interval_secs, 60);
        assert_eq!(cfg.display.critical_class, CriticalClass::Warning);
    }

    #[test]
    fn parses_sections_from_toml() {
        let cfg = Config::from_toml_str(
            r#"
            [lcd]
            index = 1
            protocol = "jsonfile"
            poll_interval_secs = 30

            [display]
            critical_class = "down"

            [jsonfile]
            file = "/var/cache/icinga/status.json"

            [database.params]
            path = "/var/lib/icinga/ido.sqlite3"
            mode = "ro"
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.lcd.index, 1);
        assert_eq!(cfg.lcd.protocol, "jsonfile");
        assert_eq!(cfg.lcd.poll_interval_secs, 30);
        assert_eq!(cfg.lcd.reattach_interval_secs, 60);
        assert_eq!(cfg.display.critical_class, CriticalClass::Down);
        assert_eq!(
            cfg.jsonfile.file,
            Some(PathBuf::from("/var/cache/icinga/status.json"))
        );
        assert_eq!(cfg.database.params.get("mode").map(String::as_str), Some("ro"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_protocol_rejected() {
        let mut cfg = Config::default();
        cfg.lcd.protocol = "gopher".to_string();
        let err = cfg.validate().expect_err("expected unknown source");
        assert!(matches!(err, NlcdError::UnknownSource { .. }));
    }

    #[test]
    fn protocol_is_case_insensitive_after_normalize() {
        let mut cfg = Config::default();
        cfg.lcd.protocol = " JSONFILE ".to_string();
        cfg.normalize();
        assert_eq!(cfg.lcd.protocol, "jsonfile");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn legacy_mysql_protocol_maps_to_database() {
        let mut cfg = Config::default();
        cfg.lcd.protocol = "MYSQL".to_string();
        cfg.normalize();
        assert_eq!(cfg.lcd.protocol, "database");
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut cfg = Config::default();
        cfg.lcd.poll_interval_secs = 0;
        let err = cfg.validate().expect_err("expected interval error");
        assert!(err.to_string().contains("poll_interval_secs"));

        let mut cfg = Config::default();
        cfg.http.timeout_secs = 0;
        let err = cfg.validate().expect_err("expected timeout error");
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn idle_brightness_above_active_rejected() {
        let mut cfg = Config::default();
        cfg.lcd.brightness = 100;
        cfg.lcd.idle_brightness = 200;
        let err = cfg.validate().expect_err("expected brightness error");
        assert!(err.to_string().contains("idle_brightness"));
    }

    #[test]
    fn database_params_outside_allow_list_rejected() {
        let mut cfg = Config::default();
        cfg.database
            .params
            .insert("init_command".to_string(), "DROP TABLE x".to_string());
        let err = cfg.validate().expect_err("expected allow-list error");
        match err {
            NlcdError::InvalidConfig { details } => {
                assert!(details.contains("init_command"));
                assert!(details.contains("allowed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn database_mode_and_timeout_checked() {
        let mut cfg = Config::default();
        cfg.database
            .params
            .insert("mode".to_string(), "append".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.database
            .params
            .insert("busy_timeout_ms".to_string(), "soon".to_string());
        let err = cfg.validate().expect_err("expected timeout parse error");
        assert!(err.to_string().contains("busy_timeout_ms"));
    }

    #[test]
    fn long_splash_text_rejected() {
        let mut cfg = Config::default();
        cfg.display.splash_text = "EVERYTHING IS PERFECTLY FINE".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("NLCD_LCD_INDEX", "2"),
            ("NLCD_PROTOCOL", "jsonfile"),
            ("NLCD_POLL_INTERVAL_SECS", "15"),
            ("NLCD_HTTP_URL", "https://icinga.example/cgi-bin/status.cgi"),
            ("NLCD_HTTP_USERNAME", "lcd"),
            ("NLCD_JSONFILE_FILE", "/tmp/status.json"),
            ("NLCD_VERBOSE", "true"),
        ]);

        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert_eq!(cfg.lcd.index, 2);
        assert_eq!(cfg.lcd.protocol, "jsonfile");
        assert_eq!(cfg.lcd.poll_interval_secs, 15);
        assert_eq!(cfg.http.username.as_deref(), Some("lcd"));
        assert_eq!(cfg.jsonfile.file, Some(PathBuf::from("/tmp/status.json")));
        assert!(cfg.logging.verbose);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("NLCD_POLL_INTERVAL_SECS", "a minute")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid number should fail");
        match err {
            NlcdError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("NLCD_POLL_INTERVAL_SECS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_credentials_are_dropped() {
        let mut cfg = Config::default();
        cfg.http.username = Some("  ".to_string());
        cfg.http.password = Some(String::new());
        cfg.normalize();
        assert!(cfg.http.username.is_none());
        assert!(cfg.http.password.is_none());
    }

    #[test]
    fn device_path_substitutes_index() {
        let mut cfg = Config::default();
        cfg.lcd.index = 3;
        assert_eq!(
            cfg.lcd.resolved_device_path(),
            PathBuf::from("/dev/lcdsysinfo3")
        );
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/nagios-lcd/config.toml")));
        assert!(matches!(result, Err(NlcdError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lcd]\nprotocol = \"database\"\n").unwrap();
        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.lcd.protocol, "database");
        assert_eq!(cfg.config_file, path);
    }

    #[test]
    fn stable_hash_deterministic_and_sensitive() {
        let cfg = Config::default();
        assert_eq!(cfg.stable_hash().unwrap(), cfg.stable_hash().unwrap());
        let mut modified = Config::default();
        modified.lcd.index += 1;
        assert_ne!(cfg.stable_hash().unwrap(), modified.stable_hash().unwrap());
    }
}
