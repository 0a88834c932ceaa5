//! NLCD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, NlcdError>;

/// What the orchestrator does when an error escapes a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Log, keep the current display, try again after the poll interval.
    SkipCycle,
    /// Detach the device and block until it can be attached again.
    Reattach,
    /// Stop the daemon.
    Fatal,
}

/// Top-level error type for nagios-lcd.
#[derive(Debug, Error)]
pub enum NlcdError {
    #[error("[NLCD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[NLCD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[NLCD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[NLCD-1004] invalid or unsupported protocol: {name}")]
    UnknownSource { name: String },

    #[error("[NLCD-2001] {source_name} transport failure: {details}")]
    Transport {
        source_name: &'static str,
        details: String,
    },

    #[error("[NLCD-2002] {source_name} returned a malformed response: {details}")]
    MalformedResponse {
        source_name: &'static str,
        details: String,
    },

    #[error("[NLCD-2003] malformed status field {field}: {details}")]
    DataFormat {
        field: &'static str,
        details: String,
    },

    #[error("[NLCD-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[NLCD-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[NLCD-3001] no LCD device at index {index}: {details}")]
    DeviceUnavailable { index: u32, details: String },

    #[error("[NLCD-3002] LCD I/O failure during {operation}: {details}")]
    DeviceIo {
        operation: &'static str,
        details: String,
    },

    #[error("[NLCD-3003] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[NLCD-3900] contract violation: {details}")]
    ContractViolation { details: String },
}

impl NlcdError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "NLCD-1001",
            Self::MissingConfig { .. } => "NLCD-1002",
            Self::ConfigParse { .. } => "NLCD-1003",
            Self::UnknownSource { .. } => "NLCD-1004",
            Self::Transport { .. } => "NLCD-2001",
            Self::MalformedResponse { .. } => "NLCD-2002",
            Self::DataFormat { .. } => "NLCD-2003",
            Self::Serialization { .. } => "NLCD-2101",
            Self::Sql { .. } => "NLCD-2102",
            Self::DeviceUnavailable { .. } => "NLCD-3001",
            Self::DeviceIo { .. } => "NLCD-3002",
            Self::Io { .. } => "NLCD-3003",
            Self::ContractViolation { .. } => "NLCD-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::MalformedResponse { .. }
                | Self::DataFormat { .. }
                | Self::Sql { .. }
                | Self::Io { .. }
                | Self::DeviceUnavailable { .. }
                | Self::DeviceIo { .. }
        )
    }

    /// Whether the failure came from the display hardware.
    #[must_use]
    pub const fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable { .. } | Self::DeviceIo { .. }
        )
    }

    /// Recovery action for an error raised inside a poll cycle.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        if self.is_device_failure() {
            Recovery::Reattach
        } else if self.is_retryable() {
            Recovery::SkipCycle
        } else {
            Recovery::Fatal
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for device write failures.
    #[must_use]
    pub fn device_io(operation: &'static str, details: impl ToString) -> Self {
        Self::DeviceIo {
            operation,
            details: details.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for NlcdError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for NlcdError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for NlcdError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<NlcdError> {
        vec![
            NlcdError::InvalidConfig {
                details: String::new(),
            },
            NlcdError::MissingConfig {
                path: PathBuf::new(),
            },
            NlcdError::ConfigParse {
                context: "",
                details: String::new(),
            },
            NlcdError::UnknownSource {
                name: String::new(),
            },
            NlcdError::Transport {
                source_name: "",
                details: String::new(),
            },
            NlcdError::MalformedResponse {
                source_name: "",
                details: String::new(),
            },
            NlcdError::DataFormat {
                field: "",
                details: String::new(),
            },
            NlcdError::Serialization {
                context: "",
                details: String::new(),
            },
            NlcdError::Sql {
                context: "",
                details: String::new(),
            },
            NlcdError::DeviceUnavailable {
                index: 0,
                details: String::new(),
            },
            NlcdError::DeviceIo {
                operation: "",
                details: String::new(),
            },
            NlcdError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            NlcdError::ContractViolation {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = all_variants().iter().map(NlcdError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn fetch_failures_skip_the_cycle() {
        let transport = NlcdError::Transport {
            source_name: "http",
            details: "timed out".to_string(),
        };
        let malformed = NlcdError::MalformedResponse {
            source_name: "http",
            details: "not json".to_string(),
        };
        let sql = NlcdError::Sql {
            context: "query",
            details: "locked".to_string(),
        };
        assert_eq!(transport.recovery(), Recovery::SkipCycle);
        assert_eq!(malformed.recovery(), Recovery::SkipCycle);
        assert_eq!(sql.recovery(), Recovery::SkipCycle);
    }

    #[test]
    fn device_failures_trigger_reattach() {
        let io = NlcdError::device_io("clear_lines", "no such device");
        let gone = NlcdError::DeviceUnavailable {
            index: 0,
            details: "missing".to_string(),
        };
        assert_eq!(io.recovery(), Recovery::Reattach);
        assert_eq!(gone.recovery(), Recovery::Reattach);
        assert!(io.is_device_failure());
    }

    #[test]
    fn config_and_contract_errors_are_fatal() {
        assert_eq!(
            NlcdError::ContractViolation {
                details: "fetch not implemented".to_string()
            }
            .recovery(),
            Recovery::Fatal
        );
        assert_eq!(
            NlcdError::UnknownSource {
                name: "GOPHER".to_string()
            }
            .recovery(),
            Recovery::Fatal
        );
        assert!(
            !NlcdError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = NlcdError::io(
            "/tmp/status.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "NLCD-3003");
        assert!(err.to_string().contains("/tmp/status.json"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn from_rusqlite_error() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: NlcdError = sql_err.into();
        assert_eq!(err.code(), "NLCD-2102");
        assert_eq!(err.recovery(), Recovery::SkipCycle);
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: NlcdError = json_err.into();
        assert_eq!(err.code(), "NLCD-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: NlcdError = toml_err.into();
        assert_eq!(err.code(), "NLCD-1003");
    }
}
