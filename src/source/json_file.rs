//! Static-file backend: a status document dumped to disk by another process.

#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use crate::core::config::JsonFileConfig;
use crate::core::errors::{NlcdError, Result};
use crate::source::filter::FilterPolicy;
use crate::source::{ProblemSource, StatusDocument};

const SOURCE_NAME: &str = "jsonfile";

/// Re-reads one JSON file every poll.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    filter: FilterPolicy,
}

impl JsonFileSource {
    pub fn new(config: &JsonFileConfig, filter: FilterPolicy) -> Result<Self> {
        let path = config.file.clone().ok_or_else(|| NlcdError::InvalidConfig {
            details: "jsonfile.file is required for the jsonfile protocol".to_string(),
        })?;
        Ok(Self { path, filter })
    }
}

impl ProblemSource for JsonFileSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch(&mut self) -> Result<StatusDocument> {
        let raw = fs::read(&self.path).map_err(|source| NlcdError::io(&self.path, source))?;
        let value: Value =
            serde_json::from_slice(&raw).map_err(|e| NlcdError::MalformedResponse {
                source_name: SOURCE_NAME,
                details: format!("{}: {e}", self.path.display()),
            })?;
        // Accept a raw status.cgi dump as well as the bare record arrays.
        let value = match value {
            Value::Object(mut map)
                if !map.contains_key("host_status")
                    && !map.contains_key("service_status")
                    && map.get("status").is_some_and(Value::is_object) =>
            {
                map.remove("status").unwrap_or(Value::Null)
            }
            other => other,
        };
        StatusDocument::from_value(SOURCE_NAME, value)
    }

    fn filter(&self) -> &FilterPolicy {
        &self.filter
    }
}
