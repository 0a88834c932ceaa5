//! HTTP backend: Icinga/Nagios `status.cgi` JSON output fetched with curl.
//!
//! Credentials and the URL are handed to curl through a config file on stdin
//! so they never appear in the process list.

#![allow(missing_docs)]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::Value;

use crate::core::config::HttpConfig;
use crate::core::errors::{NlcdError, Result};
use crate::source::filter::FilterPolicy;
use crate::source::{ProblemSource, StatusDocument};

const SOURCE_NAME: &str = "http";

/// Polls a status page over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    credentials: Option<(String, String)>,
    timeout_secs: u64,
    curl_binary: PathBuf,
    filter: FilterPolicy,
}

impl HttpSource {
    pub fn new(config: &HttpConfig, filter: FilterPolicy) -> Result<Self> {
        if config.url.is_empty() {
            return Err(NlcdError::InvalidConfig {
                details: "http.url is required for the http protocol".to_string(),
            });
        }
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Ok(Self {
            url: config.url.clone(),
            credentials,
            timeout_secs: config.timeout_secs,
            curl_binary: config.curl_binary.clone(),
            filter,
        })
    }

    /// curl config passed on stdin.
    fn curl_config(&self) -> String {
        let mut cfg = String::new();
        cfg.push_str(&format!("url = \"{}\"\n", escape_curl_value(&self.url)));
        cfg.push_str("header = \"Accept: application/json\"\n");
        if let Some((user, pass)) = &self.credentials {
            cfg.push_str("basic\n");
            cfg.push_str(&format!(
                "user = \"{}:{}\"\n",
                escape_curl_value(user),
                escape_curl_value(pass)
            ));
        }
        cfg
    }

    fn run_curl(&self) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.curl_binary)
            .args(["--silent", "--show-error", "--fail", "--location"])
            .arg("--max-time")
            .arg(self.timeout_secs.to_string())
            .args(["--config", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| NlcdError::Transport {
                source_name: SOURCE_NAME,
                details: format!("{} not found or failed: {e}", self.curl_binary.display()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.curl_config().as_bytes())
                .map_err(|e| NlcdError::Transport {
                    source_name: SOURCE_NAME,
                    details: format!("failed to pass request to curl: {e}"),
                })?;
        }

        let output = child.wait_with_output().map_err(|e| NlcdError::Transport {
            source_name: SOURCE_NAME,
            details: format!("curl did not finish: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NlcdError::Transport {
                source_name: SOURCE_NAME,
                details: describe_curl_failure(output.status.code(), stderr.trim(), self.timeout_secs),
            });
        }

        Ok(output.stdout)
    }
}

impl ProblemSource for HttpSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch(&mut self) -> Result<StatusDocument> {
        let body = self.run_curl()?;
        parse_status_body(&body)
    }

    fn filter(&self) -> &FilterPolicy {
        &self.filter
    }
}

/// The CGI wraps the record arrays in a top-level `status` object.
pub fn parse_status_body(body: &[u8]) -> Result<StatusDocument> {
    let value: Value = serde_json::from_slice(body).map_err(|e| NlcdError::MalformedResponse {
        source_name: SOURCE_NAME,
        details: format!("response is not JSON: {e}"),
    })?;
    let Value::Object(mut top) = value else {
        return Err(NlcdError::MalformedResponse {
            source_name: SOURCE_NAME,
            details: "response is not a JSON object".to_string(),
        });
    };
    let status = top.remove("status").ok_or_else(|| NlcdError::MalformedResponse {
        source_name: SOURCE_NAME,
        details: "response has no status object".to_string(),
    })?;
    StatusDocument::from_value(SOURCE_NAME, status)
}

fn describe_curl_failure(code: Option<i32>, stderr: &str, timeout_secs: u64) -> String {
    let summary = match code {
        Some(6) => "could not resolve host".to_string(),
        Some(7) => "could not connect".to_string(),
        Some(22) => "server answered with an HTTP error".to_string(),
        Some(28) => format!("timed out after {timeout_secs}s"),
        Some(35 | 60) => "TLS handshake or certificate failure".to_string(),
        Some(other) => format!("curl exited with status {other}"),
        None => "curl was terminated by a signal".to_string(),
    };
    if stderr.is_empty() {
        summary
    } else {
        format!("{summary} ({stderr})")
    }
}

/// Quote a value for a curl config file.
fn escape_curl_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
