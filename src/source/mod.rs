//! Problem sources: backend fetchers sharing one record schema and one
//! suppression policy.
//!
//! Every backend produces a [`StatusDocument`] (`host_status` and
//! `service_status` record arrays). Turning records into [`Problem`]s is the
//! same for all of them and never fails: bad fields degrade to `UNKNOWN` and a
//! `"?"` placeholder.

#![allow(missing_docs)]

#[cfg(feature = "sqlite")]
pub mod database;
pub mod filter;
pub mod http;
pub mod json_file;
pub mod registry;

use serde_json::{Map, Value};

use crate::core::errors::{NlcdError, Result};
use crate::core::problem::{Problem, StateName};
use crate::source::filter::FilterPolicy;

/// Description used when a record carries no usable name.
pub const PLACEHOLDER_DESCRIPTION: &str = "?";

/// Raw records returned by one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDocument {
    pub host_status: Vec<Value>,
    pub service_status: Vec<Value>,
}

impl StatusDocument {
    /// Validate the document shape: an object holding at least one of the two
    /// record arrays. A missing array is treated as empty.
    pub fn from_value(source_name: &'static str, value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(NlcdError::MalformedResponse {
                source_name,
                details: "status document is not a JSON object".to_string(),
            });
        };

        if !map.contains_key("host_status") && !map.contains_key("service_status") {
            return Err(NlcdError::MalformedResponse {
                source_name,
                details: "neither host_status nor service_status present".to_string(),
            });
        }

        Ok(Self {
            host_status: take_array(source_name, &mut map, "host_status")?,
            service_status: take_array(source_name, &mut map, "service_status")?,
        })
    }

    /// Total number of raw records.
    pub fn len(&self) -> usize {
        self.host_status.len() + self.service_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn take_array(
    source_name: &'static str,
    map: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Vec<Value>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(NlcdError::MalformedResponse {
            source_name,
            details: format!("{key} is {}, expected an array", json_type_name(&other)),
        }),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Host records describe the host; service records the host + service pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordKind {
    #[default]
    Host,
    Service,
}

/// Lenient typed view over one raw record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    pub kind: RecordKind,
    pub host_display_name: Option<String>,
    pub service_display_name: Option<String>,
    pub status: Option<String>,
    pub state_type: Option<String>,
    pub attempts: Option<String>,
    pub in_scheduled_downtime: Option<bool>,
    pub is_flapping: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub has_been_acknowledged: Option<bool>,
}

impl StatusRecord {
    pub fn from_value(kind: RecordKind, value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self {
                kind,
                ..Self::default()
            };
        };
        Self {
            kind,
            host_display_name: text_field(map, "host_display_name"),
            service_display_name: text_field(map, "service_display_name"),
            status: text_field(map, "status"),
            state_type: text_field(map, "state_type"),
            attempts: text_field(map, "attempts"),
            in_scheduled_downtime: flag_field(map, "in_scheduled_downtime"),
            is_flapping: flag_field(map, "is_flapping"),
            notifications_enabled: flag_field(map, "notifications_enabled"),
            has_been_acknowledged: flag_field(map, "has_been_acknowledged"),
        }
    }

    /// Convert to a problem, reporting every field that had to be defaulted.
    pub fn to_problem(&self, issues: &mut Vec<NlcdError>) -> Problem {
        let state = match self.status.as_deref() {
            Some(raw) => raw.parse::<StateName>().unwrap_or_else(|()| {
                issues.push(NlcdError::DataFormat {
                    field: "status",
                    details: format!("unrecognised state {raw:?}"),
                });
                StateName::Unknown
            }),
            None => {
                issues.push(NlcdError::DataFormat {
                    field: "status",
                    details: "missing".to_string(),
                });
                StateName::Unknown
            }
        };

        let host = self.host_display_name.as_deref().unwrap_or_else(|| {
            issues.push(NlcdError::DataFormat {
                field: "host_display_name",
                details: "missing".to_string(),
            });
            PLACEHOLDER_DESCRIPTION
        });

        let description = match self.kind {
            RecordKind::Host => host.to_string(),
            RecordKind::Service => {
                let service = self.service_display_name.as_deref().unwrap_or_else(|| {
                    issues.push(NlcdError::DataFormat {
                        field: "service_display_name",
                        details: "missing".to_string(),
                    });
                    PLACEHOLDER_DESCRIPTION
                });
                format!("{host} {service}")
            }
        };

        Problem::new(state, description)
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Databases hand back 0/1, JSON status pages hand back booleans or strings.
fn flag_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Result of parsing one document.
#[derive(Debug, Default)]
pub struct ParsedStatus {
    /// Hosts first, then services, each in source order.
    pub problems: Vec<Problem>,
    /// Records hidden by the filter policy.
    pub suppressed: usize,
    /// Fields that were defaulted; informational only.
    pub degraded: Vec<NlcdError>,
}

/// A monitoring backend.
///
/// Implementations differ only in `fetch`; parsing and suppression are shared.
pub trait ProblemSource {
    /// Registry name of the backend.
    fn name(&self) -> &'static str;

    /// Pull the current status records.
    fn fetch(&mut self) -> Result<StatusDocument>;

    /// Suppression policy configured for this source.
    fn filter(&self) -> &FilterPolicy;

    fn should_suppress(&self, record: &StatusRecord) -> bool {
        self.filter().should_suppress(record)
    }

    /// Turn a document into problems. Never fails.
    fn parse(&self, document: &StatusDocument) -> ParsedStatus {
        let mut parsed = ParsedStatus::default();
        let records = document
            .host_status
            .iter()
            .map(|v| StatusRecord::from_value(RecordKind::Host, v))
            .chain(
                document
                    .service_status
                    .iter()
                    .map(|v| StatusRecord::from_value(RecordKind::Service, v)),
            );
        for record in records {
            if self.should_suppress(&record) {
                parsed.suppressed += 1;
                continue;
            }
            let problem = record.to_problem(&mut parsed.degraded);
            parsed.problems.push(problem);
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedSource {
        document: StatusDocument,
        filter: FilterPolicy,
    }

    impl ProblemSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn fetch(&mut self) -> Result<StatusDocument> {
            Ok(self.document.clone())
        }

        fn filter(&self) -> &FilterPolicy {
            &self.filter
        }
    }

    fn source(value: Value) -> FixedSource {
        FixedSource {
            document: StatusDocument::from_value("fixed", value).expect("valid document"),
            filter: FilterPolicy::default(),
        }
    }

    #[test]
    fn hosts_then_services_in_source_order() {
        let mut src = source(json!({
            "host_status": [
                {"host_display_name": "gw01", "status": "DOWN", "state_type": "HARD", "attempts": "3/3"},
                {"host_display_name": "gw02", "status": "UNREACHABLE", "state_type": "HARD", "attempts": "1/1"},
            ],
            "service_status": [
                {"host_display_name": "db01", "service_display_name": "disk", "status": "WARNING",
                 "state_type": "HARD", "attempts": "4/4"},
            ],
        }));
        let doc = src.fetch().unwrap();
        let parsed = src.parse(&doc);
        assert_eq!(
            parsed.problems,
            vec![
                Problem::new(StateName::Down, "gw01"),
                Problem::new(StateName::Unreachable, "gw02"),
                Problem::new(StateName::Warning, "db01 disk"),
            ]
        );
        assert_eq!(parsed.suppressed, 0);
        assert!(parsed.degraded.is_empty());
    }

    #[test]
    fn soft_first_attempts_are_excluded() {
        let src = source(json!({
            "service_status": [
                {"host_display_name": "a", "service_display_name": "ping", "status": "CRITICAL",
                 "state_type": "SOFT", "attempts": "1/3"},
                {"host_display_name": "b", "service_display_name": "ping", "status": "CRITICAL",
                 "state_type": "SOFT", "attempts": "2/3"},
                {"host_display_name": "c", "service_display_name": "ping", "status": "CRITICAL",
                 "state_type": "SOFT", "attempts": "1/1"},
            ],
        }));
        let parsed = src.parse(&src.document);
        let names: Vec<&str> = parsed.problems.iter().map(Problem::description).collect();
        assert_eq!(names, vec!["b ping", "c ping"]);
        assert_eq!(parsed.suppressed, 1);
    }

    #[test]
    fn malformed_records_degrade_to_unknown() {
        let src = source(json!({
            "host_status": [
                {"host_display_name": "x", "status": "PENDING"},
                {"status": "DOWN"},
                "not an object",
            ],
            "service_status": [
                {"host_display_name": "y", "status": 2},
            ],
        }));
        let parsed = src.parse(&src.document);
        assert_eq!(
            parsed.problems,
            vec![
                Problem::new(StateName::Unknown, "x"),
                Problem::new(StateName::Down, "?"),
                Problem::new(StateName::Unknown, "?"),
                Problem::new(StateName::Unknown, "y ?"),
            ]
        );
        assert!(
            parsed
                .degraded
                .iter()
                .all(|e| matches!(e, NlcdError::DataFormat { .. }))
        );
        assert!(parsed.degraded.len() >= 5);
    }

    #[test]
    fn flags_accept_integers_and_strings() {
        let record = StatusRecord::from_value(
            RecordKind::Host,
            &json!({"is_flapping": 1, "has_been_acknowledged": "0", "notifications_enabled": true}),
        );
        assert_eq!(record.is_flapping, Some(true));
        assert_eq!(record.has_been_acknowledged, Some(false));
        assert_eq!(record.notifications_enabled, Some(true));
        assert_eq!(record.in_scheduled_downtime, None);
    }

    #[test]
    fn document_requires_an_object_with_record_arrays() {
        assert!(StatusDocument::from_value("t", json!([1, 2])).is_err());
        assert!(StatusDocument::from_value("t", json!({"other": []})).is_err());
        let err = StatusDocument::from_value("t", json!({"host_status": "nope"})).unwrap_err();
        assert!(matches!(err, NlcdError::MalformedResponse { .. }));

        let doc = StatusDocument::from_value("t", json!({"host_status": []})).unwrap();
        assert!(doc.is_empty());
        assert!(doc.service_status.is_empty());
    }
}
