//! Database backend: problem rows straight from an Icinga IDO schema.
//!
//! Only non-UP hosts and non-OK services are selected, sorted by display
//! name so the panel order is stable between polls. The connection is
//! opened at construction so a bad path fails at startup; after a query
//! failure it is dropped and reopened on the next poll.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Row, params};
use serde_json::{Value, json};

use crate::core::config::DatabaseConfig;
use crate::core::errors::{NlcdError, Result};
use crate::source::filter::FilterPolicy;
use crate::source::{ProblemSource, StatusDocument};

const SOURCE_NAME: &str = "database";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const HOST_PROBLEMS_SQL: &str = "
    SELECT
      h.display_name AS host_display_name,
      CASE hs.current_state WHEN 0 THEN 'UP' WHEN 1 THEN 'DOWN' ELSE 'UNREACHABLE' END AS status,
      CASE hs.state_type WHEN 0 THEN 'SOFT' ELSE 'HARD' END AS state_type,
      hs.current_check_attempt || '/' || hs.max_check_attempts AS attempts,
      hs.scheduled_downtime_depth > 0 AS in_scheduled_downtime,
      hs.is_flapping,
      hs.notifications_enabled,
      hs.problem_has_been_acknowledged AS has_been_acknowledged
    FROM icinga_hoststatus AS hs
      JOIN icinga_instances AS i ON i.instance_id = hs.instance_id
      JOIN icinga_objects AS obj ON obj.object_id = hs.host_object_id
      JOIN icinga_hosts AS h ON h.host_object_id = hs.host_object_id
    WHERE hs.current_state != 0
      AND (?1 IS NULL OR i.instance_name = ?1)
    ORDER BY h.display_name";

const SERVICE_PROBLEMS_SQL: &str = "
    SELECT
      s.display_name AS service_display_name,
      h.display_name AS host_display_name,
      CASE ss.current_state WHEN 0 THEN 'OK' WHEN 1 THEN 'WARNING' WHEN 2 THEN 'CRITICAL'
        ELSE 'UNKNOWN' END AS status,
      CASE ss.state_type WHEN 0 THEN 'SOFT' ELSE 'HARD' END AS state_type,
      ss.current_check_attempt || '/' || ss.max_check_attempts AS attempts,
      ss.scheduled_downtime_depth > 0 AS in_scheduled_downtime,
      ss.is_flapping,
      ss.notifications_enabled,
      ss.problem_has_been_acknowledged AS has_been_acknowledged
    FROM icinga_servicestatus AS ss
      JOIN icinga_instances AS i ON i.instance_id = ss.instance_id
      JOIN icinga_objects AS obj ON obj.object_id = ss.service_object_id
      JOIN icinga_services AS s ON s.service_object_id = ss.service_object_id
      JOIN icinga_hosts AS h ON h.host_object_id = s.host_object_id
    WHERE ss.current_state != 0
      AND (?1 IS NULL OR i.instance_name = ?1)
    ORDER BY h.display_name, s.display_name";

/// Validated connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseParams {
    pub path: PathBuf,
    pub read_only: bool,
    pub busy_timeout: Duration,
    pub instance_name: Option<String>,
}

impl DatabaseParams {
    /// Build from the `[database] params` map. Keys were checked against the
    /// allow-list during config validation; values are checked here.
    pub fn from_map(params: &BTreeMap<String, String>) -> Result<Self> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| NlcdError::InvalidConfig {
                details: "database.params.path is required for the database protocol"
                    .to_string(),
            })?;
        let read_only = match params.get("mode").map(String::as_str) {
            None | Some("ro") => true,
            Some("rw") => false,
            Some(other) => {
                return Err(NlcdError::InvalidConfig {
                    details: format!("database.params.mode must be \"ro\" or \"rw\", got {other:?}"),
                });
            }
        };
        let busy_timeout_ms = match params.get("busy_timeout_ms") {
            Some(raw) => raw.parse::<u64>().map_err(|e| NlcdError::InvalidConfig {
                details: format!("database.params.busy_timeout_ms={raw:?}: {e}"),
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };
        Ok(Self {
            path,
            read_only,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            instance_name: params.get("instance_name").cloned(),
        })
    }
}

/// Queries the IDO tables every poll.
pub struct DatabaseSource {
    params: DatabaseParams,
    conn: Option<Connection>,
    filter: FilterPolicy,
}

impl DatabaseSource {
    pub fn new(config: &DatabaseConfig, filter: FilterPolicy) -> Result<Self> {
        let params = DatabaseParams::from_map(&config.params)?;
        let conn = open_connection(&params)?;
        Ok(Self {
            params,
            conn: Some(conn),
            filter,
        })
    }

    fn query_all(&mut self) -> Result<StatusDocument> {
        if self.conn.is_none() {
            self.conn = Some(open_connection(&self.params)?);
        }
        let Some(conn) = self.conn.as_ref() else {
            return Err(NlcdError::ContractViolation {
                details: "database connection missing after reopen".to_string(),
            });
        };
        let instance = self.params.instance_name.as_deref();
        Ok(StatusDocument {
            host_status: query_rows(conn, "host query", HOST_PROBLEMS_SQL, instance, host_row)?,
            service_status: query_rows(
                conn,
                "service query",
                SERVICE_PROBLEMS_SQL,
                instance,
                service_row,
            )?,
        })
    }
}

impl ProblemSource for DatabaseSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch(&mut self) -> Result<StatusDocument> {
        let result = self.query_all();
        if result.is_err() {
            // A broken handle is not reused; the next poll reconnects.
            self.conn = None;
        }
        result
    }

    fn filter(&self) -> &FilterPolicy {
        &self.filter
    }
}

fn open_connection(params: &DatabaseParams) -> Result<Connection> {
    let access = if params.read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };
    let conn = Connection::open_with_flags(&params.path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .map_err(|e| NlcdError::Sql {
            context: "open",
            details: format!("{}: {e}", params.path.display()),
        })?;
    conn.busy_timeout(params.busy_timeout)?;
    Ok(conn)
}

fn query_rows(
    conn: &Connection,
    context: &'static str,
    sql: &str,
    instance: Option<&str>,
    map_row: fn(&Row<'_>) -> rusqlite::Result<Value>,
) -> Result<Vec<Value>> {
    let sql_err = |e: rusqlite::Error| NlcdError::Sql {
        context,
        details: e.to_string(),
    };
    let mut stmt = conn.prepare_cached(sql).map_err(sql_err)?;
    let rows = stmt.query_map(params![instance], map_row).map_err(sql_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql_err)
}

fn host_row(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "host_display_name": row.get::<_, Option<String>>(0)?,
        "status": row.get::<_, Option<String>>(1)?,
        "state_type": row.get::<_, Option<String>>(2)?,
        "attempts": row.get::<_, Option<String>>(3)?,
        "in_scheduled_downtime": row.get::<_, Option<i64>>(4)?,
        "is_flapping": row.get::<_, Option<i64>>(5)?,
        "notifications_enabled": row.get::<_, Option<i64>>(6)?,
        "has_been_acknowledged": row.get::<_, Option<i64>>(7)?,
    }))
}

fn service_row(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "service_display_name": row.get::<_, Option<String>>(0)?,
        "host_display_name": row.get::<_, Option<String>>(1)?,
        "status": row.get::<_, Option<String>>(2)?,
        "state_type": row.get::<_, Option<String>>(3)?,
        "attempts": row.get::<_, Option<String>>(4)?,
        "in_scheduled_downtime": row.get::<_, Option<i64>>(5)?,
        "is_flapping": row.get::<_, Option<i64>>(6)?,
        "notifications_enabled": row.get::<_, Option<i64>>(7)?,
        "has_been_acknowledged": row.get::<_, Option<i64>>(8)?,
    }))
}
