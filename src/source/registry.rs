//! Name-keyed construction of problem sources.

#![allow(missing_docs)]

use crate::core::config::Config;
use crate::core::errors::{NlcdError, Result};
use crate::source::ProblemSource;
use crate::source::http::HttpSource;
use crate::source::json_file::JsonFileSource;

/// Build the backend registered under `protocol` (case-insensitive).
/// `mysql` is kept as an alias of `database` so older configs still load.
pub fn build_source(config: &Config, protocol: &str) -> Result<Box<dyn ProblemSource>> {
    let name = protocol.trim().to_ascii_lowercase();
    let filter = config.filter.clone();
    match name.as_str() {
        "http" => Ok(Box::new(HttpSource::new(&config.http, filter)?)),
        "jsonfile" => Ok(Box::new(JsonFileSource::new(&config.jsonfile, filter)?)),
        "database" | "mysql" => build_database(config, filter),
        _ => Err(NlcdError::UnknownSource {
            name: protocol.to_string(),
        }),
    }
}

#[cfg(feature = "sqlite")]
fn build_database(
    config: &Config,
    filter: crate::source::filter::FilterPolicy,
) -> Result<Box<dyn ProblemSource>> {
    Ok(Box::new(crate::source::database::DatabaseSource::new(
        &config.database,
        filter,
    )?))
}

#[cfg(not(feature = "sqlite"))]
fn build_database(
    _config: &Config,
    _filter: crate::source::filter::FilterPolicy,
) -> Result<Box<dyn ProblemSource>> {
    Err(NlcdError::InvalidConfig {
        details: "database protocol requires the `sqlite` feature".to_string(),
    })
}
