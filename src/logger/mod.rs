//! Diagnostics: injected sinks and the JSONL activity log.

pub mod jsonl;
pub mod sink;
