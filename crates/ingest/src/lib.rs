//! Paper ingestion pipeline: fetch metadata, download and parse the
//! PDF, chunk, embed, and store. Per-paper failures are isolated; a
//! claim lock prevents concurrent duplicate ingestion of one paper.

pub mod service;

pub use service::{IngestRequest, IngestService};
