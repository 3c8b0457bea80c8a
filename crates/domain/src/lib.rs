//! Shared domain types for all Quill crates.
//!
//! Everything here is dependency-light: the error type, the layered
//! configuration, the external SSE event contract, and the paper/chunk
//! wire types shared by retrieval, ingestion, and the agent core.

pub mod config;
pub mod error;
pub mod paper;
pub mod stream;

pub use error::{Error, Result};
