//! Paper acquisition: the external registry client, the PDF text seam,
//! and the chunker that turns parsed documents into retrieval units.

pub mod chunker;
pub mod client;
pub mod pdf;

pub use chunker::{Chunker, DocChunk};
pub use client::{RegistryClient, SearchParams};
pub use pdf::{ParsedDocument, PdfParser, PlainTextParser, Section};
