//! SQLite-backed persistence: the append-only conversation store, the
//! paper store with ingest claim locking, and the chunk store that
//! backs both search modes (embeddings as BLOBs for vector search,
//! FTS5 for lexical search).

pub mod chunk;
pub mod conversation;
pub mod db;
pub mod paper;
mod schema;

pub use chunk::ChunkStore;
pub use conversation::{
    ConversationRecord, ConversationStore, ConversationSummary, PendingConfirmation, TurnData,
    TurnRecord,
};
pub use db::Db;
pub use paper::{PaperRecord, PaperStore};
