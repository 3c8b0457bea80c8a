//! Database schema. Applied idempotently on every open.

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL UNIQUE,
    user_id     TEXT NOT NULL,
    title       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_turns (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id      INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    turn_number          INTEGER NOT NULL,
    user_query           TEXT NOT NULL,
    agent_response       TEXT NOT NULL DEFAULT '',
    provider             TEXT NOT NULL DEFAULT '',
    model                TEXT NOT NULL DEFAULT '',
    guardrail_score      INTEGER,
    retrieval_attempts   INTEGER NOT NULL DEFAULT 0,
    rewritten_query      TEXT,
    sources              TEXT,
    reasoning_steps      TEXT,
    thinking_steps       TEXT,
    citations            TEXT,
    pending_confirmation TEXT,
    created_at           TEXT NOT NULL,
    UNIQUE(conversation_id, turn_number)
);

CREATE INDEX IF NOT EXISTS idx_turns_conversation
    ON conversation_turns(conversation_id, turn_number);

CREATE TABLE IF NOT EXISTS papers (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    arxiv_id       TEXT NOT NULL,
    user_id        TEXT NOT NULL,
    title          TEXT NOT NULL,
    authors        TEXT NOT NULL DEFAULT '[]',
    abstract       TEXT NOT NULL DEFAULT '',
    categories     TEXT NOT NULL DEFAULT '[]',
    published_date TEXT,
    pdf_url        TEXT NOT NULL,
    refs           TEXT NOT NULL DEFAULT '[]',
    created_at     TEXT NOT NULL,
    UNIQUE(arxiv_id, user_id)
);

CREATE TABLE IF NOT EXISTS chunks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id     TEXT NOT NULL UNIQUE,
    paper_id     INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
    user_id      TEXT NOT NULL,
    chunk_index  INTEGER NOT NULL,
    chunk_text   TEXT NOT NULL,
    section_name TEXT,
    page_number  INTEGER,
    embedding    BLOB NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_user ON chunks(user_id);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    chunk_text,
    content='chunks',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, chunk_text) VALUES (new.id, new.chunk_text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_delete AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, chunk_text)
    VALUES ('delete', old.id, old.chunk_text);
END;

CREATE TABLE IF NOT EXISTS ingest_claims (
    arxiv_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    claimed_at TEXT NOT NULL,
    PRIMARY KEY (arxiv_id, user_id)
);
"#;
