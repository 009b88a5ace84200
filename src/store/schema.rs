//! PostgreSQL schema definition (pgvector)

/// SQL schema for the indexing store. The embedding dimension is fixed at
/// table creation and must match the configured embedding model.
pub fn schema_sql(dimension: usize) -> String {
    format!(
        r#"
CREATE EXTENSION IF NOT EXISTS vector;

-- Chunks: one row per embedded span of a document
CREATE TABLE IF NOT EXISTS document_chunks (
    chunk_id TEXT PRIMARY KEY,
    doc_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    heading TEXT,
    text TEXT NOT NULL,
    word_count INTEGER NOT NULL DEFAULT 0,
    embedding vector({dimension}),
    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(doc_id, chunk_index)
);

-- Indexing history: one row per file path ever indexed
CREATE TABLE IF NOT EXISTS indexing_history (
    file_path TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    last_modified TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- File actions: append-only audit log of classified changes
CREATE TABLE IF NOT EXISTS file_actions (
    id BIGSERIAL PRIMARY KEY,
    file_path TEXT NOT NULL,
    action_type TEXT NOT NULL CHECK (action_type IN ('ADD', 'MODIFY', 'DELETE')),
    content_hash TEXT,
    run_timestamp TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    processed_at TIMESTAMPTZ
);

-- Indexes for lookup and retrieval
CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON document_chunks(doc_id);
CREATE INDEX IF NOT EXISTS idx_chunks_chunk_id ON document_chunks(chunk_id);
CREATE INDEX IF NOT EXISTS idx_chunks_embedding ON document_chunks
    USING hnsw (embedding vector_cosine_ops);
CREATE INDEX IF NOT EXISTS idx_history_file_path ON indexing_history(file_path);
CREATE INDEX IF NOT EXISTS idx_history_content_hash ON indexing_history(content_hash);
CREATE INDEX IF NOT EXISTS idx_actions_file_path ON file_actions(file_path);
CREATE INDEX IF NOT EXISTS idx_actions_run_timestamp ON file_actions(run_timestamp);
CREATE INDEX IF NOT EXISTS idx_actions_action_type ON file_actions(action_type);
"#
    )
}
