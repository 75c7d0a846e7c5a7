// db/mod.rs
// Unified database layer with rusqlite + sqlite-vec: the relational +
// vector store colocated in one SQLite file (C8), plus the synchronous
// write/read/search helpers the ingestion pipeline (C9) and query engine
// (C10) run on the pool's blocking thread.

pub mod embeddings;
pub mod messages;
pub mod migration_helpers;
pub mod pool;
pub mod schema;
pub mod search;
pub mod types;

pub use embeddings::{VectorHit, delete_embedding_sync, insert_embedding_sync, knn_search_sync};
pub use messages::{
    NewMessage, find_by_content_identity_sync, find_by_logical_id_sync, find_message_by_id_sync,
    insert_new_message_sync, reactions_for_message_sync, record_ingestion_session_sync,
    replace_reactions_sync, touch_message_sync, update_message_content_sync,
};
pub use pool::DatabasePool;
pub use schema::EMBEDDING_DIM;
pub use search::{
    StructuredFilter, expand_thread_sync, keyword_search_sync, messages_in_window_sync,
    structured_search_sync,
};
pub use types::{IngestionLogRow, StoredMessage, StoredReaction};
