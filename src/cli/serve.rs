// src/cli/serve.rs
// Placeholder "ingest-watch" loop. The window/process enumerator that would
// hand live accessibility windows to the parser table is an out-of-scope
// collaborator (spec.md §1); this just opens the store, runs migrations,
// and idles so the command has something real to do against a real
// database file rather than being pure decoration.

use std::path::Path;

use tracing::info;

use crate::db::pool::DatabasePool;

pub async fn run(db_path: &Path) -> anyhow::Result<()> {
    let pool = DatabasePool::open(db_path).await?;
    info!(path = %db_path.display(), status = ?pool.status(), "store ready, no window source configured — idling");
    Ok(())
}
