// src/db/embeddings.rs
// Vector index operations (C8) — the `slack_message_embeddings` vec0
// table colocated with the relational schema.

use rusqlite::{Connection, params};

use crate::db::schema::EMBEDDING_DIM;
use crate::error::HarvesterError;

/// Encode a vector as the little-endian byte blob `sqlite-vec` expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn check_dimensions(embedding: &[f32]) -> Result<(), HarvesterError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(HarvesterError::InvalidVectorDimensions {
            expected: EMBEDDING_DIM,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Insert (or replace) `message_id`'s embedding. Fails with
/// [`HarvesterError::InvalidVectorDimensions`] if `embedding` isn't
/// exactly [`EMBEDDING_DIM`] components (§3's Embedding row invariant).
pub fn insert_embedding_sync(
    conn: &Connection,
    message_id: &str,
    embedding: &[f32],
) -> Result<(), HarvesterError> {
    check_dimensions(embedding)?;
    delete_embedding_sync(conn, message_id)?;
    conn.execute(
        "INSERT INTO slack_message_embeddings (embedding, message_id) VALUES (?1, ?2)",
        params![embedding_to_bytes(embedding), message_id],
    )?;
    Ok(())
}

/// Remove `message_id`'s embedding, if any. The vector table has no
/// foreign key to `slack_messages` (vec0 virtual tables can't declare
/// one), so callers that delete a message must call this explicitly.
pub fn delete_embedding_sync(conn: &Connection, message_id: &str) -> Result<(), HarvesterError> {
    conn.execute(
        "DELETE FROM slack_message_embeddings WHERE message_id = ?1",
        params![message_id],
    )?;
    Ok(())
}

/// One vector search hit: a `message_id` and its distance from the query
/// vector (`1 - cosine_similarity`, per §4.10).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub message_id: String,
    pub distance: f32,
}

/// Top-`k` nearest neighbours of `query`, ascending by distance.
/// Requires `query.len() == EMBEDDING_DIM`.
pub fn knn_search_sync(
    conn: &Connection,
    query: &[f32],
    k: usize,
) -> Result<Vec<VectorHit>, HarvesterError> {
    check_dimensions(query)?;
    let query_bytes = embedding_to_bytes(query);

    let matched: rusqlite::Result<Vec<VectorHit>> = (|| {
        let mut stmt = conn.prepare(
            "SELECT message_id, distance FROM slack_message_embeddings
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance",
        )?;
        stmt.query_map(params![query_bytes, k as i64], |row| {
            Ok(VectorHit {
                message_id: row.get(0)?,
                distance: row.get(1)?,
            })
        })?
        .collect()
    })();

    match matched {
        Ok(hits) => Ok(hits),
        // Some sqlite-vec builds don't support `k = ?` on a bare MATCH query
        // against a non-partitioned vec0 table; fall back to a full scan
        // ordered by the same cosine-distance function.
        Err(_) => knn_search_full_scan_sync(conn, &query_bytes, k),
    }
}

fn knn_search_full_scan_sync(
    conn: &Connection,
    query_bytes: &[u8],
    k: usize,
) -> Result<Vec<VectorHit>, HarvesterError> {
    let mut stmt = conn.prepare(
        "SELECT message_id, vec_distance_cosine(embedding, ?1) as distance
         FROM slack_message_embeddings
         ORDER BY distance
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![query_bytes, k as i64], |row| {
        Ok(VectorHit {
            message_id: row.get(0)?,
            distance: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        crate::db::pool::ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        conn
    }

    fn vec_with(first: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = first;
        v
    }

    #[test]
    fn rejects_wrong_dimension_on_insert() {
        let conn = conn();
        let err = insert_embedding_sync(&conn, "m1", &[0.0; 10]).unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidVectorDimensions { .. }));
    }

    #[test]
    fn rejects_wrong_dimension_on_search() {
        let conn = conn();
        let err = knn_search_sync(&conn, &[0.0; 10], 5).unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidVectorDimensions { .. }));
    }

    #[test]
    fn insert_then_search_finds_nearest() {
        let conn = conn();
        insert_embedding_sync(&conn, "close", &vec_with(1.0)).unwrap();
        insert_embedding_sync(&conn, "far", &vec_with(-1.0)).unwrap();

        let hits = knn_search_sync(&conn, &vec_with(1.0), 2).unwrap();
        assert_eq!(hits.first().map(|h| h.message_id.as_str()), Some("close"));
    }

    #[test]
    fn insert_replaces_existing_embedding() {
        let conn = conn();
        insert_embedding_sync(&conn, "m1", &vec_with(1.0)).unwrap();
        insert_embedding_sync(&conn, "m1", &vec_with(-1.0)).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM slack_message_embeddings WHERE message_id = 'm1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_removes_embedding() {
        let conn = conn();
        insert_embedding_sync(&conn, "m1", &vec_with(1.0)).unwrap();
        delete_embedding_sync(&conn, "m1").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM slack_message_embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
