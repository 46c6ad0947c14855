//! Document records and the blob-store seam they depend on.

use deskflow_shared::numbering::document_number;
use deskflow_shared::TicketType;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Audit, Document, NewDocument};

/// Where uploaded file bytes live.  The database only keeps the returned
/// path.
pub trait DocumentStore: Send + Sync {
    /// Persist `content` at `destination` (a relative, caller-unique path),
    /// creating parent directories.  Returns the path to record.
    fn save(&self, content: &[u8], destination: &str) -> std::io::Result<String>;

    /// Remove a file previously returned by [`DocumentStore::save`].
    fn remove(&self, stored_path: &str) -> std::io::Result<()>;
}

/// Files written while a transaction is open.  Dropping it without
/// [`SavedFiles::keep`] removes them again, so a rolled-back transaction
/// leaves nothing behind on disk.
pub(crate) struct SavedFiles<'a> {
    store: &'a dyn DocumentStore,
    paths: Vec<String>,
}

impl<'a> SavedFiles<'a> {
    pub(crate) fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            paths: Vec::new(),
        }
    }

    pub(crate) fn save(&mut self, content: &[u8], destination: &str) -> Result<String> {
        let stored = self
            .store
            .save(content, destination)
            .map_err(|e| StoreError::DocumentStore(format!("{destination}: {e}")))?;
        self.paths.push(stored.clone());
        Ok(stored)
    }

    /// Call after commit.
    pub(crate) fn keep(mut self) {
        self.paths.clear();
    }
}

impl Drop for SavedFiles<'_> {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = self.store.remove(&path) {
                tracing::warn!(path = %path, error = %e, "failed to clean up stored document");
            }
        }
    }
}

/// Best-effort removal of files whose rows are already gone.
pub(crate) fn remove_stored(store: &dyn DocumentStore, paths: &[String]) {
    for path in paths {
        match store.remove(path) {
            Ok(()) => tracing::debug!(path = %path, "removed stored document"),
            Err(e) => tracing::warn!(path = %path, error = %e, "failed to remove stored document"),
        }
    }
}

/// How the documents of one batch get their numbers.
pub(crate) struct Numbering<'a> {
    pub serial: i64,
    pub ticket_type: TicketType,
    /// Overrides the generated number for every document in the batch.
    pub fixed: Option<&'a str>,
}

/// Store each file, then insert its row under `activity_id`.
pub(crate) fn insert_documents(
    conn: &Connection,
    files: &mut SavedFiles<'_>,
    activity_id: i64,
    numbering: &Numbering<'_>,
    documents: &[NewDocument],
    audit: Audit,
) -> Result<()> {
    let at = encode_ts(audit.at);

    for (idx, doc) in documents.iter().enumerate() {
        let ordinal = u32::try_from(idx + 1)
            .map_err(|_| StoreError::Validation("too many documents".into()))?;

        let document_no = match numbering.fixed {
            Some(no) => no.to_string(),
            None => document_number(
                numbering.serial.unsigned_abs(),
                numbering.ticket_type,
                ordinal,
                audit.at,
            ),
        };

        let file_name = sanitize_file_name(&doc.file_name);
        let destination = format!(
            "{}/{}/{}-{}",
            numbering.ticket_type.code(),
            numbering.serial,
            Uuid::new_v4(),
            file_name
        );
        let stored_path = files.save(&doc.content, &destination)?;

        conn.execute(
            "INSERT INTO documents (activity_id, document_no, document_name, document_size,
                                    document_path, document_type, created_by, updated_by,
                                    created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?8)",
            params![
                activity_id,
                document_no,
                doc.file_name,
                doc.content.len() as i64,
                stored_path,
                doc.document_type,
                audit.actor,
                at,
            ],
        )?;

        tracing::debug!(activity_id, document_no = %document_no, "document stored");
    }

    Ok(())
}

/// Stored paths of every document under a ticket.
pub(crate) fn paths_for_ticket(conn: &Connection, ticket_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT d.document_path
         FROM documents d
         JOIN activities a ON a.id = d.activity_id
         WHERE a.ticket_id = ?1",
    )?;
    let rows = stmt.query_map(params![ticket_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Stored paths of every document under an activity.
pub(crate) fn paths_for_activity(conn: &Connection, activity_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT document_path FROM documents WHERE activity_id = ?1")?;
    let rows = stmt.query_map(params![activity_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Documents of one activity in upload order.
pub(crate) fn documents_for_activity(conn: &Connection, activity_id: i64) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, activity_id, document_no, document_name, document_size, document_path,
                document_type, created_by, updated_by, created_at, updated_at
         FROM documents
         WHERE activity_id = ?1
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![activity_id], row_to_document)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Keep the last path component and replace anything outside
/// `[A-Za-z0-9._-]`.
pub(crate) fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

impl Database {
    /// Fetch a single document by id.
    pub fn get_document_by_id(&self, id: i64) -> Result<Document> {
        self.conn()
            .query_row(
                "SELECT id, activity_id, document_no, document_name, document_size, document_path,
                        document_type, created_by, updated_by, created_at, updated_at
                 FROM documents
                 WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .map_err(StoreError::from_lookup)
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(Document {
        id: row.get(0)?,
        activity_id: row.get(1)?,
        document_no: row.get(2)?,
        document_name: row.get(3)?,
        document_size: row.get(4)?,
        document_path: row.get(5)?,
        document_type: row.get(6)?,
        created_by: row.get(7)?,
        updated_by: row.get(8)?,
        created_at: decode_ts(9, &created_str)?,
        updated_at: decode_ts(10, &updated_str)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\report 1.pdf"), "report_1.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "document");
    }

    #[test]
    fn saved_files_are_removed_unless_kept() {
        let store = testing::MemoryStore::default();

        {
            let mut files = SavedFiles::new(&store);
            files.save(b"a", "x/1").unwrap();
            files.save(b"b", "x/2").unwrap();
            assert_eq!(store.len(), 2);
        }
        assert_eq!(store.len(), 0);

        let mut files = SavedFiles::new(&store);
        files.save(b"c", "x/3").unwrap();
        files.keep();
        assert!(store.contains("x/3"));
    }

    #[test]
    fn missing_document_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_document_by_id(99), Err(StoreError::NotFound)));
    }
}
