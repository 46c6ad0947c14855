//! Adds the profile photo path to `users`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE users ADD COLUMN photo TEXT;      -- path in the document store, NULL when unset
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
