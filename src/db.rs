//! Database connection and schema for the permission store.
//!
//! Supports multiple backends:
//! - Local SQLite file: `path/to/db.sqlite` or `file:path` or `sqlite://path`
//! - In-memory: `:memory:`
//! - Remote Turso: `libsql://...` or `https://...` (requires TURSO_AUTH_TOKEN env var)
//!
//! The permission store is three tables: `permission_set` (bare identity),
//! `user_permission` and `organization_permission`. The unique constraints on
//! `(set_id, user_id)` and `(set_id, organization_id)` are what make the
//! grant upsert race-free: two concurrent grants to the same pair can never
//! produce two rows. The identity directory (`user`, `organization`,
//! `organization_membership`) is maintained elsewhere; this crate only reads
//! membership and display names, and seeds the reserved anonymous row.

use libsql::{Builder, Connection, Database};

/// Row id of a permission set.
pub type SetId = i64;
/// Row id of a user in the identity directory.
pub type UserId = i64;
/// Row id of an organization in the identity directory.
pub type OrgId = i64;

/// Reserved id of the anonymous principal. A `user_permission` row for this
/// id makes the set public (read-only; see the filter engine). Seeded by
/// [`init_schema`]; regular directory rows start at 1.
pub const ANONYMOUS_USER_ID: UserId = 0;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS user (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organization (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organization_membership (
    organization_id INTEGER NOT NULL REFERENCES organization(id) ON DELETE CASCADE,
    user_id         INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    UNIQUE (organization_id, user_id)
);

CREATE TABLE IF NOT EXISTS permission_set (
    id INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE TABLE IF NOT EXISTS user_permission (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    set_id  INTEGER NOT NULL REFERENCES permission_set(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    level   INTEGER NOT NULL,
    UNIQUE (set_id, user_id)
);

CREATE TABLE IF NOT EXISTS organization_permission (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    set_id          INTEGER NOT NULL REFERENCES permission_set(id) ON DELETE CASCADE,
    organization_id INTEGER NOT NULL REFERENCES organization(id) ON DELETE CASCADE,
    level           INTEGER NOT NULL,
    UNIQUE (set_id, organization_id)
);

CREATE TABLE IF NOT EXISTS surface (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    permission_set_id INTEGER NOT NULL REFERENCES permission_set(id)
);

INSERT OR IGNORE INTO user (id, name) VALUES (0, 'anonymous');
";

/// Connect to the database.
///
/// # URL formats
/// - Local file: `mydata.db`, `file:path/to/db.sqlite`, `sqlite://path`
/// - In-memory: `:memory:`
/// - Remote Turso: `libsql://your-db.turso.io` (requires `TURSO_AUTH_TOKEN` env var)
pub async fn connect(url: &str) -> crate::Result<Database> {
    let db = if url.starts_with("libsql://") || url.starts_with("https://") {
        let token = std::env::var("TURSO_AUTH_TOKEN").map_err(|_| {
            crate::Error::Config("TURSO_AUTH_TOKEN not set for remote database".into())
        })?;
        Builder::new_remote(url.to_string(), token).build().await?
    } else if url == ":memory:" {
        Builder::new_local(":memory:").build().await?
    } else {
        // Local file - strip sqlite:// or file: prefix if present
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        Builder::new_local(path).build().await?
    };

    Ok(db)
}

/// Get a connection from the database.
pub fn connection(db: &Database) -> crate::Result<Connection> {
    let conn = db.connect()?;
    Ok(conn)
}

/// Create all tables and seed the anonymous principal. Idempotent.
pub async fn init_schema(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(SCHEMA).await?;
    Ok(())
}

// Re-export commonly used libsql types for convenience
pub use libsql::{Connection as DbConnection, Database as Db, Row, params};
