//! Identity-directory access.
//!
//! Users, organizations and memberships are owned by an external identity
//! provider; the permission engine only consumes "is user a member of this
//! organization" and display names. The write helpers exist for provisioning
//! and tests.

use libsql::{Connection, params};

use crate::Result;
use crate::db::{OrgId, UserId};

/// Create a user and return its id.
pub async fn create_user(conn: &Connection, name: &str) -> Result<UserId> {
    conn.execute("INSERT INTO user (name) VALUES (?1)", params![name])
        .await?;
    Ok(conn.last_insert_rowid())
}

/// Create an organization and return its id.
pub async fn create_organization(conn: &Connection, name: &str) -> Result<OrgId> {
    conn.execute("INSERT INTO organization (name) VALUES (?1)", params![name])
        .await?;
    Ok(conn.last_insert_rowid())
}

/// Add a user to an organization. Idempotent.
pub async fn add_member(conn: &Connection, org: OrgId, user: UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO organization_membership (organization_id, user_id) VALUES (?1, ?2)",
        params![org, user],
    )
    .await?;
    Ok(())
}

/// Remove a user from an organization. Idempotent.
pub async fn remove_member(conn: &Connection, org: OrgId, user: UserId) -> Result<()> {
    conn.execute(
        "DELETE FROM organization_membership WHERE organization_id = ?1 AND user_id = ?2",
        params![org, user],
    )
    .await?;
    Ok(())
}

/// Whether `user` belongs to `org`.
pub async fn is_member(conn: &Connection, org: OrgId, user: UserId) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM organization_membership WHERE organization_id = ?1 AND user_id = ?2",
            params![org, user],
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

/// Display name for a user id, if the user exists.
pub async fn user_name(conn: &Connection, user: UserId) -> Result<Option<String>> {
    let mut rows = conn
        .query("SELECT name FROM user WHERE id = ?1", params![user])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<String>(0)?)),
        None => Ok(None),
    }
}
