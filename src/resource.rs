//! Authorization capability for resource types.
//!
//! Any record that owns a permission set gets grant/revoke/check operations
//! by implementing [`Shareable`]. This trait is the only seam other
//! subsystems need: they never touch grant rows or the permission tables
//! directly.

use libsql::Connection;

use crate::Result;
use crate::db::{OrgId, SetId, UserId};
use crate::level::AccessLevel;
use crate::perms::PermissionSet;

/// A resource governed by a permission set.
pub trait Shareable {
    /// Id of the permission set owned by this resource.
    fn permission_set_id(&self) -> SetId;

    /// Resource kind for error messages, e.g. `"surface"`.
    fn kind(&self) -> &'static str {
        "resource"
    }

    /// The owned permission set.
    fn permissions(&self) -> PermissionSet {
        PermissionSet::from_id(self.permission_set_id())
    }

    /// Effective level of `user` on this resource.
    async fn get_permission(&self, conn: &Connection, user: UserId) -> Result<Option<AccessLevel>> {
        self.permissions().get_for_user(conn, user).await
    }

    /// Whether `user` holds at least `level`.
    async fn has_permission(
        &self,
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<bool> {
        self.permissions()
            .user_has_permission(conn, user, level)
            .await
    }

    /// Guard: `NotFound` for zero access, `Forbidden` for insufficient level.
    async fn authorize_user(
        &self,
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<()> {
        self.permissions()
            .authorize_user(conn, user, level, self.kind())
            .await
    }

    /// Grant `level` to `user` (upsert).
    async fn grant_permission(
        &self,
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<()> {
        self.permissions().grant_user(conn, user, level).await
    }

    /// Revoke the direct grant of `user`. Idempotent.
    async fn revoke_permission(&self, conn: &Connection, user: UserId) -> Result<()> {
        self.permissions().revoke_user(conn, user).await
    }

    /// Grant `level` to all members of `org` (upsert).
    async fn grant_organization(
        &self,
        conn: &Connection,
        org: OrgId,
        level: AccessLevel,
    ) -> Result<()> {
        self.permissions().grant_organization(conn, org, level).await
    }

    /// Revoke the organization grant of `org`. Idempotent.
    async fn revoke_organization(&self, conn: &Connection, org: OrgId) -> Result<()> {
        self.permissions().revoke_organization(conn, org).await
    }
}
