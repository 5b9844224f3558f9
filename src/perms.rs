//! Permission sets: the authorization aggregate.
//!
//! A `PermissionSet` governs exactly one shared resource. It owns the direct
//! user grants and the organization grants for that resource, and every
//! mutation of grant rows in the store goes through this type. The effective
//! level of a user on a set is the maximum of:
//!
//! - the user's own direct grant,
//! - the anonymous grant (public visibility), and
//! - the highest grant of any organization the user belongs to.
//!
//! Grants are upserts: there is never more than one direct grant row per
//! (set, user) pair. The unique constraint in the schema enforces this under
//! concurrency; finding a duplicate at read time is an integrity failure, not
//! something to silently repair.

use libsql::{Connection, Value, params};

use crate::db::{ANONYMOUS_USER_ID, OrgId, SetId, UserId};
use crate::error::{Error, Result};
use crate::level::AccessLevel;
use crate::notify::Notification;

/// A direct user grant on a permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserGrant {
    pub user: UserId,
    pub level: AccessLevel,
}

/// Handle to one permission set in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSet {
    id: SetId,
}

impl PermissionSet {
    /// Wrap a known set id without touching the store.
    pub fn from_id(id: SetId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SetId {
        self.id
    }

    /// Create an empty permission set.
    pub async fn create(conn: &Connection) -> Result<Self> {
        conn.execute("INSERT INTO permission_set DEFAULT VALUES", ())
            .await?;
        Ok(Self {
            id: conn.last_insert_rowid(),
        })
    }

    /// Create a permission set together with its founding grant, atomically:
    /// either both rows exist afterwards or neither does.
    pub async fn create_with_grant(
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<Self> {
        let tx = conn.transaction().await?;
        let set = Self::insert_with_grant(&tx, user, level).await?;
        tx.commit().await?;
        Ok(set)
    }

    /// Insert the set row and founding grant row on `conn` as given. The
    /// caller owns the transaction boundary; resources that create a set
    /// alongside their own rows use this inside one transaction so a failed
    /// resource insert cannot leave an orphan set behind.
    pub(crate) async fn insert_with_grant(
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<Self> {
        conn.execute("INSERT INTO permission_set DEFAULT VALUES", ())
            .await?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO user_permission (set_id, user_id, level) VALUES (?1, ?2, ?3)",
            params![id, user, level.ordinal()],
        )
        .await?;
        Ok(Self { id })
    }

    /// Load a set by id, or `None` if no such set exists.
    pub async fn load(conn: &Connection, id: SetId) -> Result<Option<Self>> {
        let mut rows = conn
            .query("SELECT id FROM permission_set WHERE id = ?1", params![id])
            .await?;
        Ok(rows.next().await?.map(|_| Self { id }))
    }

    /// The user's direct grant on this set, if any.
    ///
    /// More than one row for the pair means the upsert invariant was bypassed
    /// upstream; that is surfaced as [`Error::Integrity`].
    async fn direct_level(&self, conn: &Connection, user: UserId) -> Result<Option<AccessLevel>> {
        let mut rows = conn
            .query(
                "SELECT level FROM user_permission WHERE set_id = ?1 AND user_id = ?2",
                params![self.id, user],
            )
            .await?;
        let mut found = None;
        while let Some(row) = rows.next().await? {
            let level = decode_level(row.get::<i64>(0)?, self.id)?;
            if found.replace(level).is_some() {
                return Err(Error::Integrity(format!(
                    "multiple direct grants for user {user} on permission set {}",
                    self.id
                )));
            }
        }
        Ok(found)
    }

    /// Highest grant this user inherits through organization membership.
    async fn organization_level(
        &self,
        conn: &Connection,
        user: UserId,
    ) -> Result<Option<AccessLevel>> {
        let mut rows = conn
            .query(
                "SELECT MAX(op.level) FROM organization_permission op \
                 JOIN organization_membership om ON om.organization_id = op.organization_id \
                 WHERE op.set_id = ?1 AND om.user_id = ?2",
                params![self.id, user],
            )
            .await?;
        match rows.next().await? {
            Some(row) => match row.get_value(0)? {
                Value::Null => Ok(None),
                Value::Integer(ordinal) => Ok(Some(decode_level(ordinal, self.id)?)),
                other => Err(Error::Integrity(format!(
                    "non-integer access level {other:?} on permission set {}",
                    self.id
                ))),
            },
            None => Ok(None),
        }
    }

    /// Effective level of `user` on this set, or `None` for no access.
    ///
    /// This is the single authoritative point check; every "can this user..."
    /// question in the crate reduces to it.
    pub async fn get_for_user(
        &self,
        conn: &Connection,
        user: UserId,
    ) -> Result<Option<AccessLevel>> {
        let direct = self.direct_level(conn, user).await?;
        let public = if user == ANONYMOUS_USER_ID {
            None
        } else {
            self.direct_level(conn, ANONYMOUS_USER_ID).await?
        };
        let inherited = self.organization_level(conn, user).await?;
        Ok([direct, public, inherited].into_iter().flatten().max())
    }

    /// Grant `level` to `user`. Upsert: a second grant for the same user
    /// replaces the first, it never creates a second row.
    pub async fn grant_user(
        &self,
        conn: &Connection,
        user: UserId,
        level: AccessLevel,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO user_permission (set_id, user_id, level) VALUES (?1, ?2, ?3) \
             ON CONFLICT (set_id, user_id) DO UPDATE SET level = excluded.level",
            params![self.id, user, level.ordinal()],
        )
        .await?;
        Ok(())
    }

    /// Remove the direct grant for `user`. Idempotent.
    pub async fn revoke_user(&self, conn: &Connection, user: UserId) -> Result<()> {
        conn.execute(
            "DELETE FROM user_permission WHERE set_id = ?1 AND user_id = ?2",
            params![self.id, user],
        )
        .await?;
        Ok(())
    }

    /// Grant `level` to every member of `org`, present and future. Upsert.
    pub async fn grant_organization(
        &self,
        conn: &Connection,
        org: OrgId,
        level: AccessLevel,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO organization_permission (set_id, organization_id, level) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (set_id, organization_id) DO UPDATE SET level = excluded.level",
            params![self.id, org, level.ordinal()],
        )
        .await?;
        Ok(())
    }

    /// Remove the organization grant for `org`. Idempotent.
    pub async fn revoke_organization(&self, conn: &Connection, org: OrgId) -> Result<()> {
        conn.execute(
            "DELETE FROM organization_permission WHERE set_id = ?1 AND organization_id = ?2",
            params![self.id, org],
        )
        .await?;
        Ok(())
    }

    /// Whether `user` holds at least `required` on this set.
    pub async fn user_has_permission(
        &self,
        conn: &Connection,
        user: UserId,
        required: AccessLevel,
    ) -> Result<bool> {
        Ok(self
            .get_for_user(conn, user)
            .await?
            .is_some_and(|held| held >= required))
    }

    /// Guard an operation on the governed resource.
    ///
    /// A user with no access at all gets `NotFound`, so strangers cannot tell
    /// a hidden resource from a missing one. A user with some access below
    /// `required` gets `Forbidden`.
    pub async fn authorize_user(
        &self,
        conn: &Connection,
        user: UserId,
        required: AccessLevel,
        resource: &str,
    ) -> Result<()> {
        match self.get_for_user(conn, user).await? {
            None => Err(Error::NotFound(resource.to_string())),
            Some(held) if held >= required => Ok(()),
            Some(_) => Err(Error::Forbidden {
                resource: resource.to_string(),
                action: required.as_str().to_string(),
            }),
        }
    }

    /// Direct grants on this set, anonymous included, ordered by user id.
    /// Organization-inherited access is not enumerated here.
    pub async fn users(&self, conn: &Connection) -> Result<Vec<UserGrant>> {
        let mut rows = conn
            .query(
                "SELECT user_id, level FROM user_permission WHERE set_id = ?1 ORDER BY user_id",
                params![self.id],
            )
            .await?;
        let mut grants = Vec::new();
        while let Some(row) = rows.next().await? {
            grants.push(UserGrant {
                user: row.get::<i64>(0)?,
                level: decode_level(row.get::<i64>(1)?, self.id)?,
            });
        }
        Ok(grants)
    }

    /// Build one notification event per directly granted user, excluding the
    /// actor and the anonymous row. Organization members are not fanned out;
    /// membership is dynamic and potentially large.
    pub async fn notify_users(
        &self,
        conn: &Connection,
        actor: UserId,
        verb: &str,
        description: &str,
    ) -> Result<Vec<Notification>> {
        let grants = self.users(conn).await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.user != actor && g.user != ANONYMOUS_USER_ID)
            .map(|g| Notification {
                recipient: g.user,
                actor,
                verb: verb.to_string(),
                description: description.to_string(),
            })
            .collect())
    }

    /// Delete the set and all of its grants. The resource owning this set is
    /// responsible for calling this from its own deletion path.
    pub async fn delete(&self, conn: &Connection) -> Result<()> {
        let tx = conn.transaction().await?;
        tx.execute(
            "DELETE FROM user_permission WHERE set_id = ?1",
            params![self.id],
        )
        .await?;
        tx.execute(
            "DELETE FROM organization_permission WHERE set_id = ?1",
            params![self.id],
        )
        .await?;
        tx.execute(
            "DELETE FROM permission_set WHERE id = ?1",
            params![self.id],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn decode_level(ordinal: i64, set: SetId) -> Result<AccessLevel> {
    AccessLevel::from_ordinal(ordinal).ok_or_else(|| {
        Error::Integrity(format!(
            "unknown access level {ordinal} on permission set {set}"
        ))
    })
}
