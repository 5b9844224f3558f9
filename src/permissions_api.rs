//! HTTP module exposing the permission engine.
//!
//! Routes:
//! - `GET /api/v1/permission-sets/{id}/users` - direct grants on one set,
//!   sorted by user display name.
//! - `GET /api/v1/permission-sets/intersection?sets=1&sets=2` - principals
//!   with access to every listed set, at their minimum common level.
//!
//! Contract notes: these endpoints answer 403 (not 401) to unauthenticated
//! callers, and the intersection endpoint reports every input problem as 404
//! with a specific message, so a caller cannot probe which ids exist.

use libsql::params;
use serde::Serialize;

use crate::db::UserId;
use crate::error::{Error, Result};
use crate::intersect;
use crate::level::AccessLevel;
use crate::module::Module;
use crate::perms::PermissionSet;
use crate::response;
use crate::router::{Context, Router};

/// API module for permission-set endpoints.
pub struct PermissionsModule;

#[derive(Serialize)]
struct UserRef {
    id: UserId,
    name: String,
}

#[derive(Serialize)]
struct GrantEntry {
    user: UserRef,
    allow: AccessLevel,
}

#[derive(Serialize)]
struct IntersectionEntry {
    user: UserRef,
    level: AccessLevel,
}

impl Module for PermissionsModule {
    fn name(&self) -> &'static str {
        "permissions"
    }

    fn routes(&self, router: &mut Router) {
        router.get("/api/v1/permission-sets/{id}/users", list_users);
        router.get("/api/v1/permission-sets/intersection", intersection);
    }
}

/// These endpoints hide behind 403 rather than the auth layer's usual 401.
fn require_requester(ctx: &Context) -> Result<UserId> {
    ctx.user_id().ok_or(Error::Forbidden {
        resource: "permission sets".to_string(),
        action: "access".to_string(),
    })
}

async fn list_users(ctx: Context) -> Result<response::HttpResponse> {
    let requester = require_requester(&ctx)?;
    let conn = ctx.conn()?;

    // A malformed id cannot name any set; same 404 as a missing one.
    let set_id: i64 = ctx
        .require_param("id")?
        .parse()
        .map_err(|_| Error::NotFound("Permission set not found".into()))?;
    let set = PermissionSet::load(&conn, set_id)
        .await?
        .ok_or_else(|| Error::NotFound("Permission set not found".into()))?;

    if !set
        .user_has_permission(&conn, requester, AccessLevel::View)
        .await?
    {
        return Err(Error::Forbidden {
            resource: "permission set".to_string(),
            action: "view".to_string(),
        });
    }

    // Direct grants only, joined with display names, name-sorted. A read-only
    // aggregation; mutation still goes through the PermissionSet aggregate.
    let mut rows = conn
        .query(
            "SELECT up.user_id, u.name, up.level FROM user_permission up \
             JOIN user u ON u.id = up.user_id \
             WHERE up.set_id = ?1 ORDER BY u.name, u.id",
            params![set.id()],
        )
        .await?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        let ordinal = row.get::<i64>(2)?;
        let allow = AccessLevel::from_ordinal(ordinal).ok_or_else(|| {
            Error::Integrity(format!(
                "unknown access level {ordinal} on permission set {set_id}"
            ))
        })?;
        entries.push(GrantEntry {
            user: UserRef {
                id: row.get::<i64>(0)?,
                name: row.get::<String>(1)?,
            },
            allow,
        });
    }

    response::ok(&entries)
}

async fn intersection(ctx: Context) -> Result<response::HttpResponse> {
    let requester = require_requester(&ctx)?;
    let conn = ctx.conn()?;

    let raw = ctx.query_values("sets");
    if raw.is_empty() {
        return Ok(response::not_found("No permission set IDs provided"));
    }
    let parsed: std::result::Result<Vec<i64>, _> = raw.iter().map(|s| s.parse::<i64>()).collect();
    let set_ids = match parsed {
        Ok(ids) => ids,
        Err(_) => return Ok(response::not_found("Invalid permission set ID format")),
    };

    // The service reports every input problem as NotFound with a specific
    // message; surface those verbatim rather than through the error wrapper.
    let shared = match intersect::intersect(&conn, &set_ids, requester).await {
        Ok(shared) => shared,
        Err(Error::NotFound(message)) => return Ok(response::not_found(&message)),
        Err(e) => return Err(e),
    };
    let entries: Vec<IntersectionEntry> = shared
        .into_iter()
        .map(|access| IntersectionEntry {
            user: UserRef {
                id: access.user,
                name: access.name,
            },
            level: access.level,
        })
        .collect();

    response::ok(&entries)
}
