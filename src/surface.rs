//! Surface records: the resource type governed by the permission engine.
//!
//! A surface is a measured-topography record (name + description here; the
//! heavy data lives elsewhere). Each surface owns one permission set, created
//! together with a founding `full` grant to the creator. Deleting the surface
//! deletes the set and every grant on it.
//!
//! Routes:
//! - `POST   /api/v1/surfaces` - create
//! - `GET    /api/v1/surfaces` - list surfaces visible to the caller
//! - `GET    /api/v1/surfaces/{id}` - fetch (view)
//! - `PATCH  /api/v1/surfaces/{id}` - update (edit), with notification fan-out
//! - `DELETE /api/v1/surfaces/{id}` - delete (full)
//! - `POST   /api/v1/surfaces/{id}/share` - grant a user or organization (full)
//! - `POST   /api/v1/surfaces/{id}/unshare` - revoke a user or organization (full)
//! - `POST   /api/v1/surfaces/{id}/publish` - grant anonymous view (full)
//!
//! Unauthenticated reads run as the anonymous principal, so published
//! surfaces are world-readable; all mutations require a token.

use libsql::{Connection, Value, params};
use serde::{Deserialize, Serialize};

use crate::db::{ANONYMOUS_USER_ID, OrgId, SetId, UserId};
use crate::error::{Error, Result};
use crate::filter::SetFilter;
use crate::level::AccessLevel;
use crate::module::Module;
use crate::notify::{LogNotifier, Notifier};
use crate::perms::PermissionSet;
use crate::resource::Shareable;
use crate::response;
use crate::router::{Context, Router};

/// A surface record.
#[derive(Debug, Clone, Serialize)]
pub struct Surface {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub permission_set_id: SetId,
}

impl Shareable for Surface {
    fn permission_set_id(&self) -> SetId {
        self.permission_set_id
    }

    fn kind(&self) -> &'static str {
        "surface"
    }
}

impl Surface {
    /// Create a surface and its permission set, with a founding `full` grant
    /// to `creator`. One transaction covers the set, the grant, and the
    /// surface row; a failure rolls back all three.
    pub async fn create(
        conn: &Connection,
        creator: UserId,
        name: &str,
        description: &str,
    ) -> Result<Self> {
        let tx = conn.transaction().await?;
        let set = PermissionSet::insert_with_grant(&tx, creator, AccessLevel::Full).await?;
        tx.execute(
            "INSERT INTO surface (name, description, permission_set_id) VALUES (?1, ?2, ?3)",
            params![name, description, set.id()],
        )
        .await?;
        let id = tx.last_insert_rowid();
        tx.commit().await?;
        Ok(Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            permission_set_id: set.id(),
        })
    }

    /// Load by id. `None` if the row does not exist; visibility is the
    /// caller's problem (`authorize_user`).
    pub async fn load(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut rows = conn
            .query(
                "SELECT id, name, description, permission_set_id FROM surface WHERE id = ?1",
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self {
                id: row.get::<i64>(0)?,
                name: row.get::<String>(1)?,
                description: row.get::<String>(2)?,
                permission_set_id: row.get::<i64>(3)?,
            })),
            None => Ok(None),
        }
    }

    /// All surfaces where `user` holds at least `min_level`, in one query
    /// through the filter engine.
    pub async fn list_for_user(
        conn: &Connection,
        user: UserId,
        min_level: AccessLevel,
    ) -> Result<Vec<Self>> {
        let mut sql =
            String::from("SELECT id, name, description, permission_set_id FROM surface WHERE ");
        let mut sql_params: Vec<Value> = Vec::new();
        SetFilter::visible_to(user, min_level).push_predicate(
            &mut sql,
            &mut sql_params,
            "permission_set_id",
        );
        sql.push_str(" ORDER BY id");

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(sql_params))
            .await?;
        let mut surfaces = Vec::new();
        while let Some(row) = rows.next().await? {
            surfaces.push(Self {
                id: row.get::<i64>(0)?,
                name: row.get::<String>(1)?,
                description: row.get::<String>(2)?,
                permission_set_id: row.get::<i64>(3)?,
            });
        }
        Ok(surfaces)
    }

    /// Delete the surface and its permission set.
    pub async fn delete(self, conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM surface WHERE id = ?1", params![self.id])
            .await?;
        self.permissions().delete(conn).await
    }
}

/// API module for surface endpoints.
pub struct SurfacesModule;

impl Module for SurfacesModule {
    fn name(&self) -> &'static str {
        "surfaces"
    }

    fn routes(&self, router: &mut Router) {
        router.post("/api/v1/surfaces", create);
        router.get("/api/v1/surfaces", list);
        router.get("/api/v1/surfaces/{id}", get);
        router.patch("/api/v1/surfaces/{id}", update);
        router.delete("/api/v1/surfaces/{id}", delete);
        router.post("/api/v1/surfaces/{id}/share", share);
        router.post("/api/v1/surfaces/{id}/unshare", unshare);
        router.post("/api/v1/surfaces/{id}/publish", publish);
    }
}

#[derive(Deserialize)]
struct CreatePayload {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct UpdatePayload {
    name: Option<String>,
    description: Option<String>,
}

/// Grant target: exactly one of `user` or `organization`.
#[derive(Deserialize)]
struct SharePayload {
    user: Option<UserId>,
    organization: Option<OrgId>,
    allow: AccessLevel,
}

#[derive(Deserialize)]
struct UnsharePayload {
    user: Option<UserId>,
    organization: Option<OrgId>,
}

/// Fetch a surface and authorize the caller in one step, collapsing
/// "missing" and "invisible" into the same `NotFound`.
async fn load_authorized(
    conn: &Connection,
    ctx: &Context,
    user: UserId,
    level: AccessLevel,
) -> Result<Surface> {
    let id: i64 = ctx
        .require_param("id")?
        .parse()
        .map_err(|_| Error::NotFound("surface".into()))?;
    let surface = Surface::load(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound("surface".into()))?;
    surface.authorize_user(conn, user, level).await?;
    Ok(surface)
}

async fn create(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let payload: CreatePayload = ctx.json()?;
    let conn = ctx.conn()?;

    let surface = Surface::create(&conn, user, &payload.name, &payload.description).await?;
    tracing::info!(surface = surface.id, creator = user, "surface created");
    response::created(&surface)
}

async fn list(ctx: Context) -> Result<response::HttpResponse> {
    // No token means the anonymous principal: published surfaces only.
    let user = ctx.user_id().unwrap_or(ANONYMOUS_USER_ID);
    let conn = ctx.conn()?;

    let surfaces = Surface::list_for_user(&conn, user, AccessLevel::View).await?;
    response::ok(&surfaces)
}

async fn get(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.user_id().unwrap_or(ANONYMOUS_USER_ID);
    let conn = ctx.conn()?;

    let surface = load_authorized(&conn, &ctx, user, AccessLevel::View).await?;
    response::ok(&surface)
}

async fn update(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let payload: UpdatePayload = ctx.json()?;
    let conn = ctx.conn()?;

    let mut surface = load_authorized(&conn, &ctx, user, AccessLevel::Edit).await?;
    if let Some(name) = payload.name {
        surface.name = name;
    }
    if let Some(description) = payload.description {
        surface.description = description;
    }
    conn.execute(
        "UPDATE surface SET name = ?1, description = ?2 WHERE id = ?3",
        params![surface.name.clone(), surface.description.clone(), surface.id],
    )
    .await?;

    // Fan-out to directly granted users; delivery must not gate the response.
    let events = surface
        .permissions()
        .notify_users(
            &conn,
            user,
            "edit",
            &format!("Surface \"{}\" was changed", surface.name),
        )
        .await?;
    let notifier = LogNotifier;
    for event in &events {
        notifier.deliver(event);
    }

    response::ok(&surface)
}

async fn delete(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let conn = ctx.conn()?;

    let surface = load_authorized(&conn, &ctx, user, AccessLevel::Full).await?;
    surface.delete(&conn).await?;
    Ok(response::no_content())
}

async fn share(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let payload: SharePayload = ctx.json()?;
    let conn = ctx.conn()?;

    let surface = load_authorized(&conn, &ctx, user, AccessLevel::Full).await?;
    match (payload.user, payload.organization) {
        (Some(target), None) => {
            surface.grant_permission(&conn, target, payload.allow).await?;
        }
        (None, Some(org)) => {
            surface.grant_organization(&conn, org, payload.allow).await?;
        }
        _ => {
            return Err(Error::BadRequest(
                "Provide exactly one of 'user' or 'organization'".into(),
            ));
        }
    }
    Ok(response::no_content())
}

async fn unshare(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let payload: UnsharePayload = ctx.json()?;
    let conn = ctx.conn()?;

    let surface = load_authorized(&conn, &ctx, user, AccessLevel::Full).await?;
    match (payload.user, payload.organization) {
        (Some(target), None) => {
            surface.revoke_permission(&conn, target).await?;
        }
        (None, Some(org)) => {
            surface.revoke_organization(&conn, org).await?;
        }
        _ => {
            return Err(Error::BadRequest(
                "Provide exactly one of 'user' or 'organization'".into(),
            ));
        }
    }
    Ok(response::no_content())
}

async fn publish(ctx: Context) -> Result<response::HttpResponse> {
    let user = ctx.require_user_id()?;
    let conn = ctx.conn()?;

    let surface = load_authorized(&conn, &ctx, user, AccessLevel::Full).await?;
    // Public means read-only: the anonymous principal only ever gets view.
    surface
        .grant_permission(&conn, ANONYMOUS_USER_ID, AccessLevel::View)
        .await?;
    Ok(response::no_content())
}
