//! Strata - permission engine and sharing API for surface-topography data
//! services.
//!
//! The core is a hierarchical access-control scheme over shared resources:
//!
//! - **Level lattice**: ordered access levels (`view` < `edit` < `full`);
//!   holding a level implies every lower one.
//! - **Permission sets**: the aggregate owning a resource's direct user
//!   grants and organization grants, with upsert/revoke semantics and the
//!   404-vs-403 information-hiding guard.
//! - **Filter engine**: visibility as a SQL predicate, so listing a user's
//!   resources costs one query.
//! - **Intersection service**: who can access *all* of these resources, at
//!   which common (minimum) level.
//!
//! Around the engine sits the usual service plumbing: layered config, JWT
//! auth, a hyper-based HTTP server, and pluggable API modules. Two modules
//! ship in-crate: the permission-set endpoints and a "surfaces" resource API
//! that consumes the engine through the [`Shareable`] mixin.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use strata::{Loader, Module, Overrides, Router};
//! use strata::permissions_api::PermissionsModule;
//! use strata::surface::SurfacesModule;
//!
//! #[tokio::main]
//! async fn main() -> strata::Result<()> {
//!     let config = Loader::default().load(None, Overrides::default())?;
//!
//!     let db = Arc::new(strata::db::connect(&config.database.url).await?);
//!     strata::db::init_schema(&strata::db::connection(&db)?).await?;
//!
//!     let mut router = Router::new();
//!     PermissionsModule.routes(&mut router);
//!     SurfacesModule.routes(&mut router);
//!
//!     strata::server::run(config, db, router.into_handle()).await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod filter;
pub mod intersect;
pub mod level;
pub mod module;
pub mod notify;
pub mod permissions_api;
pub mod perms;
pub mod resource;
pub mod response;
pub mod router;
pub mod server;
pub mod surface;

// Re-export main types at crate root
pub use config::{Config, Loader, Overrides};
pub use db::{ANONYMOUS_USER_ID, OrgId, SetId, UserId};
pub use error::{Error, Result};
pub use filter::SetFilter;
pub use level::AccessLevel;
pub use module::Module;
pub use notify::{Notification, Notifier};
pub use perms::{PermissionSet, UserGrant};
pub use resource::Shareable;
pub use router::{Context, Router};

// Re-export commonly used dependencies for convenience
pub use hyper::Method;
pub use serde_json::json;
