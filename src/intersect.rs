//! Permission intersection across multiple sets.
//!
//! Answers "who can access all of these resources at once, and how?". Within
//! one set a user's level is the maximum of their direct and
//! organization-derived grants; across sets the reported level is the
//! minimum - the weakest link determines the common access. The anonymous
//! row marks public visibility and is not a principal, so it never appears
//! in results.
//!
//! Validation is strict: every requested set must exist and be visible to
//! the requester, otherwise the whole request fails. There is no silent
//! partial intersection.

use std::collections::{BTreeSet, HashMap};

use libsql::{Connection, Value};
use serde::Serialize;

use crate::db::{ANONYMOUS_USER_ID, SetId, UserId};
use crate::error::{Error, Result};
use crate::filter::SetFilter;
use crate::level::AccessLevel;

/// One principal's common access across the requested sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedAccess {
    pub user: UserId,
    pub name: String,
    pub level: AccessLevel,
}

/// Compute the principals holding access on every one of `set_ids`, reduced
/// to their minimum level, sorted by display name (user id breaks ties).
pub async fn intersect(
    conn: &Connection,
    set_ids: &[SetId],
    requester: UserId,
) -> Result<Vec<SharedAccess>> {
    if set_ids.is_empty() {
        return Err(Error::NotFound("No permission set IDs provided".into()));
    }
    let requested: BTreeSet<SetId> = set_ids.iter().copied().collect();

    let accessible = accessible_sets(conn, &requested, requester).await?;
    if accessible.is_empty() {
        return Err(Error::NotFound("No accessible permission sets found".into()));
    }
    if accessible.len() < requested.len() {
        return Err(Error::NotFound(
            "Some permission sets do not exist or are inaccessible".into(),
        ));
    }

    // Per-set effective level for every grant-derived principal, one grouped
    // query across all sets: max(direct, organization) within a set.
    let per_set = per_set_levels(conn, &accessible).await?;

    // Keep only users present in every set; report their minimum level.
    let mut common: HashMap<UserId, (usize, AccessLevel)> = HashMap::new();
    for (user, level) in per_set {
        common
            .entry(user)
            .and_modify(|(count, min_level)| {
                *count += 1;
                *min_level = (*min_level).min(level);
            })
            .or_insert((1, level));
    }
    let survivors: Vec<(UserId, AccessLevel)> = common
        .into_iter()
        .filter(|(_, (count, _))| *count == accessible.len())
        .map(|(user, (_, level))| (user, level))
        .collect();

    let names = display_names(conn, survivors.iter().map(|(u, _)| *u)).await?;
    let mut results: Vec<SharedAccess> = survivors
        .into_iter()
        .map(|(user, level)| SharedAccess {
            user,
            name: names.get(&user).cloned().unwrap_or_default(),
            level,
        })
        .collect();
    results.sort_by(|a, b| a.name.cmp(&b.name).then(a.user.cmp(&b.user)));
    Ok(results)
}

/// The subset of `requested` that exists and is visible to `requester`.
async fn accessible_sets(
    conn: &Connection,
    requested: &BTreeSet<SetId>,
    requester: UserId,
) -> Result<BTreeSet<SetId>> {
    let mut sql = format!(
        "SELECT id FROM permission_set WHERE id IN ({}) AND ",
        placeholders(requested.len())
    );
    let mut params: Vec<Value> = requested.iter().map(|id| Value::Integer(*id)).collect();
    SetFilter::visible_to(requester, AccessLevel::View).push_predicate(&mut sql, &mut params, "id");

    let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
    let mut accessible = BTreeSet::new();
    while let Some(row) = rows.next().await? {
        accessible.insert(row.get::<i64>(0)?);
    }
    Ok(accessible)
}

/// All (user, effective level) pairs per set, flattened. A user appearing in
/// k sets yields k pairs.
async fn per_set_levels(
    conn: &Connection,
    sets: &BTreeSet<SetId>,
) -> Result<Vec<(UserId, AccessLevel)>> {
    let in_list = placeholders(sets.len());
    let sql = format!(
        "SELECT set_id, user_id, MAX(level) FROM ( \
           SELECT set_id, user_id, level FROM user_permission \
           WHERE set_id IN ({in_list}) AND user_id <> ? \
           UNION ALL \
           SELECT op.set_id, om.user_id, op.level FROM organization_permission op \
           JOIN organization_membership om ON om.organization_id = op.organization_id \
           WHERE op.set_id IN ({in_list}) \
         ) GROUP BY set_id, user_id"
    );
    let mut params: Vec<Value> = sets.iter().map(|id| Value::Integer(*id)).collect();
    params.push(Value::Integer(ANONYMOUS_USER_ID));
    params.extend(sets.iter().map(|id| Value::Integer(*id)));

    let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
    let mut pairs = Vec::new();
    while let Some(row) = rows.next().await? {
        let set: SetId = row.get::<i64>(0)?;
        let user: UserId = row.get::<i64>(1)?;
        let ordinal = row.get::<i64>(2)?;
        let level = AccessLevel::from_ordinal(ordinal).ok_or_else(|| {
            Error::Integrity(format!(
                "unknown access level {ordinal} on permission set {set}"
            ))
        })?;
        pairs.push((user, level));
    }
    Ok(pairs)
}

async fn display_names(
    conn: &Connection,
    users: impl Iterator<Item = UserId>,
) -> Result<HashMap<UserId, String>> {
    let ids: Vec<Value> = users.map(Value::Integer).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT id, name FROM user WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut rows = conn.query(&sql, libsql::params_from_iter(ids)).await?;
    let mut names = HashMap::new();
    while let Some(row) = rows.next().await? {
        names.insert(row.get::<i64>(0)?, row.get::<String>(1)?);
    }
    Ok(names)
}

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}
