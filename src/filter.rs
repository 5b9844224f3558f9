//! Query filter engine: visibility as a SQL predicate.
//!
//! `SetFilter` builds a sub-select of permission-set ids visible to a user at
//! some minimum level. Callers embed it into their own resource query as
//! `<column> IN (<subquery>)`, so listing a user's resources is one database
//! query with a union, never a per-row effective-permission check.
//!
//! The predicate has up to three branches:
//! - a direct grant for the user,
//! - a grant for an organization the user belongs to,
//! - the anonymous grant - only when the minimum level is `View`. Public
//!   access never implies edit or full; a public set is read-only to
//!   strangers by construction.

use libsql::Value;

use crate::db::{ANONYMOUS_USER_ID, UserId};
use crate::level::AccessLevel;

/// A parameterized sub-select of visible permission-set ids.
///
/// Placeholders are plain `?`, bound by occurrence order, so the fragment can
/// be appended to a host query that already carries its own parameters.
#[derive(Debug, Clone)]
pub struct SetFilter {
    sql: String,
    params: Vec<Value>,
}

impl SetFilter {
    /// Predicate for "sets where `user` holds at least `min_level`".
    pub fn visible_to(user: UserId, min_level: AccessLevel) -> Self {
        let mut sql = String::new();
        let mut params: Vec<Value> = Vec::new();

        if min_level == AccessLevel::View {
            // Any grant implies view, so no level restriction; the anonymous
            // row rides along in the same IN list as the user's own id.
            sql.push_str(
                "SELECT set_id FROM user_permission WHERE user_id IN (?, ?) \
                 UNION \
                 SELECT op.set_id FROM organization_permission op \
                 JOIN organization_membership om \
                 ON om.organization_id = op.organization_id \
                 WHERE om.user_id = ?",
            );
            params.push(Value::Integer(user));
            params.push(Value::Integer(ANONYMOUS_USER_ID));
            params.push(Value::Integer(user));
        } else {
            let levels = min_level.levels_with_access();
            let in_list = placeholders(levels.len());

            sql.push_str(&format!(
                "SELECT set_id FROM user_permission \
                 WHERE user_id = ? AND level IN ({in_list}) \
                 UNION \
                 SELECT op.set_id FROM organization_permission op \
                 JOIN organization_membership om \
                 ON om.organization_id = op.organization_id \
                 WHERE om.user_id = ? AND op.level IN ({in_list})"
            ));
            params.push(Value::Integer(user));
            params.extend(levels.iter().map(|l| Value::Integer(l.ordinal())));
            params.push(Value::Integer(user));
            params.extend(levels.iter().map(|l| Value::Integer(l.ordinal())));
        }

        Self { sql, params }
    }

    /// The raw sub-select, without enclosing parentheses.
    pub fn subquery(&self) -> &str {
        &self.sql
    }

    /// Parameters for the sub-select, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Append `<column> IN (<subquery>)` to a WHERE clause under
    /// construction, pushing this filter's parameters onto the host query's
    /// parameter list.
    pub fn push_predicate(&self, sql: &mut String, params: &mut Vec<Value>, column: &str) {
        sql.push_str(column);
        sql.push_str(" IN (");
        sql.push_str(&self.sql);
        sql.push(')');
        params.extend(self.params.iter().cloned());
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn integers(values: &[Value]) -> Vec<i64> {
        values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => *i,
                other => panic!("unexpected param {other:?}"),
            })
            .collect()
    }

    #[test]
    fn view_filter_includes_anonymous_branch() {
        let filter = SetFilter::visible_to(42, AccessLevel::View);
        assert!(integers(filter.params()).contains(&ANONYMOUS_USER_ID));
        // No level restriction for view
        assert!(!filter.subquery().contains("level IN"));
    }

    #[test]
    fn edit_filter_has_no_anonymous_branch() {
        let filter = SetFilter::visible_to(42, AccessLevel::Edit);
        let params = integers(filter.params());
        assert!(!params.contains(&ANONYMOUS_USER_ID));
        // user id + levels {2, 3}, twice (direct and organization branches)
        assert_eq!(params, vec![42, 2, 3, 42, 2, 3]);
    }

    #[test]
    fn full_filter_restricts_to_full() {
        let filter = SetFilter::visible_to(7, AccessLevel::Full);
        assert_eq!(integers(filter.params()), vec![7, 3, 7, 3]);
    }

    #[test]
    fn placeholder_count_matches_params() {
        for level in AccessLevel::ALL {
            let filter = SetFilter::visible_to(1, level);
            let count = filter.subquery().matches('?').count();
            assert_eq!(count, filter.params().len());
        }
    }

    #[test]
    fn push_predicate_appends_in_order() {
        let filter = SetFilter::visible_to(5, AccessLevel::View);
        let mut sql = "SELECT id FROM surface WHERE ".to_string();
        let mut params = vec![Value::Integer(99)];
        filter.push_predicate(&mut sql, &mut params, "permission_set_id");

        assert!(sql.starts_with("SELECT id FROM surface WHERE permission_set_id IN (SELECT"));
        assert_eq!(params.len(), 1 + filter.params().len());
        assert_eq!(integers(&params)[0], 99);
    }
}
