//! Access-level lattice for resource sharing.
//!
//! Three ordered levels: `View` (1) < `Edit` (2) < `Full` (3). "No access" is
//! not a level; it is represented as `Option<AccessLevel>::None` throughout
//! the crate. A principal holding a level also holds every lower level.

use serde::{Deserialize, Serialize};

/// An access level on a shared resource.
///
/// The ordinal value is what gets stored in the database, so `level >= ?` and
/// `level IN (...)` predicates agree with the Rust-side `Ord`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i64)]
pub enum AccessLevel {
    /// Read-only access.
    View = 1,
    /// Content editing access.
    Edit = 2,
    /// Full control, including sharing and deletion.
    Full = 3,
}

impl AccessLevel {
    /// All levels, lowest first.
    pub const ALL: [AccessLevel; 3] = [AccessLevel::View, AccessLevel::Edit, AccessLevel::Full];

    /// Ordinal value used for database storage and comparison.
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Decode a stored ordinal.
    pub fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            1 => Some(AccessLevel::View),
            2 => Some(AccessLevel::Edit),
            3 => Some(AccessLevel::Full),
            _ => None,
        }
    }

    /// The levels that satisfy "at least `self`", for `level IN (...)`
    /// predicates.
    pub fn levels_with_access(self) -> &'static [AccessLevel] {
        match self {
            AccessLevel::View => &Self::ALL,
            AccessLevel::Edit => &[AccessLevel::Edit, AccessLevel::Full],
            AccessLevel::Full => &[AccessLevel::Full],
        }
    }

    /// Wire/display form: `"view"`, `"edit"` or `"full"`.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::View => "view",
            AccessLevel::Edit => "edit",
            AccessLevel::Full => "full",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(AccessLevel::View),
            "edit" => Ok(AccessLevel::Edit),
            "full" => Ok(AccessLevel::Full),
            _ => Err(crate::Error::BadRequest(format!(
                "Unknown access level: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order() {
        assert!(AccessLevel::View < AccessLevel::Edit);
        assert!(AccessLevel::Edit < AccessLevel::Full);
        assert_eq!(
            AccessLevel::View.max(AccessLevel::Full),
            AccessLevel::Full
        );
        assert_eq!(AccessLevel::Edit.min(AccessLevel::View), AccessLevel::View);
    }

    #[test]
    fn closure_for_view_is_everything() {
        assert_eq!(
            AccessLevel::View.levels_with_access(),
            &[AccessLevel::View, AccessLevel::Edit, AccessLevel::Full]
        );
    }

    #[test]
    fn closure_for_edit_excludes_view() {
        assert_eq!(
            AccessLevel::Edit.levels_with_access(),
            &[AccessLevel::Edit, AccessLevel::Full]
        );
    }

    #[test]
    fn closure_for_full_is_singleton() {
        assert_eq!(
            AccessLevel::Full.levels_with_access(),
            &[AccessLevel::Full]
        );
    }

    #[test]
    fn ordinal_round_trip() {
        for level in AccessLevel::ALL {
            assert_eq!(AccessLevel::from_ordinal(level.ordinal()), Some(level));
        }
        assert_eq!(AccessLevel::from_ordinal(0), None);
        assert_eq!(AccessLevel::from_ordinal(4), None);
    }

    #[test]
    fn string_round_trip() {
        for level in AccessLevel::ALL {
            assert_eq!(level.as_str().parse::<AccessLevel>().unwrap(), level);
        }
        assert!("admin".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn serde_wire_form() {
        assert_eq!(
            serde_json::to_string(&AccessLevel::Edit).unwrap(),
            r#""edit""#
        );
        let level: AccessLevel = serde_json::from_str(r#""full""#).unwrap();
        assert_eq!(level, AccessLevel::Full);
    }
}
