use std::fmt;

use serde::{Deserialize, Serialize};

/// Access level a grant confers.
///
/// Levels are strictly ordered, and the derived ordering is the one
/// comparisons use:
/// - `Read`: View the target and its contents
/// - `ReadWrite`: View and edit the target and its contents
/// - `Maintainer`: Manage the collection itself (membership, settings).
///   Only meaningful for users on collections; documents and groups top
///   out at `ReadWrite`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    ReadWrite,
    Maintainer,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::ReadWrite => "read_write",
            Permission::Maintainer => "maintainer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "read_write" => Some(Permission::ReadWrite),
            "maintainer" => Some(Permission::Maintainer),
            _ => None,
        }
    }

    /// Whether this level allows editing the target.
    pub fn can_edit(&self) -> bool {
        *self >= Permission::ReadWrite
    }

    /// Whether this level allows managing the collection itself.
    pub fn can_maintain(&self) -> bool {
        *self >= Permission::Maintainer
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_permission_ordering() {
        assert!(Permission::Read < Permission::ReadWrite);
        assert!(Permission::ReadWrite < Permission::Maintainer);

        assert!(!Permission::Read.can_edit());
        assert!(Permission::ReadWrite.can_edit());
        assert!(!Permission::ReadWrite.can_maintain());
        assert!(Permission::Maintainer.can_maintain());
    }

    #[test]
    fn test_permission_round_trip() {
        for permission in [
            Permission::Read,
            Permission::ReadWrite,
            Permission::Maintainer,
        ] {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::parse("admin"), None);
    }
}
