use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of actor a grant names.
///
/// Users and groups receive grants through the same machinery; the only
/// behavioral difference is validation (group grants cannot carry the
/// maintainer level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(PrincipalKind::User),
            "group" => Some(PrincipalKind::Group),
            _ => None,
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An identity a grant attaches to. The id points at a user or group row
/// owned elsewhere; this subsystem never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub id: Uuid,
}

impl Principal {
    pub fn user(id: Uuid) -> Self {
        Self {
            kind: PrincipalKind::User,
            id,
        }
    }

    pub fn group(id: Uuid) -> Self {
        Self {
            kind: PrincipalKind::Group,
            id,
        }
    }

    pub fn is_user(&self) -> bool {
        self.kind == PrincipalKind::User
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(PrincipalKind::parse("user"), Some(PrincipalKind::User));
        assert_eq!(PrincipalKind::parse("group"), Some(PrincipalKind::Group));
        assert_eq!(PrincipalKind::parse("robot"), None);
    }

    #[test]
    fn test_display() {
        let id = Uuid::new_v4();
        let principal = Principal::group(id);
        assert_eq!(principal.to_string(), format!("group:{id}"));
        assert!(!principal.is_user());
    }
}
