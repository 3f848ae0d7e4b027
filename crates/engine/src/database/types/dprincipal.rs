use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

use common::grant::PrincipalKind;

/// TEXT-backed wrapper for [`PrincipalKind`] columns.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct DPrincipalKind(PrincipalKind);

impl From<DPrincipalKind> for PrincipalKind {
    fn from(val: DPrincipalKind) -> Self {
        val.0
    }
}

impl From<PrincipalKind> for DPrincipalKind {
    fn from(kind: PrincipalKind) -> Self {
        Self(kind)
    }
}

impl std::ops::Deref for DPrincipalKind {
    type Target = PrincipalKind;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DPrincipalKind {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let db_val = <String as Decode<Sqlite>>::decode(value)?;
        let kind = PrincipalKind::parse(&db_val).ok_or(DPrincipalKindError::UnknownKind(db_val))?;

        Ok(Self(kind))
    }
}

impl Encode<'_, Sqlite> for DPrincipalKind {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.0.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DPrincipalKind {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DPrincipalKindError {
    #[error("unknown principal kind: {0}")]
    UnknownKind(String),
}
