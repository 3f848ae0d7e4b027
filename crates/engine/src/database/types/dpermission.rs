use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

use common::grant::Permission;

/// TEXT-backed wrapper for [`Permission`] columns.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct DPermission(Permission);

impl From<DPermission> for Permission {
    fn from(val: DPermission) -> Self {
        val.0
    }
}

impl From<Permission> for DPermission {
    fn from(permission: Permission) -> Self {
        Self(permission)
    }
}

impl std::ops::Deref for DPermission {
    type Target = Permission;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DPermission {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let db_val = <String as Decode<Sqlite>>::decode(value)?;
        let permission =
            Permission::parse(&db_val).ok_or(DPermissionError::UnknownPermission(db_val))?;

        Ok(Self(permission))
    }
}

impl Encode<'_, Sqlite> for DPermission {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.0.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DPermission {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DPermissionError {
    #[error("unknown permission level: {0}")]
    UnknownPermission(String),
}
