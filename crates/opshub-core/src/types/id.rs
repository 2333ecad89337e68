//! Newtype wrappers for all domain entity identifiers.
//!
//! Using distinct types prevents accidentally passing a `CronjobId` where a
//! `RecordId` is expected. Persisted entities are keyed by signed 64-bit
//! rowids; the export format replaces these numeric keys with resolvable
//! names. When the `sqlx` feature is enabled, each rowid type also
//! implements `sqlx::Type`, `sqlx::Encode`, and `sqlx::Decode` for SQLite.
//!
//! [`EntryId`] is the one exception: it is an opaque scheduler-issued
//! registration token and is never a database key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a newtype ID wrapper around `i64`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Create an identifier from a raw rowid.
            pub fn from_raw(id: i64) -> Self {
                Self(id)
            }

            /// Return the inner rowid value.
            pub fn into_raw(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        #[cfg(feature = "sqlx")]
        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        #[cfg(feature = "sqlx")]
        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <i64 as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }

        #[cfg(feature = "sqlx")]
        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                <i64 as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a cron job definition.
    CronjobId
);

define_id!(
    /// Unique identifier for an execution record.
    RecordId
);

define_id!(
    /// Unique identifier for a backup account.
    AccountId
);

define_id!(
    /// Unique identifier for a backup source (app, website, or database).
    SourceId
);

/// Opaque scheduler-issued token for one registered trigger segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Create a new random entry token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cronjob_id_display() {
        let id = CronjobId::from_raw(42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_cronjob_id_from_str() {
        let id: CronjobId = "17".parse().expect("should parse");
        assert_eq!(id.into_raw(), 17);
    }

    #[test]
    fn test_entry_id_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = AccountId::from_raw(7);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "7");
        let parsed: AccountId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
