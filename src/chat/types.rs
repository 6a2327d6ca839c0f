//! Identifier types and stored records for the chat subsystem.
//!
//! Identifiers are `SQLite` rowids assigned by the store on insert, wrapped
//! in newtypes so a conversation id cannot be confused with a message id at
//! compile time.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declare a rowid newtype with a consistent API.
macro_rules! define_rowid {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap an existing rowid.
            #[inline]
            #[must_use]
            pub const fn from_i64(value: i64) -> Self {
                Self(value)
            }

            /// Extract the underlying rowid.
            #[inline]
            #[must_use]
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            #[inline]
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = core::num::ParseIntError;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_rowid!(
    /// Identifier for a stored conversation, assigned by the store on creation.
    ConversationId
);

define_rowid!(
    /// Identifier for a stored message, assigned by the store on insert.
    MessageId
);

/// Author of one turn in a conversation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// Placeholder title every conversation starts with.
pub const DEFAULT_TITLE: &str = "New Chat";

/// A named, ordered thread of messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Store-assigned identifier.
    pub id: ConversationId,
    /// Display title; never empty.
    pub title: String,
    /// Whether the one-time automatic title has been generated.
    pub title_assigned: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One turn in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author of the turn.
    pub role: Role,
    /// Free-text payload.
    pub body: String,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

// ===== Rusqlite integration ================================================

mod rusqlite_impl {
    use super::{ConversationId, MessageId, Role};
    use core::str::FromStr;

    use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

    macro_rules! impl_rusqlite_rowid_newtype {
        ($t:ty) => {
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    self.0.to_sql()
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    i64::column_result(value).map(Self)
                }
            }
        };
    }

    impl_rusqlite_rowid_newtype!(ConversationId);
    impl_rusqlite_rowid_newtype!(MessageId);

    impl ToSql for Role {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            self.as_str().to_sql()
        }
    }

    impl FromSql for Role {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            match value {
                ValueRef::Text(t) => {
                    let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                    Self::from_str(s).map_err(|_| FromSqlError::InvalidType)
                }
                _ => Err(FromSqlError::InvalidType),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [Role::User, Role::Assistant] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn conversation_id_parses_and_displays() {
        let id = ConversationId::from_i64(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<ConversationId>().unwrap(), id);
        assert!("abc".parse::<ConversationId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&MessageId::from_i64(7)).unwrap();
        assert_eq!(json, "7");
    }
}
