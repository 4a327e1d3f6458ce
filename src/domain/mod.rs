//! Domain types for account management with strong typing.
//!
//! The account policy lives in [`account`]; this module holds the shared
//! identifier newtype so repository rows and API paths cannot mix raw integers.

pub mod account;

pub use account::{
    Account, AuthMode, AuthSource, CredentialHasher, DEFAULT_MAX_PASSWORD_AGE_DAYS, Identity,
    ParseAuthModeError, ParseAuthSourceError, ValidationError,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of an account (the base identity row it is attached to).
///
/// # Examples
///
/// ```rust
/// use umdm::domain::AccountId;
///
/// let id = AccountId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId(i32);

impl AccountId {
    /// Creates a new `AccountId` from a raw i32 value.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `id` is negative.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        debug_assert!(id >= 0, "AccountId should be non-negative");
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AccountId> for i32 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl From<i32> for AccountId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl Serialize for AccountId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i32::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_conversions() {
        let id = AccountId::new(7);
        assert_eq!(id.value(), 7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(i32::from(id), 7);
        assert_eq!(AccountId::from(7), id);
    }

    #[test]
    fn account_id_serialization() {
        let id = AccountId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let deserialized: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }
}
