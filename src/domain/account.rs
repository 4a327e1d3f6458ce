//! Account authentication policy.
//!
//! An [`Account`] composes a base [`Identity`] with the authentication metadata
//! this service owns: which credential paths the account may use, its
//! directory identifier, the last successful authentication source, and the
//! local password lifecycle.
//!
//! `ad_enabled` and `auth_mode` are stored independently but only three
//! combinations are consistent:
//!
//! | `ad_enabled` | allowed `auth_mode` |
//! |---|---|
//! | `false` | `LOCAL` |
//! | `true` | `AD`, `LOCAL_OR_AD` |
//!
//! The pairing is enforced by [`Account::validate`] on the save path, not by
//! the database.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::AccountId;

/// Password age used when no policy is configured.
pub const DEFAULT_MAX_PASSWORD_AGE_DAYS: u32 = 90;

/// Which credential paths an account may authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    #[default]
    Local,
    Ad,
    LocalOrAd,
}

impl AuthMode {
    pub const ALL: [Self; 3] = [Self::Local, Self::Ad, Self::LocalOrAd];

    /// Stored/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Ad => "AD",
            Self::LocalOrAd => "LOCAL_OR_AD",
        }
    }

    /// Human-readable label shown in the admin console.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Local => "Local only",
            Self::Ad => "Active Directory only",
            Self::LocalOrAd => "Local or AD",
        }
    }

    #[must_use]
    pub const fn allows(&self, source: AuthSource) -> bool {
        matches!(
            (self, source),
            (Self::Local | Self::LocalOrAd, AuthSource::Local)
                | (Self::Ad | Self::LocalOrAd, AuthSource::Ad)
        )
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown auth mode '{0}' (expected LOCAL, AD or LOCAL_OR_AD)")]
pub struct ParseAuthModeError(pub String);

impl FromStr for AuthMode {
    type Err = ParseAuthModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(Self::Local),
            "AD" => Ok(Self::Ad),
            "LOCAL_OR_AD" => Ok(Self::LocalOrAd),
            _ => Err(ParseAuthModeError(s.to_string())),
        }
    }
}

/// Credential path used by a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthSource {
    Local,
    Ad,
}

impl AuthSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Ad => "AD",
        }
    }
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown auth source '{0}' (expected LOCAL or AD)")]
pub struct ParseAuthSourceError(pub String);

impl FromStr for AuthSource {
    type Err = ParseAuthSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(Self::Local),
            "AD" => Ok(Self::Ad),
            _ => Err(ParseAuthSourceError(s.to_string())),
        }
    }
}

/// A policy violation scoped to one field of the account.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Platform routine that turns a raw password into a stored credential.
pub trait CredentialHasher {
    fn hash(&self, raw_password: &str) -> anyhow::Result<String>;
}

/// Base identity fields owned by the identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Unique login identifier.
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Identity {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
            is_active: true,
            is_staff: false,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub identity: Identity,
    pub auth_mode: AuthMode,
    /// Fast filter flag; must agree with `auth_mode` (see [`Account::validate`]).
    pub ad_enabled: bool,
    /// UPN (`user@domain`) or `DOMAIN\user`, free text.
    pub ad_identifier: Option<String>,
    /// Written by the authentication backend only.
    pub last_auth_source: Option<AuthSource>,
    pub must_change_password: bool,
    pub(crate) password_changed_at: Option<DateTime<Utc>>,
    pub password_never_expires: bool,
    /// Maintained by the storage adapter.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A freshly provisioned account: local-only, AD disabled, no password set.
    #[must_use]
    pub fn new(id: AccountId, identity: Identity) -> Self {
        let updated_at = identity.created_at;
        Self {
            id,
            identity,
            auth_mode: AuthMode::Local,
            ad_enabled: false,
            ad_identifier: None,
            last_auth_source: None,
            must_change_password: false,
            password_changed_at: None,
            password_never_expires: false,
            updated_at,
        }
    }

    #[must_use]
    pub const fn password_changed_at(&self) -> Option<DateTime<Utc>> {
        self.password_changed_at
    }

    /// Whether the local password is past its maximum age at `now`.
    ///
    /// Accounts that are not `LOCAL` never expire locally, and an account that
    /// never set a password locally counts as expired.
    #[must_use]
    pub fn is_password_expired_at(&self, max_age_days: u32, now: DateTime<Utc>) -> bool {
        if self.auth_mode != AuthMode::Local {
            return false;
        }

        if self.password_never_expires {
            return false;
        }

        let Some(changed_at) = self.password_changed_at else {
            return true;
        };

        now > changed_at + Duration::days(i64::from(max_age_days))
    }

    #[must_use]
    pub fn is_password_expired(&self, max_age_days: u32) -> bool {
        self.is_password_expired_at(max_age_days, Utc::now())
    }

    /// Checks that `auth_mode` agrees with `ad_enabled`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.ad_enabled, self.auth_mode) {
            (true, AuthMode::Local) => Err(ValidationError::new(
                "auth_mode",
                "auth_mode cannot be LOCAL while AD is enabled",
            )),
            (false, AuthMode::Ad | AuthMode::LocalOrAd) => Err(ValidationError::new(
                "auth_mode",
                "auth_mode must be LOCAL while AD is disabled",
            )),
            _ => Ok(()),
        }
    }

    /// Hashes `raw_password` and stamps the password lifecycle fields.
    ///
    /// Returns the encoded credential, which the caller must persist in the
    /// same write as the lifecycle fields. On hashing failure the account is
    /// left untouched.
    pub fn set_password<H>(&mut self, hasher: &H, raw_password: &str) -> anyhow::Result<String>
    where
        H: CredentialHasher + ?Sized,
    {
        let encoded = hasher.hash(raw_password)?;
        self.password_changed_at = Some(Utc::now());
        self.must_change_password = false;
        Ok(encoded)
    }

    #[must_use]
    pub const fn permits(&self, source: AuthSource) -> bool {
        self.auth_mode.allows(source)
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.identity.username
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixHasher;

    impl CredentialHasher for PrefixHasher {
        fn hash(&self, raw_password: &str) -> anyhow::Result<String> {
            Ok(format!("hashed:{raw_password}"))
        }
    }

    struct FailingHasher;

    impl CredentialHasher for FailingHasher {
        fn hash(&self, _raw_password: &str) -> anyhow::Result<String> {
            anyhow::bail!("hasher unavailable")
        }
    }

    fn account() -> Account {
        Account::new(AccountId::new(1), Identity::new("jdoe"))
    }

    fn account_with(ad_enabled: bool, auth_mode: AuthMode) -> Account {
        let mut account = account();
        account.ad_enabled = ad_enabled;
        account.auth_mode = auth_mode;
        account
    }

    #[test]
    fn new_account_uses_local_defaults() {
        let account = account();
        assert_eq!(account.auth_mode, AuthMode::Local);
        assert!(!account.ad_enabled);
        assert!(!account.must_change_password);
        assert!(!account.password_never_expires);
        assert!(account.password_changed_at().is_none());
        assert!(account.last_auth_source.is_none());
        assert!(account.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inconsistent_mode_and_flag() {
        for (ad_enabled, mode) in [
            (true, AuthMode::Local),
            (false, AuthMode::Ad),
            (false, AuthMode::LocalOrAd),
        ] {
            let err = account_with(ad_enabled, mode).validate().unwrap_err();
            assert_eq!(err.field, "auth_mode", "{ad_enabled} {mode}");
            assert!(!err.message.is_empty());
        }
    }

    #[test]
    fn validate_accepts_consistent_mode_and_flag() {
        for (ad_enabled, mode) in [
            (true, AuthMode::Ad),
            (true, AuthMode::LocalOrAd),
            (false, AuthMode::Local),
        ] {
            assert!(
                account_with(ad_enabled, mode).validate().is_ok(),
                "{ad_enabled} {mode}"
            );
        }
    }

    #[test]
    fn validated_accounts_couple_flag_and_mode() {
        for ad_enabled in [true, false] {
            for mode in AuthMode::ALL {
                let account = account_with(ad_enabled, mode);
                if account.validate().is_ok() {
                    assert_eq!(account.ad_enabled, mode != AuthMode::Local);
                }
            }
        }
    }

    #[test]
    fn validation_messages_name_the_rule() {
        let err = account_with(true, AuthMode::Local).validate().unwrap_err();
        assert_eq!(err.message, "auth_mode cannot be LOCAL while AD is enabled");

        let err = account_with(false, AuthMode::Ad).validate().unwrap_err();
        assert_eq!(err.message, "auth_mode must be LOCAL while AD is disabled");
        assert_eq!(
            err.to_string(),
            "auth_mode: auth_mode must be LOCAL while AD is disabled"
        );
    }

    #[test]
    fn directory_accounts_never_expire_locally() {
        let now = Utc::now();
        for mode in [AuthMode::Ad, AuthMode::LocalOrAd] {
            let mut account = account_with(true, mode);
            assert!(!account.is_password_expired_at(90, now));

            account.password_changed_at = Some(now - Duration::days(1000));
            assert!(!account.is_password_expired_at(90, now));
        }
    }

    #[test]
    fn never_expires_flag_wins_over_age() {
        let now = Utc::now();
        let mut account = account();
        account.password_never_expires = true;
        account.password_changed_at = Some(now - Duration::days(1000));
        assert!(!account.is_password_expired_at(90, now));
    }

    #[test]
    fn unset_password_change_counts_as_expired() {
        let account = account();
        assert!(account.is_password_expired_at(90, Utc::now()));
        assert!(account.is_password_expired(DEFAULT_MAX_PASSWORD_AGE_DAYS));
    }

    #[test]
    fn expiry_follows_max_age_threshold() {
        let now = Utc::now();
        let mut account = account();

        account.password_changed_at = Some(now - Duration::days(91));
        assert!(account.is_password_expired_at(90, now));

        account.password_changed_at = Some(now - Duration::days(89));
        assert!(!account.is_password_expired_at(90, now));

        // a longer policy keeps the 91-day-old password valid
        account.password_changed_at = Some(now - Duration::days(91));
        assert!(!account.is_password_expired_at(180, now));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let mut account = account();
        account.password_changed_at = Some(now - Duration::days(90));
        assert!(!account.is_password_expired_at(90, now));
        assert!(account.is_password_expired_at(90, now + Duration::seconds(1)));
    }

    #[test]
    fn set_password_stamps_lifecycle_fields() {
        let mut account = account();
        account.must_change_password = true;
        account.password_changed_at = Some(Utc::now() - Duration::days(400));

        let before = Utc::now();
        let encoded = account.set_password(&PrefixHasher, "NewPass123").unwrap();
        let after = Utc::now();

        assert_eq!(encoded, "hashed:NewPass123");
        assert!(!account.must_change_password);
        let changed_at = account.password_changed_at().unwrap();
        assert!(changed_at >= before && changed_at <= after);
        assert!(!account.is_password_expired(90));
    }

    #[test]
    fn failed_hash_leaves_lifecycle_untouched() {
        let mut account = account();
        account.must_change_password = true;

        assert!(account.set_password(&FailingHasher, "NewPass123").is_err());
        assert!(account.must_change_password);
        assert!(account.password_changed_at().is_none());
    }

    #[test]
    fn auth_mode_permits_matching_sources() {
        assert!(AuthMode::Local.allows(AuthSource::Local));
        assert!(!AuthMode::Local.allows(AuthSource::Ad));
        assert!(!AuthMode::Ad.allows(AuthSource::Local));
        assert!(AuthMode::Ad.allows(AuthSource::Ad));
        assert!(AuthMode::LocalOrAd.allows(AuthSource::Local));
        assert!(AuthMode::LocalOrAd.allows(AuthSource::Ad));
    }

    #[test]
    fn auth_mode_text_forms() {
        for mode in AuthMode::ALL {
            assert_eq!(mode.as_str().parse::<AuthMode>().unwrap(), mode);
        }
        assert_eq!("local_or_ad".parse::<AuthMode>().unwrap(), AuthMode::LocalOrAd);
        assert!("LDAP".parse::<AuthMode>().is_err());
        assert_eq!(
            serde_json::to_string(&AuthMode::LocalOrAd).unwrap(),
            "\"LOCAL_OR_AD\""
        );
        assert_eq!(AuthMode::Ad.label(), "Active Directory only");
    }

    #[test]
    fn auth_source_text_forms() {
        assert_eq!("AD".parse::<AuthSource>().unwrap(), AuthSource::Ad);
        assert_eq!(" local ".parse::<AuthSource>().unwrap(), AuthSource::Local);
        assert!("KERBEROS".parse::<AuthSource>().is_err());
    }

    #[test]
    fn display_name_is_login_identifier() {
        let account = account();
        assert_eq!(account.display_name(), "jdoe");
        assert_eq!(account.to_string(), "jdoe");
    }
}
