use serde::Deserialize;

use super::ApiError;
use crate::db::AccountFilter;
use crate::domain::{AccountId, AuthMode, AuthSource};

pub const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;

const fn default_page() -> u64 {
    1
}

const fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Query string for `GET /api/admin/accounts`.
#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub auth_mode: Option<String>,
    pub ad_enabled: Option<bool>,
    pub last_auth_source: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

impl ListAccountsQuery {
    pub fn filter(&self) -> Result<AccountFilter, ApiError> {
        let auth_mode = self
            .auth_mode
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(str::parse::<AuthMode>)
            .transpose()
            .map_err(|e| ApiError::validation(e.to_string()))?;

        let last_auth_source = self
            .last_auth_source
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(str::parse::<AuthSource>)
            .transpose()
            .map_err(|e| ApiError::validation(e.to_string()))?;

        Ok(AccountFilter {
            auth_mode,
            ad_enabled: self.ad_enabled,
            last_auth_source,
            is_staff: self.is_staff,
            is_active: self.is_active,
            search: self
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
        })
    }
}

pub fn validate_account_id(id: i32) -> Result<AccountId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid account ID: {}. ID must be a positive integer",
            id
        )));
    }
    Ok(AccountId::new(id))
}

pub fn validate_page(page: u64) -> Result<u64, ApiError> {
    if page == 0 {
        return Err(ApiError::validation("Invalid page: pages start at 1"));
    }
    Ok(page)
}

pub fn validate_page_size(page_size: u64) -> Result<u64, ApiError> {
    const MIN_PAGE_SIZE: u64 = 1;

    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::validation(format!(
            "Invalid page_size: {}. page_size must be between {} and {}",
            page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
        )));
    }
    Ok(page_size)
}

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &str) -> ListAccountsQuery {
        serde_json::from_str(pairs).unwrap()
    }

    #[test]
    fn test_validate_account_id() {
        assert!(validate_account_id(1).is_ok());
        assert!(validate_account_id(0).is_err());
        assert!(validate_account_id(-4).is_err());
    }

    #[test]
    fn test_validate_paging() {
        assert!(validate_page(1).is_ok());
        assert!(validate_page(0).is_err());
        assert!(validate_page_size(1).is_ok());
        assert!(validate_page_size(200).is_ok());
        assert!(validate_page_size(0).is_err());
        assert!(validate_page_size(201).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  jdoe ").unwrap(), "jdoe");
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn list_query_defaults() {
        let q = query("{}");
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, DEFAULT_PAGE_SIZE);

        let filter = q.filter().unwrap();
        assert!(filter.auth_mode.is_none());
        assert!(filter.search.is_none());
    }

    #[test]
    fn list_query_parses_filters() {
        let q = query(
            r#"{"auth_mode":"local_or_ad","last_auth_source":"AD","ad_enabled":true,"q":"  corp "}"#,
        );
        let filter = q.filter().unwrap();

        assert_eq!(filter.auth_mode, Some(AuthMode::LocalOrAd));
        assert_eq!(filter.last_auth_source, Some(AuthSource::Ad));
        assert_eq!(filter.ad_enabled, Some(true));
        assert_eq!(filter.search.as_deref(), Some("corp"));
    }

    #[test]
    fn list_query_rejects_unknown_auth_mode() {
        assert!(query(r#"{"auth_mode":"KERBEROS"}"#).filter().is_err());
        assert!(query(r#"{"last_auth_source":"LDAP"}"#).filter().is_err());
    }
}
