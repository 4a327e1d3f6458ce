//! Account management command handlers

use crate::config::Config;
use crate::db::AccountFilter;
use crate::domain::{Account, AuthMode};
use crate::services::NewAccount;
use crate::state::SharedState;

const LIST_PAGE_SIZE: u64 = 200;

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub async fn cmd_user_list(
    config: &Config,
    auth_mode: Option<AuthMode>,
    query: Option<String>,
) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let filter = AccountFilter {
        auth_mode,
        search: query,
        ..Default::default()
    };

    let mut accounts: Vec<Account> = Vec::new();
    let mut page = 1;
    loop {
        let result = state
            .account_service
            .list_accounts(&filter, page, LIST_PAGE_SIZE)
            .await?;
        accounts.extend(result.accounts);
        if page >= result.total_pages {
            break;
        }
        page += 1;
    }

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("Accounts ({} total)", accounts.len());
    println!("{:-<70}", "");

    for account in &accounts {
        let staff = if account.identity.is_staff { " [STAFF]" } else { "" };
        let inactive = if account.identity.is_active { "" } else { " (disabled)" };
        println!("• {}{}{}", account.identity.username, staff, inactive);
        println!(
            "  ID: {} | Mode: {} | AD: {} | Last source: {}",
            account.id,
            account.auth_mode,
            or_dash(account.ad_identifier.as_deref()),
            account
                .last_auth_source
                .map_or("-", |source| source.as_str()),
        );
    }

    Ok(())
}

pub async fn cmd_user_show(config: &Config, username: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let account = state
        .account_service
        .get_account_by_username(username)
        .await?;
    let expired = state.account_service.is_password_expired(&account).await;

    println!("Account: {} ({})", account.display_name(), account.identity.username);
    println!("{:-<70}", "");
    println!("ID:                 {}", account.id);
    println!("Email:              {}", or_dash(account.identity.email.as_deref()));
    println!("Active:             {}", yes_no(account.identity.is_active));
    println!("Staff:              {}", yes_no(account.identity.is_staff));
    println!();
    println!("Authentication");
    println!("  Mode:             {}", account.auth_mode.label());
    println!("  AD enabled:       {}", yes_no(account.ad_enabled));
    println!("  AD identifier:    {}", or_dash(account.ad_identifier.as_deref()));
    println!(
        "  Last auth source: {}",
        account.last_auth_source.map_or("-", |s| s.as_str())
    );
    println!();
    println!("Password");
    println!("  Must change:      {}", yes_no(account.must_change_password));
    println!("  Never expires:    {}", yes_no(account.password_never_expires));
    println!(
        "  Changed at:       {}",
        account
            .password_changed_at()
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    println!("  Expired:          {}", yes_no(expired));
    println!();
    println!("Created:            {}", account.identity.created_at.to_rfc3339());
    println!("Updated:            {}", account.updated_at.to_rfc3339());
    println!(
        "Last login:         {}",
        account
            .identity
            .last_login_at
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );

    Ok(())
}

pub async fn cmd_user_create(
    config: &Config,
    username: &str,
    password: Option<String>,
    staff: bool,
    ad_identifier: Option<String>,
    auth_mode: AuthMode,
) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;

    let account = state
        .account_service
        .create_account(NewAccount {
            username: username.to_string(),
            password,
            is_active: true,
            is_staff: staff,
            auth_mode,
            ad_enabled: auth_mode != AuthMode::Local,
            ad_identifier,
            ..Default::default()
        })
        .await?;

    println!(
        "✓ Created account {} (ID: {}, mode: {})",
        account.identity.username, account.id, account.auth_mode
    );
    Ok(())
}

pub async fn cmd_user_set_password(
    config: &Config,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let account = state
        .account_service
        .get_account_by_username(username)
        .await?;

    state
        .account_service
        .reset_password(account.id, password, false)
        .await?;

    println!("✓ Password updated for {}", account.identity.username);
    Ok(())
}
