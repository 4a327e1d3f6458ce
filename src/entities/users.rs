use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Random API key (64-char hex string)
    pub api_key: String,

    pub email: Option<String>,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub is_active: bool,

    pub is_staff: bool,

    /// `LOCAL`, `AD` or `LOCAL_OR_AD`
    #[sea_orm(column_type = "String(StringLen::N(20))")]
    pub auth_mode: String,

    pub ad_enabled: bool,

    /// UPN (user@domain) or DOMAIN\user
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub ad_identifier: Option<String>,

    /// `LOCAL` / `AD`, informational, set by the authentication backend
    #[sea_orm(column_type = "String(StringLen::N(16))", nullable)]
    pub last_auth_source: Option<String>,

    /// Forces password rotation on next login.
    pub must_change_password: bool,

    pub password_changed_at: Option<String>,

    pub password_never_expires: bool,

    pub last_login_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
