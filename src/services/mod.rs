pub mod account_service;
pub mod account_service_impl;
pub use account_service::{AccountChanges, AccountError, AccountService, LoginOutcome, NewAccount};
pub use account_service_impl::SeaOrmAccountService;
