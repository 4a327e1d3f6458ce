mod user;

pub use user::{cmd_user_create, cmd_user_list, cmd_user_set_password, cmd_user_show};
