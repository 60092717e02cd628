//! User table identifiers and field names.

pub const USERS_TABLE: &str = "users";

pub const ID: &str = "id";
pub const USER_ID: &str = "userId";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const NAME: &str = "name";
pub const PHONE: &str = "phone";
