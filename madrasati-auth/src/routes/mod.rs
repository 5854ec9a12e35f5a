pub mod health;
pub mod internal;
pub mod login;
pub mod logout;
pub mod me;
pub mod refresh;
pub mod register;

use serde::Serialize;

use madrasati_shared::types::auth::TokenPair;

use crate::models::UserView;

/// Body returned by register and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub tokens: TokenPair,
}
