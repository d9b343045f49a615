use async_trait::async_trait;

use crate::{
    db::error::{DbError, DbResult},
    models::User,
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>>;

    /// Return the user for `username`, creating it on first sight. Safe to
    /// call concurrently for the same username.
    async fn get_or_create(&self, username: &str) -> DbResult<User>;
}

/// Usernames come straight from CAS responses; reject the ones no backend
/// should store.
pub(crate) fn check_username(username: &str) -> DbResult<()> {
    if username.trim().is_empty() {
        return Err(DbError::Validation("username cannot be empty".into()));
    }
    if username.len() > 255 {
        return Err(DbError::Validation(
            "username exceeds 255 bytes".into(),
        ));
    }
    Ok(())
}
