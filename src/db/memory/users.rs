use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{UserRepo, check_username},
    },
    models::User,
};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn get_or_create(&self, username: &str) -> DbResult<User> {
        check_username(username)?;
        let mut users = self.users.write().await;
        let user = users.entry(username.to_string()).or_insert_with(|| User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: Utc::now(),
        });
        Ok(user.clone())
    }
}
