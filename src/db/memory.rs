use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::Store;
use crate::models::{CreateItem, CreateUser, Item, User};

#[derive(Default)]
struct Tables {
    items: BTreeMap<i64, Item>,
    users: BTreeMap<i64, User>,
    next_item_id: i64,
    next_user_id: i64,
}

/// In-process store used when no database is configured
///
/// Each operation runs under one lock acquisition, which gives the same
/// single-statement atomicity as the PostgreSQL store. `set_available(false)`
/// makes every call fail with `Unavailable`.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> crate::Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(crate::TallyError::Unavailable(
                "memory store is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_item(&self, item: CreateItem) -> crate::Result<Item> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        tables.next_item_id += 1;
        let item = Item {
            id: tables.next_item_id,
            title: item.title,
            done: false,
        };
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn list_items(&self) -> crate::Result<Vec<Item>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.items.values().rev().cloned().collect())
    }

    async fn mark_item_done(&self, id: i64) -> crate::Result<Option<Item>> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        Ok(tables.items.get_mut(&id).map(|item| {
            item.done = true;
            item.clone()
        }))
    }

    async fn create_user(&self, user: CreateUser) -> crate::Result<User> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            name: user.name,
            email: user.email,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> crate::Result<Option<User>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn list_users(&self) -> crate::Result<Vec<User>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }
}
