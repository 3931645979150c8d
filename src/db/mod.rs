//! Persistence for items and users.
//!
//! Every mutation is a single statement (`INSERT … RETURNING`,
//! `UPDATE … RETURNING`), so concurrent callers never observe each
//! other's rows. Reads report an absent row as `None` or an empty `Vec`.
//! Store I/O failures are errors and are never turned into empty results.

pub mod memory;
pub mod pg;

use async_trait::async_trait;

use crate::models::{CreateItem, CreateUser, Item, User};

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert an item with `done = false`, returning the inserted row
    async fn create_item(&self, item: CreateItem) -> crate::Result<Item>;

    /// All items, newest (highest id) first
    async fn list_items(&self) -> crate::Result<Vec<Item>>;

    /// Set `done = true`; returns `None` when no item has this id
    async fn mark_item_done(&self, id: i64) -> crate::Result<Option<Item>>;

    /// Insert a user, returning the inserted row
    async fn create_user(&self, user: CreateUser) -> crate::Result<User>;

    async fn get_user(&self, id: i64) -> crate::Result<Option<User>>;

    /// All users, oldest (lowest id) first
    async fn list_users(&self) -> crate::Result<Vec<User>>;
}
