use async_trait::async_trait;
use conservator::{Executor, Migrator, PooledConnection};
use std::sync::Arc;
use tokio_postgres::Row;

use super::Store;
use crate::models::{CreateItem, CreateUser, Item, User};

/// PostgreSQL store for items and users
pub struct PgStore {
    pool: Arc<PooledConnection>,
}

impl PgStore {
    /// Create a new store over a fresh connection pool
    pub fn new(database_url: &str) -> crate::Result<Self> {
        let pool =
            PooledConnection::from_url(database_url).map_err(crate::TallyError::Database)?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Shared pool, for the event bus tables living in the same database
    pub fn pool(&self) -> Arc<PooledConnection> {
        self.pool.clone()
    }

    /// Run database migrations
    pub async fn migrate(&self) -> crate::Result<()> {
        let migrator = Migrator::from_path("./migrations")?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        migrator.run(&mut conn).await?;

        tracing::info!("Migrations completed successfully");
        Ok(())
    }
}

fn item_from_row(row: &Row) -> Item {
    Item {
        id: row.get("id"),
        title: row.get("title"),
        done: row.get("done"),
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_item(&self, item: CreateItem) -> crate::Result<Item> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let row = conn
            .query_one(
                r#"
                INSERT INTO item (title, done)
                VALUES ($1, false)
                RETURNING id, title, done
                "#,
                &[&item.title],
            )
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(item_from_row(&row))
    }

    async fn list_items(&self) -> crate::Result<Vec<Item>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let rows = conn
            .query("SELECT id, title, done FROM item ORDER BY id DESC", &[])
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(rows.iter().map(item_from_row).collect())
    }

    async fn mark_item_done(&self, id: i64) -> crate::Result<Option<Item>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let rows = conn
            .query(
                r#"
                UPDATE item
                SET done = true
                WHERE id = $1
                RETURNING id, title, done
                "#,
                &[&id],
            )
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(rows.first().map(item_from_row))
    }

    async fn create_user(&self, user: CreateUser) -> crate::Result<User> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let row = conn
            .query_one(
                r#"
                INSERT INTO users (name, email)
                VALUES ($1, $2)
                RETURNING id, name, email
                "#,
                &[&user.name, &user.email],
            )
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(user_from_row(&row))
    }

    async fn get_user(&self, id: i64) -> crate::Result<Option<User>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let rows = conn
            .query("SELECT id, name, email FROM users WHERE id = $1", &[&id])
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(rows.first().map(user_from_row))
    }

    async fn list_users(&self) -> crate::Result<Vec<User>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(crate::TallyError::Database)?;

        let rows = conn
            .query("SELECT id, name, email FROM users ORDER BY id ASC", &[])
            .await
            .map_err(crate::TallyError::Database)?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_store_trait() {
        // Compile-time check that PgStore implements Store
        fn _assert_impl<T: Store>() {}
        _assert_impl::<PgStore>();
    }
}
