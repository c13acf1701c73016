mod access;
pub use access::{HasOwner, can_manage, check_access};

mod database;
pub use database::DbConnection;

pub mod entity;

mod error;
pub use error::{DatabaseError, DatabaseResult};

mod repo;
pub use repo::{CrudRepository, Page, PageRequest, PaginatableRepository, ResourceType, ResourceTyped};

use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone)]
pub struct ModelManager {
    database: DbConnection,
}

impl ModelManager {
    pub fn new(conn: DbConnection) -> Self {
        Self { database: conn }
    }

    pub fn executor(&self) -> &PgPool {
        self.database.pool()
    }

    /// Opens a transaction for read-modify-write sequences on a single row.
    pub async fn begin(&self) -> DatabaseResult<Transaction<'static, Postgres>> {
        Ok(self.database.pool().begin().await?)
    }
}
