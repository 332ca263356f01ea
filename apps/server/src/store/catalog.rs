use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use super::Store;
use crate::error::BookingError;
use crate::models::Service;
use crate::repository::ServiceCatalog;

#[async_trait]
impl ServiceCatalog for Store {
    async fn find_active(&self, ids: &[i64]) -> Result<Vec<Service>, BookingError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM services WHERE is_active = 1 AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let services = builder
            .build_query_as::<Service>()
            .fetch_all(&self.pool)
            .await?;
        Ok(services)
    }

    async fn list_active(&self) -> Result<Vec<Service>, BookingError> {
        let services =
            sqlx::query_as::<_, Service>("SELECT * FROM services WHERE is_active = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(services)
    }
}
