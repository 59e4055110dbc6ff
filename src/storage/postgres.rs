use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use tracing::{debug, warn};
use url::Url;

use crate::cli::config::StorageSettings;
use crate::crawler::error::StoreError;
use crate::crawler::task::{ExtractedRecord, WorkItem};
use crate::storage::{BacklogPage, BacklogStore, ResultStore};

/// Rows per multi-row insert, keeps bind parameters well under the protocol limit
const BATCH_CHUNK_SIZE: usize = 1000;

/// PostgreSQL implementation of the backlog and result stores
pub struct PostgresStore {
    /// PostgreSQL connection pool
    pool: Pool<Postgres>,

    /// Schema name
    schema: String,

    /// Table holding the target pages
    backlog_table: String,

    /// Table receiving extracted records
    results_table: String,

    /// Whether backlog queries exclude rows that already have a result
    skip_collected: bool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and make sure the tables exist
    pub async fn connect(settings: &StorageSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.connection_string)
            .await?;

        let store = Self {
            pool,
            schema: settings.schema_name.clone(),
            backlog_table: settings.backlog_table.clone(),
            results_table: settings.results_table.clone(),
            skip_collected: settings.skip_collected,
        };

        store.ensure_schema().await?;

        debug!("Connected to PostgreSQL database");

        Ok(store)
    }

    /// Ensure the schema and both tables exist
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await?;

        let backlog = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id BIGSERIAL PRIMARY KEY,
                domain TEXT,
                url TEXT NOT NULL,
                name TEXT
            )",
            self.schema, self.backlog_table
        );
        sqlx::query(&backlog).execute(&self.pool).await?;

        let results = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id BIGSERIAL PRIMARY KEY,
                url_id BIGINT NOT NULL,
                product_id TEXT NOT NULL,
                title TEXT NOT NULL,
                image TEXT NOT NULL,
                price BIGINT NOT NULL,
                model_name TEXT NOT NULL,
                shipping_fee BIGINT NOT NULL,
                return_fee BIGINT NOT NULL,
                soldout BOOLEAN NOT NULL,
                crawled_at TIMESTAMPTZ NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            self.schema, self.results_table
        );
        sqlx::query(&results).execute(&self.pool).await?;

        debug!("Ensured tables exist in schema: {}", self.schema);

        Ok(())
    }

    fn page_query(&self) -> String {
        let filter = if self.skip_collected {
            format!(
                "WHERE NOT EXISTS (SELECT 1 FROM {schema}.{results} r WHERE r.url_id = u.id)",
                schema = self.schema,
                results = self.results_table
            )
        } else {
            String::new()
        };

        format!(
            "SELECT u.id::BIGINT, u.url, u.name FROM {}.{} u {} ORDER BY u.id ASC LIMIT $1 OFFSET $2",
            self.schema, self.backlog_table, filter
        )
    }

    fn insert_prefix(&self) -> String {
        format!(
            "INSERT INTO {}.{} (url_id, product_id, title, image, price, model_name, shipping_fee, return_fee, soldout, crawled_at) ",
            self.schema, self.results_table
        )
    }
}

/// Turn a backlog row into a work item
fn row_to_item(id: i64, url: &str, name: Option<String>) -> Result<WorkItem, StoreError> {
    let target = Url::parse(url).map_err(|e| StoreError::InvalidRow {
        id,
        reason: format!("bad url {:?}: {}", url, e),
    })?;

    Ok(WorkItem {
        id,
        target,
        source_label: name,
    })
}

#[async_trait]
impl BacklogStore for PostgresStore {
    async fn page(&self, offset: usize, limit: usize) -> Result<BacklogPage, StoreError> {
        let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as(&self.page_query())
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let fetched = rows.len();
        let mut items = Vec::with_capacity(fetched);
        for (id, url, name) in rows {
            match row_to_item(id, &url, name) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Dropping backlog row: {}", e),
            }
        }

        debug!("Fetched backlog page offset={} limit={} rows={}", offset, limit, fetched);

        Ok(BacklogPage { items, rows: fetched })
    }
}

#[async_trait]
impl ResultStore for PostgresStore {
    async fn insert(&self, record: &ExtractedRecord) -> Result<(), StoreError> {
        let query = format!(
            "{} VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.insert_prefix()
        );

        sqlx::query(&query)
            .bind(record.work_item_id)
            .bind(&record.product_id)
            .bind(&record.title)
            .bind(&record.image)
            .bind(record.price)
            .bind(&record.model_name)
            .bind(record.shipping_fee)
            .bind(record.return_fee)
            .bind(record.sold_out)
            .bind(record.captured_at)
            .execute(&self.pool)
            .await?;

        debug!("Stored record for work item: {}", record.work_item_id);

        Ok(())
    }

    async fn insert_batch(&self, records: &[ExtractedRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(BATCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(self.insert_prefix());
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.work_item_id)
                    .push_bind(record.product_id.clone())
                    .push_bind(record.title.clone())
                    .push_bind(record.image.clone())
                    .push_bind(record.price)
                    .push_bind(record.model_name.clone())
                    .push_bind(record.shipping_fee)
                    .push_bind(record.return_fee)
                    .push_bind(record.sold_out)
                    .push_bind(record.captured_at);
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!("Stored batch of {} records", records.len());

        Ok(())
    }
}
