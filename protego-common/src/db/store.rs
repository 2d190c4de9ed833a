//! SQLite implementation of [`Store`]

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::init::{init_database, init_memory_database};
use super::retry::retry_on_lock;
use super::Store;
use crate::config::DatabaseConfig;
use crate::models::{
    AnalysisBatch, AnalysisOutput, AnalysisType, Cursor, NewScrapedRecord, OutputWrite,
    ScrapedRecord, SourceType,
};
use crate::{time, Result, StoreError, StoreResult};

const RECORD_COLUMNS: &str = "id, source_type, external_id, title, link, payload, scraped_at";

/// Store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    query_timeout: Duration,
    lock_wait: Duration,
}

impl SqliteStore {
    /// Open (or create) the configured database file
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = init_database(config).await?;
        Ok(Self::from_pool(pool, config))
    }

    /// Fresh private database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let pool = init_memory_database().await?;
        Ok(Self::from_pool(pool, &DatabaseConfig::default()))
    }

    pub fn from_pool(pool: SqlitePool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            query_timeout: config.query_timeout(),
            lock_wait: config.lock_wait(),
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.query_timeout,
            }),
        }
    }

    async fn try_insert_record(&self, record: &NewScrapedRecord) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO scraped_records (id, source_type, external_id, title, link, payload, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(record.source_type.as_str())
        .bind(&record.external_id)
        .bind(&record.title)
        .bind(&record.link)
        .bind(record.payload.to_string())
        .bind(time::to_db(&record.scraped_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => StoreError::DuplicateKey {
                source_type: record.source_type,
                external_id: record.external_id.clone(),
            },
            _ => StoreError::Database(e),
        })?;

        Ok(id)
    }

    async fn try_write_outputs(
        &self,
        scraped_record_id: Uuid,
        batch: &AnalysisBatch,
    ) -> StoreResult<OutputWrite> {
        let record_id = scraped_record_id.to_string();
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM scraped_records WHERE id = ?")
            .bind(&record_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            // Dropping the transaction rolls it back
            return Err(StoreError::Referential { scraped_record_id });
        }

        let created_at = time::to_db(&time::now());
        let mut write = OutputWrite::default();

        for output in &batch.outputs {
            let result = sqlx::query(
                r#"
                INSERT INTO analysis_outputs (id, scraped_record_id, analysis_type, keyword, frequency, metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (scraped_record_id, analysis_type, keyword) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record_id)
            .bind(output.analysis_type.as_str())
            .bind(&output.keyword)
            .bind(output.frequency)
            .bind(output.metadata.to_string())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                write.skipped += 1;
            } else {
                write.inserted += 1;
            }
        }

        let completed: BTreeSet<AnalysisType> = batch
            .analysis_types
            .iter()
            .copied()
            .chain(batch.outputs.iter().map(|o| o.analysis_type))
            .collect();

        for analysis_type in completed {
            sqlx::query(
                r#"
                INSERT INTO analysis_passes (scraped_record_id, analysis_type, completed_at)
                VALUES (?, ?, ?)
                ON CONFLICT (scraped_record_id, analysis_type) DO UPDATE SET completed_at = excluded.completed_at
                "#,
            )
            .bind(&record_id)
            .bind(analysis_type.as_str())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            scraped_record_id = %scraped_record_id,
            inserted = write.inserted,
            skipped = write.skipped,
            "Stored analysis outputs"
        );

        Ok(write)
    }
}

fn push_type_list(qb: &mut QueryBuilder<'_, Sqlite>, analysis_types: &[AnalysisType]) {
    qb.push("(");
    let mut list = qb.separated(", ");
    for analysis_type in analysis_types {
        list.push_bind(analysis_type.as_str());
    }
    list.push_unseparated(")");
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("Invalid id '{}': {}", value, e)))
}

fn parse_json(value: &str) -> StoreResult<serde_json::Value> {
    serde_json::from_str(value).map_err(|e| StoreError::Corrupt(format!("Invalid JSON: {}", e)))
}

fn record_from_row(row: &SqliteRow) -> StoreResult<ScrapedRecord> {
    let id: String = row.try_get("id")?;
    let source_type: String = row.try_get("source_type")?;
    let payload: String = row.try_get("payload")?;
    let scraped_at: String = row.try_get("scraped_at")?;

    Ok(ScrapedRecord {
        id: parse_uuid(&id)?,
        source_type: source_type
            .parse::<SourceType>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        payload: parse_json(&payload)?,
        scraped_at: time::from_db(&scraped_at)?,
    })
}

fn output_from_row(row: &SqliteRow) -> StoreResult<AnalysisOutput> {
    let id: String = row.try_get("id")?;
    let scraped_record_id: String = row.try_get("scraped_record_id")?;
    let analysis_type: String = row.try_get("analysis_type")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(AnalysisOutput {
        id: parse_uuid(&id)?,
        scraped_record_id: parse_uuid(&scraped_record_id)?,
        analysis_type: analysis_type
            .parse::<AnalysisType>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        keyword: row.try_get("keyword")?,
        frequency: row.try_get("frequency")?,
        metadata: parse_json(&metadata)?,
        created_at: time::from_db(&created_at)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_by_external_id(
        &self,
        source_type: SourceType,
        external_id: &str,
    ) -> StoreResult<Option<ScrapedRecord>> {
        self.bounded("find_by_external_id", async {
            let sql = format!(
                "SELECT {} FROM scraped_records WHERE source_type = ? AND external_id = ?",
                RECORD_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(source_type.as_str())
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(record_from_row).transpose()
        })
        .await
    }

    async fn insert_scraped_record(&self, record: &NewScrapedRecord) -> StoreResult<Uuid> {
        let lock_wait = self.lock_wait;
        self.bounded(
            "insert_scraped_record",
            retry_on_lock("insert_scraped_record", lock_wait, move || {
                self.try_insert_record(record)
            }),
        )
        .await
    }

    async fn get_scraped_record(&self, id: Uuid) -> StoreResult<Option<ScrapedRecord>> {
        self.bounded("get_scraped_record", async {
            let sql = format!("SELECT {} FROM scraped_records WHERE id = ?", RECORD_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(record_from_row).transpose()
        })
        .await
    }

    async fn select_unprocessed(
        &self,
        analysis_types: &[AnalysisType],
        batch_size: usize,
        cursor: Option<&Cursor>,
    ) -> StoreResult<(Vec<ScrapedRecord>, Option<Cursor>)> {
        if analysis_types.is_empty() {
            return Err(StoreError::InvalidArgument(
                "analysis_types must not be empty".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "batch_size must be > 0".to_string(),
            ));
        }

        self.bounded("select_unprocessed", async {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {} FROM scraped_records r WHERE NOT EXISTS \
                 (SELECT 1 FROM analysis_outputs o WHERE o.scraped_record_id = r.id AND o.analysis_type IN ",
                RECORD_COLUMNS
            ));
            push_type_list(&mut qb, analysis_types);
            qb.push(
                ") AND NOT EXISTS \
                 (SELECT 1 FROM analysis_passes p WHERE p.scraped_record_id = r.id AND p.analysis_type IN ",
            );
            push_type_list(&mut qb, analysis_types);
            qb.push(")");

            if let Some(cursor) = cursor {
                let at = time::to_db(&cursor.scraped_at);
                qb.push(" AND (r.scraped_at > ")
                    .push_bind(at.clone())
                    .push(" OR (r.scraped_at = ")
                    .push_bind(at)
                    .push(" AND r.id > ")
                    .push_bind(cursor.id.to_string())
                    .push("))");
            }

            qb.push(" ORDER BY r.scraped_at ASC, r.id ASC LIMIT ")
                .push_bind(i64::try_from(batch_size).unwrap_or(i64::MAX));

            let rows = qb.build().fetch_all(&self.pool).await?;
            let records = rows
                .iter()
                .map(record_from_row)
                .collect::<StoreResult<Vec<_>>>()?;
            let next = records.last().map(ScrapedRecord::cursor);

            Ok((records, next))
        })
        .await
    }

    async fn insert_analysis_outputs(
        &self,
        scraped_record_id: Uuid,
        batch: &AnalysisBatch,
    ) -> StoreResult<OutputWrite> {
        let lock_wait = self.lock_wait;
        self.bounded(
            "insert_analysis_outputs",
            retry_on_lock("insert_analysis_outputs", lock_wait, move || {
                self.try_write_outputs(scraped_record_id, batch)
            }),
        )
        .await
    }

    async fn outputs_for_record(&self, scraped_record_id: Uuid) -> StoreResult<Vec<AnalysisOutput>> {
        self.bounded("outputs_for_record", async {
            let rows = sqlx::query(
                r#"
                SELECT id, scraped_record_id, analysis_type, keyword, frequency, metadata, created_at
                FROM analysis_outputs
                WHERE scraped_record_id = ?
                ORDER BY analysis_type, frequency DESC, keyword
                "#,
            )
            .bind(scraped_record_id.to_string())
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(output_from_row).collect()
        })
        .await
    }

    async fn count_scraped_records(&self) -> StoreResult<u64> {
        self.bounded("count_scraped_records", async {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scraped_records")
                .fetch_one(&self.pool)
                .await?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}
