use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::types::Json;

/// A record as the store keeps it: a name unique within its kind, and flat
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub name: String,
    pub attributes: serde_json::Value,
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record, or replace the attributes of the record that has
    /// the same kind and name.
    async fn put(
        &self,
        kind: &str,
        name: &str,
        attributes: serde_json::Value,
    ) -> anyhow::Result<()>;

    /// All records of a kind, in the order the store returns them.
    async fn query_all(&self, kind: &str) -> anyhow::Result<Vec<StoredRecord>>;
}

/// A typed record stored under a fixed kind.
pub trait RecordKind: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn name(&self) -> &str;
}

/// The joy detected in an uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub blob_name: String,
    pub image_public_url: String,
    pub timestamp: DateTime<Utc>,
    pub joy: String,
}

impl RecordKind for FaceRecord {
    const KIND: &'static str = "Faces";

    fn name(&self) -> &str {
        &self.blob_name
    }
}

/// The sentiment of an uploaded text document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub blob_name: String,
    /// The public URL of the text object; the attribute name is shared with
    /// the Faces records.
    pub image_public_url: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment: f32,
}

impl RecordKind for SentimentRecord {
    const KIND: &'static str = "sentiment";

    fn name(&self) -> &str {
        &self.blob_name
    }
}

#[tracing::instrument(skip_all, fields(kind = R::KIND, name = record.name()))]
pub async fn put_record<R: RecordKind>(store: &dyn RecordStore, record: &R) -> anyhow::Result<()> {
    let attributes = serde_json::to_value(record).context("Failed to serialize the record")?;

    store.put(R::KIND, record.name(), attributes).await?;
    tracing::info!("Saved the record");

    Ok(())
}

pub async fn query_records<R: RecordKind>(store: &dyn RecordStore) -> anyhow::Result<Vec<R>> {
    store
        .query_all(R::KIND)
        .await?
        .into_iter()
        .map(|record| {
            serde_json::from_value(record.attributes)
                .with_context(|| format!("Malformed {} record {}", R::KIND, record.name))
        })
        .collect()
}

/// Records kept in the `records` table of PostgreSQL.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: sqlx::PgPool,
}

impl PgRecordStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::PgPool::connect(url)
            .await
            .context("Failed to connect to the record store")?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RecordStore for PgRecordStore {
    #[tracing::instrument(skip(self, attributes))]
    async fn put(
        &self,
        kind: &str,
        name: &str,
        attributes: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (kind, name, attributes)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, name) DO UPDATE SET attributes = EXCLUDED.attributes
            "#,
        )
        .bind(kind)
        .bind(name)
        .bind(Json(attributes))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save {kind} record {name}"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn query_all(&self, kind: &str) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query_as::<_, (String, Json<serde_json::Value>)>(
            r#"
            SELECT name, attributes FROM records WHERE kind = $1
            "#,
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to query {kind} records"))?;

        Ok(rows
            .into_iter()
            .map(|(name, Json(attributes))| StoredRecord { name, attributes })
            .collect())
    }
}
