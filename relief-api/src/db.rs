//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres, plus the Postgres
//! implementations of [`RecordStore`] and [`CacheStore`]. The schema lives
//! in `migrations/001_init.sql` and is applied by [`DbClient::migrate`].
//!
//! Coordinates are stored as `POINT(lng lat)` WKT text; distance filtering
//! happens in process.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use relief_core::{
    AuditTrail, CacheEntry, CacheError, Disaster, DisasterQuery, EntityId, EntityType, GeoPoint,
    ImageVerification, ReliefError, ReliefResult, Report, Resource, StorageError, Timestamp,
    VerificationRecord, VerificationStatus,
};
use relief_storage::{CacheStore, RecordStore};
use tokio_postgres::types::Json;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "relief".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("RELIEF_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("RELIEF_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("RELIEF_DB_NAME").unwrap_or_else(|_| "relief".to_string()),
            user: std::env::var("RELIEF_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("RELIEF_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("RELIEF_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("RELIEF_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Pool handle shared by the Postgres record store and cache store.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> ReliefResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            ReliefError::Storage(StorageError::Unavailable {
                reason: e.to_string(),
            })
        })
    }

    /// Apply the bundled schema. Every statement is idempotent.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }

    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

fn query_failed(entity_type: EntityType, e: tokio_postgres::Error) -> ReliefError {
    tracing::error!(collection = entity_type.collection(), error = %e, "Query failed");
    ReliefError::Storage(StorageError::QueryFailed {
        collection: entity_type.collection().to_string(),
        reason: e.to_string(),
    })
}

fn insert_failed(entity_type: EntityType, e: tokio_postgres::Error) -> ReliefError {
    tracing::error!(collection = entity_type.collection(), error = %e, "Insert failed");
    ReliefError::Storage(StorageError::InsertFailed {
        entity_type,
        reason: e.to_string(),
    })
}

fn update_failed(entity_type: EntityType, id: EntityId, e: tokio_postgres::Error) -> ReliefError {
    tracing::error!(collection = entity_type.collection(), id = %id, error = %e, "Update failed");
    ReliefError::Storage(StorageError::UpdateFailed {
        entity_type,
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn not_found(entity_type: EntityType, id: EntityId) -> ReliefError {
    ReliefError::Storage(StorageError::NotFound {
        entity_type,
        id: id.to_string(),
    })
}

fn conflict(entity_type: EntityType, id: EntityId) -> ReliefError {
    ReliefError::Storage(StorageError::Conflict {
        entity_type,
        id: id.to_string(),
    })
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn point_from(row: &Row, column: &str) -> Result<Option<GeoPoint>, tokio_postgres::Error> {
    let wkt: Option<String> = row.try_get(column)?;
    Ok(wkt.as_deref().and_then(GeoPoint::from_wkt))
}

fn parse_status(s: &str) -> VerificationStatus {
    match s {
        "analyzed" => VerificationStatus::Analyzed,
        "error" => VerificationStatus::Error,
        _ => VerificationStatus::Pending,
    }
}

fn disaster_from_row(row: &Row) -> Result<Disaster, tokio_postgres::Error> {
    let Json(audit_trail): Json<AuditTrail> = row.try_get("audit_trail")?;
    Ok(Disaster {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        location_name: row.try_get("location_name")?,
        location: point_from(row, "location")?,
        description: row.try_get("description")?,
        tags: row.try_get("tags")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        audit_trail,
    })
}

fn resource_from_row(row: &Row) -> Result<Resource, tokio_postgres::Error> {
    Ok(Resource {
        id: row.try_get("id")?,
        disaster_id: row.try_get("disaster_id")?,
        name: row.try_get("name")?,
        location_name: row.try_get("location_name")?,
        location: point_from(row, "location")?,
        resource_type: row.try_get("type")?,
        description: row.try_get("description")?,
        capacity: row.try_get("capacity")?,
        contact_info: row.try_get("contact_info")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn report_from_row(row: &Row) -> Result<Report, tokio_postgres::Error> {
    let status: String = row.try_get("verification_status")?;
    let details: Option<Json<ImageVerification>> = row.try_get("verification_details")?;
    Ok(Report {
        id: row.try_get("id")?,
        disaster_id: row.try_get("disaster_id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        image_url: row.try_get("image_url")?,
        verification_status: parse_status(&status),
        verification_details: details.map(|Json(d)| d),
        created_at: row.try_get("created_at")?,
    })
}

fn verification_from_row(row: &Row) -> Result<VerificationRecord, tokio_postgres::Error> {
    let Json(verification_result): Json<ImageVerification> = row.try_get("verification_result")?;
    Ok(VerificationRecord {
        id: row.try_get("id")?,
        disaster_id: row.try_get("disaster_id")?,
        report_id: row.try_get("report_id")?,
        image_url: row.try_get("image_url")?,
        verification_result,
        verified_by: row.try_get("verified_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_rows<T>(
    rows: &[Row],
    entity_type: EntityType,
    f: fn(&Row) -> Result<T, tokio_postgres::Error>,
) -> ReliefResult<Vec<T>> {
    rows.iter()
        .map(|row| f(row).map_err(|e| query_failed(entity_type, e)))
        .collect()
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Postgres-backed [`RecordStore`]. Disaster deletion cascades through the
/// foreign keys.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    db: DbClient,
}

impl PgRecordStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

const DISASTER_COLUMNS: &str = "id, title, location_name, location, description, tags, owner_id, \
                                created_at, updated_at, audit_trail";
const RESOURCE_COLUMNS: &str = "id, disaster_id, name, location_name, location, type, description, \
                                capacity, contact_info, created_by, created_at";
const REPORT_COLUMNS: &str = "id, disaster_id, user_id, content, image_url, verification_status, \
                              verification_details, created_at";
const VERIFICATION_COLUMNS: &str = "id, disaster_id, report_id, image_url, verification_result, \
                                    verified_by, created_at";

#[async_trait]
impl RecordStore for PgRecordStore {
    // ========================================================================
    // DISASTER OPERATIONS
    // ========================================================================

    async fn disaster_list(&self, query: &DisasterQuery) -> ReliefResult<Vec<Disaster>> {
        let conn = self.db.get_conn().await?;
        let limit = query.limit() as i64;
        let offset = query.offset() as i64;
        let sql = format!(
            "SELECT {DISASTER_COLUMNS} FROM disasters \
             WHERE ($1::text IS NULL OR $1 = ANY(tags)) \
               AND ($2::text IS NULL OR owner_id = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = conn
            .query(&sql, &[&query.tag, &query.owner_id, &limit, &offset])
            .await
            .map_err(|e| query_failed(EntityType::Disaster, e))?;
        map_rows(&rows, EntityType::Disaster, disaster_from_row)
    }

    async fn disaster_get(&self, id: EntityId) -> ReliefResult<Option<Disaster>> {
        let conn = self.db.get_conn().await?;
        let sql = format!("SELECT {DISASTER_COLUMNS} FROM disasters WHERE id = $1");
        let row = conn
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| query_failed(EntityType::Disaster, e))?;
        row.as_ref()
            .map(disaster_from_row)
            .transpose()
            .map_err(|e| query_failed(EntityType::Disaster, e))
    }

    async fn disaster_insert(&self, d: &Disaster) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let location = d.location.map(|p| p.to_wkt());
        conn.execute(
            "INSERT INTO disasters (id, title, location_name, location, description, tags, \
             owner_id, created_at, updated_at, audit_trail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &d.id,
                &d.title,
                &d.location_name,
                &location,
                &d.description,
                &d.tags,
                &d.owner_id,
                &d.created_at,
                &d.updated_at,
                &Json(&d.audit_trail),
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::Disaster, e))?;
        Ok(())
    }

    async fn disaster_update(&self, d: &Disaster, expected_trail_len: usize) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let location = d.location.map(|p| p.to_wkt());
        let expected = i32::try_from(expected_trail_len).map_err(|e| {
            ReliefError::Storage(StorageError::UpdateFailed {
                entity_type: EntityType::Disaster,
                id: d.id.to_string(),
                reason: e.to_string(),
            })
        })?;
        let updated = conn
            .execute(
                "UPDATE disasters SET title = $2, location_name = $3, location = $4, \
                 description = $5, tags = $6, updated_at = $7, audit_trail = $8 \
                 WHERE id = $1 AND jsonb_array_length(audit_trail) = $9",
                &[
                    &d.id,
                    &d.title,
                    &d.location_name,
                    &location,
                    &d.description,
                    &d.tags,
                    &d.updated_at,
                    &Json(&d.audit_trail),
                    &expected,
                ],
            )
            .await
            .map_err(|e| update_failed(EntityType::Disaster, d.id, e))?;
        if updated > 0 {
            return Ok(());
        }
        // Nothing matched: either the row is gone or its trail moved on.
        let exists = conn
            .query_opt("SELECT 1 FROM disasters WHERE id = $1", &[&d.id])
            .await
            .map_err(|e| query_failed(EntityType::Disaster, e))?;
        Err(match exists {
            Some(_) => conflict(EntityType::Disaster, d.id),
            None => not_found(EntityType::Disaster, d.id),
        })
    }

    async fn disaster_delete(&self, id: EntityId) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM disasters WHERE id = $1", &[&id])
            .await
            .map_err(|e| {
                ReliefError::Storage(StorageError::DeleteFailed {
                    entity_type: EntityType::Disaster,
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            })?;
        if deleted == 0 {
            return Err(not_found(EntityType::Disaster, id));
        }
        Ok(())
    }

    // ========================================================================
    // RESOURCE OPERATIONS
    // ========================================================================

    async fn resource_insert(&self, r: &Resource) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let location = r.location.map(|p| p.to_wkt());
        conn.execute(
            "INSERT INTO resources (id, disaster_id, name, location_name, location, type, \
             description, capacity, contact_info, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &r.id,
                &r.disaster_id,
                &r.name,
                &r.location_name,
                &location,
                &r.resource_type,
                &r.description,
                &r.capacity,
                &r.contact_info,
                &r.created_by,
                &r.created_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::Resource, e))?;
        Ok(())
    }

    async fn resource_list_by_disaster(
        &self,
        disaster_id: EntityId,
    ) -> ReliefResult<Vec<Resource>> {
        let conn = self.db.get_conn().await?;
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE disaster_id = $1 \
             ORDER BY created_at DESC"
        );
        let rows = conn
            .query(&sql, &[&disaster_id])
            .await
            .map_err(|e| query_failed(EntityType::Resource, e))?;
        map_rows(&rows, EntityType::Resource, resource_from_row)
    }

    async fn resource_list(&self, resource_type: Option<&str>) -> ReliefResult<Vec<Resource>> {
        let conn = self.db.get_conn().await?;
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources \
             WHERE ($1::text IS NULL OR type = $1) ORDER BY created_at DESC"
        );
        let rows = conn
            .query(&sql, &[&resource_type])
            .await
            .map_err(|e| query_failed(EntityType::Resource, e))?;
        map_rows(&rows, EntityType::Resource, resource_from_row)
    }

    // ========================================================================
    // REPORT OPERATIONS
    // ========================================================================

    async fn report_insert(&self, r: &Report) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let details = r.verification_details.as_ref().map(Json);
        conn.execute(
            "INSERT INTO reports (id, disaster_id, user_id, content, image_url, \
             verification_status, verification_details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &r.id,
                &r.disaster_id,
                &r.user_id,
                &r.content,
                &r.image_url,
                &r.verification_status.as_str(),
                &details,
                &r.created_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::Report, e))?;
        Ok(())
    }

    async fn report_get(&self, id: EntityId) -> ReliefResult<Option<Report>> {
        let conn = self.db.get_conn().await?;
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
        let row = conn
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| query_failed(EntityType::Report, e))?;
        row.as_ref()
            .map(report_from_row)
            .transpose()
            .map_err(|e| query_failed(EntityType::Report, e))
    }

    async fn report_list_by_disaster(&self, disaster_id: EntityId) -> ReliefResult<Vec<Report>> {
        let conn = self.db.get_conn().await?;
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE disaster_id = $1 ORDER BY created_at DESC"
        );
        let rows = conn
            .query(&sql, &[&disaster_id])
            .await
            .map_err(|e| query_failed(EntityType::Report, e))?;
        map_rows(&rows, EntityType::Report, report_from_row)
    }

    async fn report_update_verification(
        &self,
        id: EntityId,
        status: VerificationStatus,
        details: &ImageVerification,
    ) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE reports SET verification_status = $2, verification_details = $3 \
                 WHERE id = $1",
                &[&id, &status.as_str(), &Json(details)],
            )
            .await
            .map_err(|e| update_failed(EntityType::Report, id, e))?;
        if updated == 0 {
            return Err(not_found(EntityType::Report, id));
        }
        Ok(())
    }

    // ========================================================================
    // VERIFICATION LOG
    // ========================================================================

    async fn verification_insert(&self, v: &VerificationRecord) -> ReliefResult<()> {
        let conn = self.db.get_conn().await?;
        conn.execute(
            "INSERT INTO verification_log (id, disaster_id, report_id, image_url, \
             verification_result, verified_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &v.id,
                &v.disaster_id,
                &v.report_id,
                &v.image_url,
                &Json(&v.verification_result),
                &v.verified_by,
                &v.created_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::Verification, e))?;
        Ok(())
    }

    async fn verification_list_by_disaster(
        &self,
        disaster_id: EntityId,
    ) -> ReliefResult<Vec<VerificationRecord>> {
        let conn = self.db.get_conn().await?;
        let sql = format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verification_log \
             WHERE disaster_id = $1 ORDER BY created_at DESC"
        );
        let rows = conn
            .query(&sql, &[&disaster_id])
            .await
            .map_err(|e| query_failed(EntityType::Verification, e))?;
        map_rows(&rows, EntityType::Verification, verification_from_row)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

// ============================================================================
// CACHE STORE
// ============================================================================

/// Postgres-backed [`CacheStore`] over the `cache` table.
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    db: DbClient,
}

impl PgCacheStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    async fn conn(&self) -> ReliefResult<deadpool_postgres::Object> {
        self.db.pool.get().await.map_err(|e| {
            ReliefError::Cache(CacheError::Unavailable {
                reason: e.to_string(),
            })
        })
    }
}

fn cache_txn(e: tokio_postgres::Error) -> ReliefError {
    ReliefError::Cache(CacheError::Transaction {
        reason: e.to_string(),
    })
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn load(&self, key: &str) -> ReliefResult<Option<CacheEntry>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT key, value, expires_at FROM cache WHERE key = $1", &[&key])
            .await
            .map_err(cache_txn)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(CacheEntry {
            key: row.try_get("key").map_err(cache_txn)?,
            value: row.try_get("value").map_err(cache_txn)?,
            expires_at: row.try_get("expires_at").map_err(cache_txn)?,
        }))
    }

    async fn upsert(&self, entry: &CacheEntry) -> ReliefResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO cache (key, value, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
            &[&entry.key, &entry.value, &entry.expires_at],
        )
        .await
        .map_err(cache_txn)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> ReliefResult<()> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM cache WHERE key = $1", &[&key])
            .await
            .map_err(cache_txn)?;
        Ok(())
    }

    async fn remove_expired(&self, now: Timestamp) -> ReliefResult<u64> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM cache WHERE expires_at < $1", &[&now])
            .await
            .map_err(cache_txn)
    }

    async fn len(&self) -> ReliefResult<u64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM cache", &[])
            .await
            .map_err(cache_txn)?;
        let count: i64 = row.try_get(0).map_err(cache_txn)?;
        Ok(count.max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "relief");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_parse_status_defaults_to_pending() {
        assert_eq!(parse_status("analyzed"), VerificationStatus::Analyzed);
        assert_eq!(parse_status("error"), VerificationStatus::Error);
        assert_eq!(parse_status("???"), VerificationStatus::Pending);
    }

    #[test]
    fn test_schema_creates_every_collection() {
        for table in ["disasters", "resources", "reports", "verification_log", "cache"] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
        assert!(SCHEMA.contains("ON DELETE CASCADE"));
    }
}
