//! Record store for disasters, resources, reports and the verification log.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relief_core::{
    Disaster, DisasterQuery, EntityId, EntityType, ImageVerification, Report, ReliefError,
    ReliefResult, Resource, StorageError, VerificationRecord, VerificationStatus,
};
use tokio::sync::RwLock;

/// Async record store.
///
/// Lookups return `Ok(None)` for absence; mutations of an absent record
/// return [`StorageError::NotFound`] so callers can tell it apart from a
/// failed round-trip.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    // ========================================================================
    // DISASTER OPERATIONS
    // ========================================================================

    /// Disasters matching the query, newest first, paged.
    async fn disaster_list(&self, query: &DisasterQuery) -> ReliefResult<Vec<Disaster>>;

    async fn disaster_get(&self, id: EntityId) -> ReliefResult<Option<Disaster>>;

    async fn disaster_insert(&self, d: &Disaster) -> ReliefResult<()>;

    /// Replace the stored row. The caller supplies the full audit trail.
    ///
    /// The write only lands while the stored trail still holds
    /// `expected_trail_len` entries; otherwise it fails with
    /// [`StorageError::Conflict`] and the caller re-reads.
    async fn disaster_update(&self, d: &Disaster, expected_trail_len: usize) -> ReliefResult<()>;

    /// Delete the disaster together with its resources, reports and
    /// verification rows.
    async fn disaster_delete(&self, id: EntityId) -> ReliefResult<()>;

    // ========================================================================
    // RESOURCE OPERATIONS
    // ========================================================================

    async fn resource_insert(&self, r: &Resource) -> ReliefResult<()>;

    async fn resource_list_by_disaster(&self, disaster_id: EntityId) -> ReliefResult<Vec<Resource>>;

    /// Every resource, optionally restricted to one type.
    async fn resource_list(&self, resource_type: Option<&str>) -> ReliefResult<Vec<Resource>>;

    // ========================================================================
    // REPORT OPERATIONS
    // ========================================================================

    async fn report_insert(&self, r: &Report) -> ReliefResult<()>;

    async fn report_get(&self, id: EntityId) -> ReliefResult<Option<Report>>;

    async fn report_list_by_disaster(&self, disaster_id: EntityId) -> ReliefResult<Vec<Report>>;

    async fn report_update_verification(
        &self,
        id: EntityId,
        status: VerificationStatus,
        details: &ImageVerification,
    ) -> ReliefResult<()>;

    // ========================================================================
    // VERIFICATION LOG
    // ========================================================================

    async fn verification_insert(&self, v: &VerificationRecord) -> ReliefResult<()>;

    async fn verification_list_by_disaster(
        &self,
        disaster_id: EntityId,
    ) -> ReliefResult<Vec<VerificationRecord>>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
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

fn already_exists(entity_type: EntityType) -> ReliefError {
    ReliefError::Storage(StorageError::InsertFailed {
        entity_type,
        reason: "already exists".to_string(),
    })
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    disasters: HashMap<EntityId, Disaster>,
    resources: HashMap<EntityId, Resource>,
    reports: HashMap<EntityId, Report>,
    verifications: HashMap<EntityId, VerificationRecord>,
}

/// In-process record store. One lock over all tables keeps the cascading
/// delete atomic. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn disaster_count(&self) -> usize {
        self.tables.read().await.disasters.len()
    }

    pub async fn resource_count(&self) -> usize {
        self.tables.read().await.resources.len()
    }

    pub async fn report_count(&self) -> usize {
        self.tables.read().await.reports.len()
    }

    pub async fn verification_count(&self) -> usize {
        self.tables.read().await.verifications.len()
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> relief_core::Timestamp) -> Vec<T> {
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn disaster_list(&self, query: &DisasterQuery) -> ReliefResult<Vec<Disaster>> {
        let tables = self.tables.read().await;
        let matching: Vec<Disaster> = tables
            .disasters
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        Ok(newest_first(matching, |d| d.created_at)
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .collect())
    }

    async fn disaster_get(&self, id: EntityId) -> ReliefResult<Option<Disaster>> {
        Ok(self.tables.read().await.disasters.get(&id).cloned())
    }

    async fn disaster_insert(&self, d: &Disaster) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        if tables.disasters.contains_key(&d.id) {
            return Err(already_exists(EntityType::Disaster));
        }
        tables.disasters.insert(d.id, d.clone());
        Ok(())
    }

    async fn disaster_update(&self, d: &Disaster, expected_trail_len: usize) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .disasters
            .get_mut(&d.id)
            .ok_or_else(|| not_found(EntityType::Disaster, d.id))?;
        if slot.audit_trail.len() != expected_trail_len {
            return Err(conflict(EntityType::Disaster, d.id));
        }
        *slot = d.clone();
        Ok(())
    }

    async fn disaster_delete(&self, id: EntityId) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        if tables.disasters.remove(&id).is_none() {
            return Err(not_found(EntityType::Disaster, id));
        }
        tables.resources.retain(|_, r| r.disaster_id != id);
        tables.reports.retain(|_, r| r.disaster_id != id);
        tables.verifications.retain(|_, v| v.disaster_id != id);
        Ok(())
    }

    async fn resource_insert(&self, r: &Resource) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.disasters.contains_key(&r.disaster_id) {
            return Err(not_found(EntityType::Disaster, r.disaster_id));
        }
        if tables.resources.contains_key(&r.id) {
            return Err(already_exists(EntityType::Resource));
        }
        tables.resources.insert(r.id, r.clone());
        Ok(())
    }

    async fn resource_list_by_disaster(
        &self,
        disaster_id: EntityId,
    ) -> ReliefResult<Vec<Resource>> {
        let tables = self.tables.read().await;
        let rows: Vec<Resource> = tables
            .resources
            .values()
            .filter(|r| r.disaster_id == disaster_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    async fn resource_list(&self, resource_type: Option<&str>) -> ReliefResult<Vec<Resource>> {
        let tables = self.tables.read().await;
        let rows: Vec<Resource> = tables
            .resources
            .values()
            .filter(|r| resource_type.map_or(true, |t| r.resource_type == t))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    async fn report_insert(&self, r: &Report) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.disasters.contains_key(&r.disaster_id) {
            return Err(not_found(EntityType::Disaster, r.disaster_id));
        }
        if tables.reports.contains_key(&r.id) {
            return Err(already_exists(EntityType::Report));
        }
        tables.reports.insert(r.id, r.clone());
        Ok(())
    }

    async fn report_get(&self, id: EntityId) -> ReliefResult<Option<Report>> {
        Ok(self.tables.read().await.reports.get(&id).cloned())
    }

    async fn report_list_by_disaster(&self, disaster_id: EntityId) -> ReliefResult<Vec<Report>> {
        let tables = self.tables.read().await;
        let rows: Vec<Report> = tables
            .reports
            .values()
            .filter(|r| r.disaster_id == disaster_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    async fn report_update_verification(
        &self,
        id: EntityId,
        status: VerificationStatus,
        details: &ImageVerification,
    ) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        let report = tables
            .reports
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityType::Report, id))?;
        report.verification_status = status;
        report.verification_details = Some(details.clone());
        Ok(())
    }

    async fn verification_insert(&self, v: &VerificationRecord) -> ReliefResult<()> {
        let mut tables = self.tables.write().await;
        if tables.verifications.contains_key(&v.id) {
            return Err(already_exists(EntityType::Verification));
        }
        tables.verifications.insert(v.id, v.clone());
        Ok(())
    }

    async fn verification_list_by_disaster(
        &self,
        disaster_id: EntityId,
    ) -> ReliefResult<Vec<VerificationRecord>> {
        let tables = self.tables.read().await;
        let rows: Vec<VerificationRecord> = tables
            .verifications
            .values()
            .filter(|v| v.disaster_id == disaster_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |v| v.created_at))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
