use crate::db_storage::ApplicantRecordStore;
use crate::errors::AppError;
use crate::models::{
    CustomerStatus, EvaluationRecord, NewRecord, RecordPatch, SchemeRow, TitleOwnership,
};
use crate::scheme::{self, SchemeFilter};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    records: HashMap<Uuid, EvaluationRecord>,
    clusters: HashMap<(String, CustomerStatus, TitleOwnership), String>,
    schemes: Vec<SchemeRow>,
    dummy_bureau: HashMap<String, Value>,
}

/// In-process store with the same semantics as `PgRecordStore`.
/// Used by tests and local runs without a database.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalError("record store lock poisoned".to_string()))
    }

    pub fn insert_cluster(
        &self,
        branch_id: &str,
        status: CustomerStatus,
        title: TitleOwnership,
        cluster: &str,
    ) -> Result<(), AppError> {
        self.lock()?
            .clusters
            .insert((branch_id.to_string(), status, title), cluster.to_string());
        Ok(())
    }

    pub fn insert_scheme(&self, row: SchemeRow) -> Result<(), AppError> {
        self.lock()?.schemes.push(row);
        Ok(())
    }

    pub fn insert_dummy_bureau(&self, id_number: &str, payload: Value) -> Result<(), AppError> {
        self.lock()?
            .dummy_bureau
            .insert(id_number.to_string(), payload);
        Ok(())
    }

    pub fn record_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.records.len())
    }

    /// Snapshot of every stored record, in no particular order.
    pub fn records(&self) -> Result<Vec<EvaluationRecord>, AppError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }
}

#[async_trait]
impl ApplicantRecordStore for MemoryRecordStore {
    async fn create(&self, record: NewRecord) -> Result<Uuid, AppError> {
        let mut tables = self.lock()?;
        let request_id = record.request_id;
        if tables.records.contains_key(&request_id) {
            return Err(AppError::InternalError(format!(
                "duplicate request id {}",
                request_id
            )));
        }
        tables
            .records
            .insert(request_id, EvaluationRecord::new(record));
        Ok(request_id)
    }

    async fn update(&self, request_id: Uuid, patch: RecordPatch) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        let record = tables
            .records
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("record {}", request_id)))?;
        record.apply(patch);
        Ok(())
    }

    async fn find(&self, request_id: Uuid) -> Result<Option<EvaluationRecord>, AppError> {
        Ok(self.lock()?.records.get(&request_id).cloned())
    }

    async fn find_cluster_branch(
        &self,
        branch_id: &str,
        status: CustomerStatus,
        title: TitleOwnership,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .lock()?
            .clusters
            .get(&(branch_id.to_string(), status, title))
            .cloned())
    }

    async fn find_scheme(&self, filter: &SchemeFilter) -> Result<Option<SchemeRow>, AppError> {
        let rows = self.lock()?.schemes.clone();
        Ok(scheme::select_best(filter, rows))
    }

    async fn find_dummy_bureau(&self, id_number: &str) -> Result<Option<Value>, AppError> {
        Ok(self.lock()?.dummy_bureau.get(id_number).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineStage, RawSource, RecordKind, RiskCode, StageTrace};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_patches_accumulate() {
        let store = MemoryRecordStore::new();
        let record = NewRecord::submission(RecordKind::Filtering, "SAL-1", Utc::now(), json!({}));
        let id = store.create(record).await.unwrap();

        store
            .update(
                id,
                RecordPatch::RawResponse {
                    source: RawSource::DupcheckApplicant,
                    payload: json!({"customer_id": "C1"}),
                },
            )
            .await
            .unwrap();
        store
            .update(
                id,
                RecordPatch::Stage {
                    trace: StageTrace {
                        stage: PipelineStage::BlacklistChecked,
                        code: RiskCode(1050),
                        decision: None,
                        reason: "Applicant Clean History".to_string(),
                        at: Utc::now(),
                    },
                },
            )
            .await
            .unwrap();

        let saved = store.find(id).await.unwrap().unwrap();
        assert_eq!(saved.stage, PipelineStage::BlacklistChecked);
        assert_eq!(saved.trail.len(), 1);
        assert!(saved.raw_responses.contains_key("dupcheck_applicant"));
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = MemoryRecordStore::new();
        let err = store
            .update(
                Uuid::new_v4(),
                RecordPatch::RawResponse {
                    source: RawSource::Bureau,
                    payload: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
