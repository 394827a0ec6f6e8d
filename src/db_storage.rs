use crate::errors::{AppError, ResultExt};
use crate::models::{
    CustomerStatus, Decision, EvaluationRecord, NewRecord, PipelineStage, RecordKind, RecordPatch,
    RiskCode, SchemeRow, StageTrace, TitleOwnership, VehicleAgeBucket,
};
use crate::scheme::{self, SchemeFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

/// Persistence port for audit records and the static lookup tables.
///
/// Record writes only ever add information: raw payloads are merged by
/// source key, trail entries are appended.
#[async_trait]
pub trait ApplicantRecordStore: Send + Sync {
    async fn create(&self, record: NewRecord) -> Result<Uuid, AppError>;

    /// Fails with `NotFound` when no record carries `request_id`.
    async fn update(&self, request_id: Uuid, patch: RecordPatch) -> Result<(), AppError>;

    async fn find(&self, request_id: Uuid) -> Result<Option<EvaluationRecord>, AppError>;

    async fn find_cluster_branch(
        &self,
        branch_id: &str,
        status: CustomerStatus,
        title: TitleOwnership,
    ) -> Result<Option<String>, AppError>;

    async fn find_scheme(&self, filter: &SchemeFilter) -> Result<Option<SchemeRow>, AppError>;

    /// Canned bureau payload for dummy mode.
    async fn find_dummy_bureau(&self, id_number: &str) -> Result<Option<Value>, AppError>;
}

/// Record writes failing is reported as the data layer being unavailable.
pub fn persistence_failure(err: AppError) -> AppError {
    match err {
        AppError::UpstreamUnavailable(_) => err,
        other => AppError::UpstreamUnavailable(format!("record store: {}", other)),
    }
}

/// Postgres-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

type RecordRow = (
    Uuid,
    String,
    String,
    DateTime<Utc>,
    String,
    Value,
    Value,
    String,
    Value,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<Value>,
);

type SchemeTuple = (
    i64,
    String,
    String,
    Option<i16>,
    i32,
    Option<i32>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<f64>,
    Option<f64>,
    String,
);

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_trace(
        &self,
        request_id: Uuid,
        trace: &StageTrace,
        stage: PipelineStage,
        result: Option<&Value>,
    ) -> Result<u64, AppError> {
        let entry = json!([trace]);

        let done = sqlx::query(
            r#"
            UPDATE evaluation_records
            SET stage = $2,
                code = $3,
                decision = $4,
                reason = $5,
                trail = trail || $6::jsonb,
                result = COALESCE($7, result),
                updated_at = now()
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .bind(stage.as_str())
        .bind(i32::from(trace.code.0))
        .bind(trace.decision.map(|d| d.as_str()))
        .bind(&trace.reason)
        .bind(&entry)
        .bind(result)
        .execute(&self.pool)
        .await
        .with_context(|| format!("appending {} trace to {}", stage.as_str(), request_id))?;

        Ok(done.rows_affected())
    }
}

#[async_trait]
impl ApplicantRecordStore for PgRecordStore {
    async fn create(&self, record: NewRecord) -> Result<Uuid, AppError> {
        let (request_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO evaluation_records
                (request_id, kind, prospect_id, received_at, payload_hash, request_payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING request_id
            "#,
        )
        .bind(record.request_id)
        .bind(record.kind.as_str())
        .bind(&record.prospect_id)
        .bind(record.received_at)
        .bind(&record.payload_hash)
        .bind(&record.request_payload)
        .fetch_one(&self.pool)
        .await
        .context("inserting evaluation record")?;

        tracing::debug!("Created {} record {}", record.kind.as_str(), request_id);
        Ok(request_id)
    }

    async fn update(&self, request_id: Uuid, patch: RecordPatch) -> Result<(), AppError> {
        let affected = match patch {
            RecordPatch::RawResponse { source, payload } => sqlx::query(
                r#"
                UPDATE evaluation_records
                SET raw_responses = raw_responses || jsonb_build_object($2::text, $3::jsonb),
                    updated_at = now()
                WHERE request_id = $1
                "#,
            )
            .bind(request_id)
            .bind(source.key())
            .bind(&payload)
            .execute(&self.pool)
            .await
            .with_context(|| format!("storing {} payload on {}", source.key(), request_id))?
            .rows_affected(),
            RecordPatch::Stage { trace } | RecordPatch::Pending { trace } => {
                self.append_trace(request_id, &trace, trace.stage, None)
                    .await?
            }
            RecordPatch::Finalized { trace, result } => {
                self.append_trace(request_id, &trace, PipelineStage::Finalized, Some(&result))
                    .await?
            }
        };

        if affected == 0 {
            return Err(AppError::NotFound(format!("record {}", request_id)));
        }
        Ok(())
    }

    async fn find(&self, request_id: Uuid) -> Result<Option<EvaluationRecord>, AppError> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT request_id, kind, prospect_id, received_at, payload_hash, request_payload,
                   raw_responses, stage, trail, code, decision, reason, result
            FROM evaluation_records
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading evaluation record")?;

        row.map(record_from_row).transpose()
    }

    async fn find_cluster_branch(
        &self,
        branch_id: &str,
        status: CustomerStatus,
        title: TitleOwnership,
    ) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT cluster FROM cluster_branches
            WHERE branch_id = $1 AND customer_status = $2 AND bpkb_name_type = $3
            LIMIT 1
            "#,
        )
        .bind(branch_id)
        .bind(status.as_str())
        .bind(i16::from(u8::from(title)))
        .fetch_optional(&self.pool)
        .await
        .context("resolving cluster")?;

        Ok(row.map(|(cluster,)| cluster))
    }

    async fn find_scheme(&self, filter: &SchemeFilter) -> Result<Option<SchemeRow>, AppError> {
        let rows: Vec<SchemeTuple> = sqlx::query_as(
            r#"
            SELECT id, cluster, bureau_decision, bpkb_name_type, tenor_start, tenor_end,
                   vehicle_age, ltv_start, ltv_end, baki_debet_start, baki_debet_end, decision
            FROM scheme_rows
            WHERE cluster = $1 AND bureau_decision = $2
            ORDER BY id
            "#,
        )
        .bind(&filter.cluster)
        .bind(filter.bureau_decision.as_str())
        .fetch_all(&self.pool)
        .await
        .context("loading scheme rows")?;

        let rows = rows
            .into_iter()
            .map(scheme_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scheme::select_best(filter, rows))
    }

    async fn find_dummy_bureau(&self, id_number: &str) -> Result<Option<Value>, AppError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT payload FROM dummy_bureau_responses WHERE id_number = $1")
                .bind(id_number)
                .fetch_optional(&self.pool)
                .await
                .context("loading dummy bureau payload")?;

        Ok(row.map(|(payload,)| payload))
    }
}

fn record_from_row(row: RecordRow) -> Result<EvaluationRecord, AppError> {
    let (
        request_id,
        kind,
        prospect_id,
        received_at,
        payload_hash,
        request_payload,
        raw_responses,
        stage,
        trail,
        code,
        decision,
        reason,
        result,
    ) = row;

    let kind = match kind.as_str() {
        "filtering" => RecordKind::Filtering,
        "elaboration" => RecordKind::Elaboration,
        other => {
            return Err(AppError::DecodeError(format!(
                "unknown record kind '{}'",
                other
            )))
        }
    };

    let raw_responses = match raw_responses {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let code = code
        .map(|c| {
            u16::try_from(c)
                .map(RiskCode)
                .map_err(|_| AppError::DecodeError(format!("risk code {} out of range", c)))
        })
        .transpose()?;

    Ok(EvaluationRecord {
        request_id,
        kind,
        prospect_id,
        received_at,
        payload_hash,
        request_payload,
        raw_responses,
        stage: stage.parse::<PipelineStage>()?,
        trail: serde_json::from_value(trail)?,
        code,
        decision: decision.as_deref().map(str::parse::<Decision>).transpose()?,
        reason,
        result,
    })
}

fn scheme_from_row(row: SchemeTuple) -> Result<SchemeRow, AppError> {
    let (
        id,
        cluster,
        bureau_decision,
        bpkb_name_type,
        tenor_start,
        tenor_end,
        vehicle_age,
        ltv_start,
        ltv_end,
        baki_debet_start,
        baki_debet_end,
        decision,
    ) = row;

    let tenor = |value: i32| {
        u32::try_from(value)
            .map_err(|_| AppError::DecodeError(format!("scheme {}: negative tenor {}", id, value)))
    };

    let bpkb_name_type = bpkb_name_type
        .map(|value| {
            u8::try_from(value)
                .map_err(|_| value.to_string())
                .and_then(TitleOwnership::try_from)
                .map_err(|e| AppError::DecodeError(format!("scheme {}: {}", id, e)))
        })
        .transpose()?;

    Ok(SchemeRow {
        id,
        cluster,
        bureau_decision: bureau_decision.parse::<Decision>()?,
        bpkb_name_type,
        tenor_start: tenor(tenor_start)?,
        tenor_end: tenor_end.map(tenor).transpose()?,
        vehicle_age: vehicle_age
            .as_deref()
            .map(str::parse::<VehicleAgeBucket>)
            .transpose()?,
        ltv_start,
        ltv_end,
        baki_debet_start,
        baki_debet_end,
        decision: decision.parse::<Decision>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_row_conversion() {
        let row: SchemeTuple = (
            3,
            "Cluster A".to_string(),
            "NO_HIT".to_string(),
            Some(1),
            24,
            None,
            Some(">12".to_string()),
            Some(1000),
            None,
            None,
            None,
            "PASS".to_string(),
        );

        let scheme = scheme_from_row(row).unwrap();
        assert_eq!(scheme.bureau_decision, Decision::NoHit);
        assert_eq!(scheme.bpkb_name_type, Some(TitleOwnership::DifferentOwner));
        assert_eq!(scheme.tenor_end, None);
        assert_eq!(scheme.vehicle_age, Some(VehicleAgeBucket::Over12));
        assert_eq!(scheme.decision, Decision::Pass);
    }

    #[test]
    fn test_scheme_row_rejects_bad_title() {
        let row: SchemeTuple = (
            4,
            "Cluster A".to_string(),
            "PASS".to_string(),
            Some(7),
            0,
            Some(12),
            None,
            None,
            None,
            None,
            None,
            "PASS".to_string(),
        );

        assert!(matches!(scheme_from_row(row), Err(AppError::DecodeError(_))));
    }
}
