//! Elaboration: matching an application against the underwriting scheme table.

use crate::db_storage::{persistence_failure, ApplicantRecordStore};
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CustomerStatus, Decision, ElaborateRequest, ElaborateResult, NewRecord, PipelineStage,
    RecordKind, RecordPatch, RiskCode, SchemeRow, StageTrace, TitleOwnership, VehicleAgeBucket,
};
use crate::thresholds::{SCHEME_LTV_SENTINEL, SCHEME_OTHER_OPEN_TENOR, SCHEME_PASS_OPEN_TENOR};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

pub const CODE_SCHEME_PASS: RiskCode = RiskCode(4001);
pub const CODE_SCHEME_REJECT: RiskCode = RiskCode(4002);
pub const CODE_SCHEME_NO_HIT: RiskCode = RiskCode(4003);
pub const CODE_SCHEME_NOT_FOUND: RiskCode = RiskCode(4004);
pub const CODE_CLUSTER_NOT_FOUND: RiskCode = RiskCode(4005);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TenorFilter {
    /// `tenor_start <= tenor <= tenor_end`.
    Contains(u32),
    /// The open-ended row that starts at this tenor.
    OpenEnded { start: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LtvFilter {
    /// `ltv_start <= ltv <= ltv_end`.
    Contains(i64),
    /// The ">= 1000" sentinel row.
    OpenEnded,
}

/// Constraints a scheme row must satisfy. `None` fields are unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeFilter {
    pub cluster: String,
    pub bureau_decision: Decision,
    pub bpkb_name_type: Option<TitleOwnership>,
    pub tenor: TenorFilter,
    pub vehicle_age: Option<VehicleAgeBucket>,
    pub ltv: Option<LtvFilter>,
    pub baki_debet: Option<f64>,
}

fn tenor_filter(tenor: u32, open_from: u32) -> TenorFilter {
    if tenor >= open_from {
        TenorFilter::OpenEnded { start: open_from }
    } else {
        TenorFilter::Contains(tenor)
    }
}

/// An LTV of 0 means the caller did not supply one; it shares the sentinel row
/// with LTVs above 1000.
pub fn ltv_filter(ltv: i64) -> LtvFilter {
    if ltv > 0 && ltv <= SCHEME_LTV_SENTINEL {
        LtvFilter::Contains(ltv)
    } else {
        LtvFilter::OpenEnded
    }
}

/// Builds the row filter for an application already assigned to `cluster`.
pub fn build_filter(cluster: String, request: &ElaborateRequest) -> SchemeFilter {
    let title = request.bpkb_name_type;
    let age = request.vehicle_age;
    let tenor = request.tenor;

    let mut filter = SchemeFilter {
        cluster,
        bureau_decision: request.result_pefindo,
        bpkb_name_type: None,
        tenor: TenorFilter::Contains(tenor),
        vehicle_age: None,
        ltv: None,
        baki_debet: None,
    };

    match request.result_pefindo {
        Decision::Pass => {
            if tenor >= SCHEME_PASS_OPEN_TENOR {
                filter.bpkb_name_type = Some(title);
                filter.tenor = TenorFilter::OpenEnded {
                    start: SCHEME_PASS_OPEN_TENOR,
                };
                if title == TitleOwnership::DifferentOwner {
                    filter.vehicle_age = Some(age);
                }
            }

            let young_vehicle = age == VehicleAgeBucket::UpTo12;
            let needs_ltv = (young_vehicle && title == TitleOwnership::DifferentOwner)
                || tenor < SCHEME_PASS_OPEN_TENOR;
            if needs_ltv {
                filter.ltv = Some(ltv_filter(request.ltv));
            }
        }
        Decision::NoHit => {
            filter.tenor = tenor_filter(tenor, SCHEME_OTHER_OPEN_TENOR);
            filter.ltv = Some(ltv_filter(request.ltv));
        }
        Decision::Reject => {
            filter.baki_debet = Some(request.baki_debet);
            filter.tenor = tenor_filter(tenor, SCHEME_OTHER_OPEN_TENOR);
            if tenor < SCHEME_OTHER_OPEN_TENOR {
                filter.ltv = Some(ltv_filter(request.ltv));
            }
        }
    }

    filter
}

fn within<T: PartialOrd + Copy>(value: T, start: Option<T>, end: Option<T>) -> bool {
    match start {
        Some(start) => start <= value && end.map_or(true, |end| value <= end),
        None => false,
    }
}

impl SchemeFilter {
    pub fn matches(&self, row: &SchemeRow) -> bool {
        if row.cluster != self.cluster || row.bureau_decision != self.bureau_decision {
            return false;
        }
        if let Some(title) = self.bpkb_name_type {
            if row.bpkb_name_type != Some(title) {
                return false;
            }
        }
        if let Some(age) = self.vehicle_age {
            if row.vehicle_age != Some(age) {
                return false;
            }
        }

        let tenor_ok = match self.tenor {
            TenorFilter::Contains(tenor) => within(tenor, Some(row.tenor_start), row.tenor_end),
            TenorFilter::OpenEnded { start } => row.tenor_start == start && row.tenor_end.is_none(),
        };
        if !tenor_ok {
            return false;
        }

        let ltv_ok = match self.ltv {
            None => true,
            Some(LtvFilter::Contains(ltv)) => {
                row.ltv_end.is_some() && within(ltv, row.ltv_start, row.ltv_end)
            }
            Some(LtvFilter::OpenEnded) => {
                row.ltv_start == Some(SCHEME_LTV_SENTINEL) && row.ltv_end.is_none()
            }
        };
        if !ltv_ok {
            return false;
        }

        match self.baki_debet {
            None => true,
            Some(debt) => within(debt, row.baki_debet_start, row.baki_debet_end),
        }
    }
}

fn tenor_span(row: &SchemeRow) -> u32 {
    row.tenor_end
        .map_or(u32::MAX, |end| end.saturating_sub(row.tenor_start))
}

fn ltv_span(row: &SchemeRow) -> i64 {
    match (row.ltv_start, row.ltv_end) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        _ => i64::MAX,
    }
}

fn debt_span(row: &SchemeRow) -> f64 {
    match (row.baki_debet_start, row.baki_debet_end) {
        (Some(start), Some(end)) => end - start,
        _ => f64::INFINITY,
    }
}

/// Tie-break between matching rows: narrowest tenor span, then narrowest LTV
/// span, then narrowest debt span, then lowest id.
fn by_specificity(a: &SchemeRow, b: &SchemeRow) -> Ordering {
    tenor_span(a)
        .cmp(&tenor_span(b))
        .then_with(|| ltv_span(a).cmp(&ltv_span(b)))
        .then_with(|| {
            debt_span(a)
                .partial_cmp(&debt_span(b))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Picks the single best row for `filter` out of `rows`.
pub fn select_best<I>(filter: &SchemeFilter, rows: I) -> Option<SchemeRow>
where
    I: IntoIterator<Item = SchemeRow>,
{
    rows.into_iter()
        .filter(|row| filter.matches(row))
        .min_by(by_specificity)
}

/// Outcome of matching a filter, before it is stamped with request ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeOutcome {
    pub code: RiskCode,
    pub decision: Decision,
    pub reason: String,
    pub ltv_start: Option<i64>,
}

pub fn outcome(row: Option<&SchemeRow>) -> SchemeOutcome {
    match row {
        Some(row) => {
            let (code, reason) = match row.decision {
                Decision::Pass => (CODE_SCHEME_PASS, "Final Approval"),
                Decision::Reject => (CODE_SCHEME_REJECT, "Final Decline"),
                Decision::NoHit => (CODE_SCHEME_NO_HIT, "Scheme Requires Manual Review"),
            };
            SchemeOutcome {
                code,
                decision: row.decision,
                reason: format!("{} (scheme {})", reason, row.id),
                ltv_start: row.ltv_start,
            }
        }
        None => SchemeOutcome {
            code: CODE_SCHEME_NOT_FOUND,
            decision: Decision::Reject,
            reason: "No matching scheme".to_string(),
            ltv_start: None,
        },
    }
}

type ClusterKey = (String, CustomerStatus, TitleOwnership);

/// Resolves clusters and matches scheme rows, recording each elaboration.
pub struct SchemeMatcher {
    store: Arc<dyn ApplicantRecordStore>,
    cluster_cache: Cache<ClusterKey, String>,
}

impl SchemeMatcher {
    pub fn new(store: Arc<dyn ApplicantRecordStore>, cluster_ttl: Duration) -> Self {
        let cluster_cache = Cache::builder()
            .time_to_live(cluster_ttl)
            .max_capacity(10_000)
            .build();

        Self {
            store,
            cluster_cache,
        }
    }

    /// Read-through cluster lookup. Misses are not cached.
    pub async fn resolve_cluster(
        &self,
        branch_id: &str,
        status: CustomerStatus,
        title: TitleOwnership,
    ) -> Result<String, AppError> {
        let key = (branch_id.to_string(), status, title);
        let store = self.store.clone();
        let branch = branch_id.to_string();

        self.cluster_cache
            .try_get_with(key, async move {
                store
                    .find_cluster_branch(&branch, status, title)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "No cluster for branch {} / {} / bpkb {}",
                            branch,
                            status.as_str(),
                            u8::from(title)
                        ))
                    })
            })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn elaborate(
        &self,
        request: ElaborateRequest,
        received_at: DateTime<Utc>,
    ) -> Result<ElaborateResult, AppError> {
        request.validate()?;

        let payload = serde_json::to_value(&request)?;
        let record = NewRecord::submission(
            RecordKind::Elaboration,
            &request.prospect_id,
            received_at,
            payload,
        );
        let request_id = record.request_id;
        self.store
            .create(record)
            .await
            .map_err(persistence_failure)
            .context("creating elaboration record")?;

        tracing::info!(
            "Elaboration {} for prospect {}: branch={} status={} pefindo={} tenor={} ltv={}",
            request_id,
            request.prospect_id,
            request.branch_id,
            request.customer_status.as_str(),
            request.result_pefindo,
            request.tenor,
            request.ltv
        );

        let cluster = match self
            .resolve_cluster(
                &request.branch_id,
                request.customer_status,
                request.bpkb_name_type,
            )
            .await
        {
            Ok(cluster) => cluster,
            Err(e) => {
                if matches!(e.root(), AppError::NotFound(_)) {
                    let trace = StageTrace {
                        stage: PipelineStage::Finalized,
                        code: CODE_CLUSTER_NOT_FOUND,
                        decision: None,
                        reason: "Cluster Not Found".to_string(),
                        at: Utc::now(),
                    };
                    self.store
                        .update(
                            request_id,
                            RecordPatch::Finalized {
                                trace,
                                result: serde_json::Value::Null,
                            },
                        )
                        .await
                        .map_err(persistence_failure)?;
                }
                return Err(e);
            }
        };

        let filter = build_filter(cluster.clone(), &request);
        tracing::debug!("Scheme filter: {:?}", filter);

        let row = self.store.find_scheme(&filter).await?;
        let outcome = outcome(row.as_ref());

        let result = ElaborateResult {
            request_id,
            prospect_id: request.prospect_id.clone(),
            code: outcome.code,
            cluster,
            decision: outcome.decision,
            reason: outcome.reason,
            ltv_start: outcome.ltv_start,
        };

        let trace = StageTrace {
            stage: PipelineStage::Finalized,
            code: result.code,
            decision: Some(result.decision),
            reason: result.reason.clone(),
            at: Utc::now(),
        };
        self.store
            .update(
                request_id,
                RecordPatch::Finalized {
                    trace,
                    result: serde_json::to_value(&result)?,
                },
            )
            .await
            .map_err(persistence_failure)
            .context("finalizing elaboration record")?;

        tracing::info!(
            "Elaboration {} -> cluster {} {} ({})",
            request_id,
            result.cluster,
            result.decision,
            result.code
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        decision: Decision,
        tenor: u32,
        title: TitleOwnership,
        age: VehicleAgeBucket,
    ) -> ElaborateRequest {
        ElaborateRequest {
            prospect_id: "SAL-1".to_string(),
            branch_id: "426".to_string(),
            customer_status: CustomerStatus::New,
            bpkb_name_type: title,
            tenor,
            vehicle_age: age,
            ltv: 80,
            baki_debet: 0.0,
            result_pefindo: decision,
        }
    }

    fn scheme_row(id: i64) -> SchemeRow {
        SchemeRow {
            id,
            cluster: "Cluster A".to_string(),
            bureau_decision: Decision::Pass,
            bpkb_name_type: None,
            tenor_start: 0,
            tenor_end: Some(35),
            vehicle_age: None,
            ltv_start: Some(0),
            ltv_end: Some(1000),
            baki_debet_start: None,
            baki_debet_end: None,
            decision: Decision::Pass,
        }
    }

    #[test]
    fn test_pass_long_tenor_different_owner_young_vehicle() {
        let req = request(
            Decision::Pass,
            36,
            TitleOwnership::DifferentOwner,
            VehicleAgeBucket::UpTo12,
        );
        let filter = build_filter("Cluster A".to_string(), &req);

        assert_eq!(filter.bpkb_name_type, Some(TitleOwnership::DifferentOwner));
        assert_eq!(filter.tenor, TenorFilter::OpenEnded { start: 36 });
        assert_eq!(filter.vehicle_age, Some(VehicleAgeBucket::UpTo12));
        assert_eq!(filter.ltv, Some(LtvFilter::Contains(80)));
        assert_eq!(filter.baki_debet, None);
    }

    #[test]
    fn test_pass_long_tenor_same_owner_skips_age_and_ltv() {
        let req = request(
            Decision::Pass,
            48,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::UpTo12,
        );
        let filter = build_filter("Cluster A".to_string(), &req);

        assert_eq!(filter.bpkb_name_type, Some(TitleOwnership::SameOwner));
        assert_eq!(filter.tenor, TenorFilter::OpenEnded { start: 36 });
        assert_eq!(filter.vehicle_age, None);
        assert_eq!(filter.ltv, None);
    }

    #[test]
    fn test_pass_short_tenor_uses_exact_bucket_and_ltv() {
        let req = request(
            Decision::Pass,
            24,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        let filter = build_filter("Cluster A".to_string(), &req);

        assert_eq!(filter.bpkb_name_type, None);
        assert_eq!(filter.tenor, TenorFilter::Contains(24));
        assert_eq!(filter.ltv, Some(LtvFilter::Contains(80)));
    }

    #[test]
    fn test_no_hit_always_filters_ltv() {
        let mut req = request(
            Decision::NoHit,
            24,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        req.ltv = 1200;
        let filter = build_filter("Cluster B".to_string(), &req);

        assert_eq!(filter.tenor, TenorFilter::OpenEnded { start: 24 });
        assert_eq!(filter.ltv, Some(LtvFilter::OpenEnded));

        req.tenor = 23;
        let filter = build_filter("Cluster B".to_string(), &req);
        assert_eq!(filter.tenor, TenorFilter::Contains(23));
    }

    #[test]
    fn test_reject_short_tenor_with_missing_ltv() {
        let mut req = request(
            Decision::Reject,
            12,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        req.ltv = 0;
        req.baki_debet = 10_000_000.0;
        let filter = build_filter("Cluster C".to_string(), &req);

        assert_eq!(filter.baki_debet, Some(10_000_000.0));
        assert_eq!(filter.tenor, TenorFilter::Contains(12));
        assert_eq!(filter.ltv, Some(LtvFilter::OpenEnded));
    }

    #[test]
    fn test_reject_long_tenor_skips_ltv() {
        let mut req = request(
            Decision::Reject,
            24,
            TitleOwnership::DifferentOwner,
            VehicleAgeBucket::UpTo12,
        );
        req.baki_debet = 1.0;
        let filter = build_filter("Cluster C".to_string(), &req);

        assert_eq!(filter.tenor, TenorFilter::OpenEnded { start: 24 });
        assert_eq!(filter.ltv, None);
    }

    #[test]
    fn test_ltv_bucket_boundaries() {
        assert_eq!(ltv_filter(0), LtvFilter::OpenEnded);
        assert_eq!(ltv_filter(1), LtvFilter::Contains(1));
        assert_eq!(ltv_filter(1000), LtvFilter::Contains(1000));
        assert_eq!(ltv_filter(1001), LtvFilter::OpenEnded);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let req = request(
            Decision::Pass,
            35,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        let filter = build_filter("Cluster A".to_string(), &req);
        assert!(filter.matches(&scheme_row(1)));

        let mut req = req;
        req.ltv = 1000;
        let filter = build_filter("Cluster A".to_string(), &req);
        assert!(filter.matches(&scheme_row(1)));
    }

    #[test]
    fn test_sentinel_row_matching() {
        let mut sentinel = scheme_row(2);
        sentinel.ltv_start = Some(1000);
        sentinel.ltv_end = None;

        let mut req = request(
            Decision::Pass,
            12,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        req.ltv = 1500;
        let filter = build_filter("Cluster A".to_string(), &req);

        assert!(filter.matches(&sentinel));
        assert!(!filter.matches(&scheme_row(1)));
    }

    #[test]
    fn test_tie_break_prefers_narrowest_then_lowest_id() {
        let wide = scheme_row(1);
        let mut narrow = scheme_row(7);
        narrow.tenor_start = 12;
        narrow.tenor_end = Some(24);
        narrow.decision = Decision::Reject;
        let mut narrow_twin = narrow.clone();
        narrow_twin.id = 9;

        let req = request(
            Decision::Pass,
            18,
            TitleOwnership::SameOwner,
            VehicleAgeBucket::Over12,
        );
        let filter = build_filter("Cluster A".to_string(), &req);

        let best = select_best(&filter, vec![narrow_twin, wide, narrow]).unwrap();
        assert_eq!(best.id, 7);
        assert_eq!(best.decision, Decision::Reject);
    }

    #[test]
    fn test_outcome_without_row_declines() {
        let outcome = outcome(None);
        assert_eq!(outcome.code, CODE_SCHEME_NOT_FOUND);
        assert_eq!(outcome.decision, Decision::Reject);
        assert_eq!(outcome.ltv_start, None);
    }
}
