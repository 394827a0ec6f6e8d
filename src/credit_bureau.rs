//! Credit bureau (PBK) evaluation.
//!
//! A scored report goes through two ordered rule lists: the overdue rules,
//! parameterized by BPKB name type, and, when those reject, the write-off /
//! outstanding-debt override.

use crate::db_storage::ApplicantRecordStore;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    ApplicantProfile, CustomerStatus, Decision, DupcheckResult, Gender, Identity, RiskCode,
    SpouseProfile, TitleOwnership,
};
use crate::services::ExternalServiceClient;
use crate::thresholds::{
    PBK_DIFFERENT_OWNER_MAX_OVERDUE_12M, PBK_DIFFERENT_OWNER_MAX_OVERDUE_CURRENT,
    PBK_NON_COLLATERAL_DEBT_CEILING, PBK_SAME_OWNER_MAX_OVERDUE_12M,
    PBK_SAME_OWNER_MAX_OVERDUE_CURRENT,
};
use crate::upstream_models::{BureauReport, BureauStatus, BureauSubject, UpstreamReply};
use serde_json::Value;
use std::sync::Arc;

pub const CODE_PBK_CLOSED: RiskCode = RiskCode(3001);
pub const CODE_PBK_UNSCORED_NEW: RiskCode = RiskCode(3002);
pub const CODE_PBK_UNSCORED_RETURNING: RiskCode = RiskCode(3003);
pub const CODE_PBK_DOWN: RiskCode = RiskCode(3004);

/// Result of the bureau stage. `Pending` is neither a pass nor a reject:
/// the bureau reported itself down and the application has to be retried.
#[derive(Debug, Clone, PartialEq)]
pub enum BureauOutcome {
    Verdict(DupcheckResult),
    Pending { reason: String },
}

/// Overdue figures of a scored report, normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverdueFacts {
    /// `None` when the bureau sent null for the 12-month window.
    pub last_12_months: Option<f64>,
    /// Null current overdue means no overdue.
    pub current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverdueLimits {
    pub max_last_12_months: f64,
    pub max_current: f64,
    /// 3100 for same owner, 3200 for different owner.
    pub code_base: u16,
    pub label: &'static str,
}

impl OverdueLimits {
    pub fn for_title(title: TitleOwnership) -> Self {
        match title {
            TitleOwnership::SameOwner => Self {
                max_last_12_months: PBK_SAME_OWNER_MAX_OVERDUE_12M,
                max_current: PBK_SAME_OWNER_MAX_OVERDUE_CURRENT,
                code_base: 3100,
                label: "BPKB Same Owner",
            },
            TitleOwnership::DifferentOwner => Self {
                max_last_12_months: PBK_DIFFERENT_OWNER_MAX_OVERDUE_12M,
                max_current: PBK_DIFFERENT_OWNER_MAX_OVERDUE_CURRENT,
                code_base: 3200,
                label: "BPKB Different Owner",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueBranch {
    TwelveMonthNull,
    WithinLimits,
    CurrentExceeded,
    TwelveMonthExceeded,
}

impl OverdueBranch {
    fn offset(self) -> u16 {
        match self {
            OverdueBranch::TwelveMonthNull => 1,
            OverdueBranch::WithinLimits => 2,
            OverdueBranch::CurrentExceeded => 3,
            OverdueBranch::TwelveMonthExceeded => 4,
        }
    }

    fn decision(self) -> Decision {
        match self {
            OverdueBranch::TwelveMonthNull | OverdueBranch::WithinLimits => Decision::Pass,
            OverdueBranch::CurrentExceeded | OverdueBranch::TwelveMonthExceeded => {
                Decision::Reject
            }
        }
    }

    fn reason(self, limits: &OverdueLimits) -> String {
        match self {
            OverdueBranch::TwelveMonthNull => {
                format!("PBK {}: Max Overdue Last 12 Months Null", limits.label)
            }
            OverdueBranch::WithinLimits => format!("PBK {}: Overdue Within Limits", limits.label),
            OverdueBranch::CurrentExceeded => format!(
                "PBK {}: Current Overdue Above {} Days",
                limits.label, limits.max_current
            ),
            OverdueBranch::TwelveMonthExceeded => format!(
                "PBK {}: Max Overdue Last 12 Months Above {} Days",
                limits.label, limits.max_last_12_months
            ),
        }
    }
}

type OverduePredicate = fn(&OverdueFacts, &OverdueLimits) -> bool;

fn twelve_month_null(f: &OverdueFacts, _: &OverdueLimits) -> bool {
    f.last_12_months.is_none()
}

fn twelve_month_exceeded(f: &OverdueFacts, l: &OverdueLimits) -> bool {
    f.last_12_months.is_some_and(|v| v > l.max_last_12_months)
}

fn current_exceeded(f: &OverdueFacts, l: &OverdueLimits) -> bool {
    f.current > l.max_current
}

fn always(_: &OverdueFacts, _: &OverdueLimits) -> bool {
    true
}

/// Evaluated top to bottom; the first matching predicate wins.
static OVERDUE_RULES: [(OverduePredicate, OverdueBranch); 4] = [
    (twelve_month_null, OverdueBranch::TwelveMonthNull),
    (twelve_month_exceeded, OverdueBranch::TwelveMonthExceeded),
    (current_exceeded, OverdueBranch::CurrentExceeded),
    (always, OverdueBranch::WithinLimits),
];

pub fn overdue_branch(facts: &OverdueFacts, limits: &OverdueLimits) -> OverdueBranch {
    OVERDUE_RULES
        .iter()
        .find(|(applies, _)| applies(facts, limits))
        .map(|(_, branch)| *branch)
        .unwrap_or(OverdueBranch::WithinLimits)
}

/// Write-off and outstanding-debt facts read by the reject override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOffFacts {
    pub write_off: bool,
    pub with_collateral: bool,
    pub non_collateral_debt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideRule {
    pub code: RiskCode,
    pub decision: Decision,
    pub reason: &'static str,
}

type WriteOffPredicate = fn(&WriteOffFacts) -> bool;

fn over_ceiling(f: &WriteOffFacts) -> bool {
    f.non_collateral_debt > PBK_NON_COLLATERAL_DEBT_CEILING
}

fn collateralized_write_off(f: &WriteOffFacts) -> bool {
    f.write_off && f.with_collateral
}

fn write_off_over_ceiling(f: &WriteOffFacts) -> bool {
    f.write_off && over_ceiling(f)
}

fn write_off(f: &WriteOffFacts) -> bool {
    f.write_off
}

fn any(_: &WriteOffFacts) -> bool {
    true
}

static OVERRIDE_RULES: [(WriteOffPredicate, OverrideRule); 5] = [
    (
        collateralized_write_off,
        OverrideRule {
            code: RiskCode(3301),
            decision: Decision::Reject,
            reason: "Write Off With Collateral",
        },
    ),
    (
        write_off_over_ceiling,
        OverrideRule {
            code: RiskCode(3302),
            decision: Decision::Reject,
            reason: "Write Off Without Collateral, Non-Collateral Debt Above Ceiling",
        },
    ),
    (
        write_off,
        OverrideRule {
            code: RiskCode(3303),
            decision: Decision::Pass,
            reason: "Write Off Without Collateral, Non-Collateral Debt Within Ceiling",
        },
    ),
    (
        over_ceiling,
        OverrideRule {
            code: RiskCode(3304),
            decision: Decision::Reject,
            reason: "Non-Collateral Debt Above Ceiling",
        },
    ),
    (
        any,
        OverrideRule {
            code: RiskCode(3305),
            decision: Decision::Pass,
            reason: "Non-Collateral Debt Within Ceiling",
        },
    ),
];

pub fn override_rule(facts: &WriteOffFacts) -> &'static OverrideRule {
    OVERRIDE_RULES
        .iter()
        .find(|(applies, _)| applies(facts))
        .map(|(_, rule)| rule)
        .unwrap_or(&OVERRIDE_RULES[OVERRIDE_RULES.len() - 1].1)
}

fn unscored_result(status: CustomerStatus) -> (RiskCode, &'static str) {
    if status.is_returning() {
        (CODE_PBK_UNSCORED_RETURNING, "PBK Unscored - Returning Customer")
    } else {
        (CODE_PBK_UNSCORED_NEW, "PBK Unscored - New Customer")
    }
}

fn verdict(
    code: RiskCode,
    decision: Decision,
    reason: String,
    status: CustomerStatus,
    report: &BureauReport,
    debt: Option<f64>,
) -> DupcheckResult {
    DupcheckResult {
        code,
        decision,
        reason,
        status_konsumen: status,
        category: None,
        next_process: decision == Decision::Pass,
        pbk_report: report.report_link(),
        total_baki_debet: debt,
    }
}

/// Interprets a bureau reply. `None` means bureau access is switched off.
pub fn evaluate(
    reply: Option<&UpstreamReply>,
    title: TitleOwnership,
    status: CustomerStatus,
) -> Result<BureauOutcome, AppError> {
    let reply = match reply {
        Some(reply) => reply,
        None => {
            return Ok(BureauOutcome::Verdict(DupcheckResult {
                code: CODE_PBK_CLOSED,
                decision: Decision::NoHit,
                reason: "PBK access closed".to_string(),
                status_konsumen: status,
                category: None,
                next_process: true,
                pbk_report: None,
                total_baki_debet: None,
            }))
        }
    };

    let report = BureauReport::from_payload(&reply.payload)?;
    let debt = report.total_debt()?;

    match report.status()? {
        BureauStatus::Down => {
            tracing::warn!("PBK reported itself down; application is pending");
            Ok(BureauOutcome::Pending {
                reason: "PBK Service Unavailable".to_string(),
            })
        }
        BureauStatus::Unscored => {
            let (code, reason) = unscored_result(status);
            Ok(BureauOutcome::Verdict(verdict(
                code,
                Decision::Pass,
                reason.to_string(),
                status,
                &report,
                debt,
            )))
        }
        BureauStatus::Scored if report.is_unscore() => {
            let (code, reason) = unscored_result(status);
            Ok(BureauOutcome::Verdict(verdict(
                code,
                Decision::Pass,
                reason.to_string(),
                status,
                &report,
                debt,
            )))
        }
        BureauStatus::Scored => {
            let facts = OverdueFacts {
                last_12_months: report
                    .max_overdue_last12months
                    .normalize("max_overdue_last12months")?,
                current: report.max_overdue.normalize("max_overdue")?.unwrap_or(0.0),
            };
            let limits = OverdueLimits::for_title(title);
            let branch = overdue_branch(&facts, &limits);
            let code = RiskCode(limits.code_base + branch.offset());
            let reason = branch.reason(&limits);

            if branch.decision() == Decision::Pass {
                return Ok(BureauOutcome::Verdict(verdict(
                    code,
                    Decision::Pass,
                    reason,
                    status,
                    &report,
                    debt,
                )));
            }

            let write_off = WriteOffFacts {
                write_off: report.wo_contract,
                with_collateral: report.wo_contract && report.wo_ada_agunan,
                non_collateral_debt: debt.unwrap_or(0.0),
            };
            let rule = override_rule(&write_off);

            tracing::info!(
                "PBK overdue branch {} rejected; override {} -> {}",
                code,
                rule.code,
                rule.decision
            );

            Ok(BureauOutcome::Verdict(verdict(
                rule.code,
                rule.decision,
                format!("{} - {}", reason, rule.reason),
                status,
                &report,
                debt,
            )))
        }
    }
}

/// Report link and debt figure recorded for Prime/Priority customers. The
/// report never influences their decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityReport {
    pub pbk_report: Option<String>,
    pub total_baki_debet: Option<f64>,
}

pub fn priority_report(reply: Option<&UpstreamReply>) -> Result<PriorityReport, AppError> {
    let Some(reply) = reply else {
        return Ok(PriorityReport::default());
    };
    let report = BureauReport::from_payload(&reply.payload)?;
    if report.status()? == BureauStatus::Down {
        tracing::warn!("PBK down during priority lookup; continuing without report");
        return Ok(PriorityReport::default());
    }

    Ok(PriorityReport {
        pbk_report: report.report_link(),
        total_baki_debet: report.total_debt()?,
    })
}

fn subject(identity: &Identity, gender: Gender) -> BureauSubject {
    BureauSubject {
        id_number: identity.id_number.clone(),
        legal_name: identity.legal_name.clone(),
        birth_date: identity.birth_date.format("%Y-%m-%d").to_string(),
        mother_name: identity.mother_name.clone(),
        gender: match gender {
            Gender::Male => "M",
            Gender::Female => "F",
        }
        .to_string(),
    }
}

/// Fetches bureau data, live or from the dummy table.
pub struct CreditBureauEvaluator {
    client: Arc<dyn ExternalServiceClient>,
    store: Arc<dyn ApplicantRecordStore>,
    enabled: bool,
    dummy: bool,
}

impl CreditBureauEvaluator {
    pub fn new(
        client: Arc<dyn ExternalServiceClient>,
        store: Arc<dyn ApplicantRecordStore>,
        enabled: bool,
        dummy: bool,
    ) -> Self {
        Self {
            client,
            store,
            enabled,
            dummy,
        }
    }

    /// `Ok(None)` when bureau access is switched off.
    pub async fn fetch(
        &self,
        prospect_id: &str,
        applicant: &ApplicantProfile,
        spouse: Option<&SpouseProfile>,
    ) -> Result<Option<UpstreamReply>, AppError> {
        if !self.enabled {
            tracing::info!("PBK access disabled for prospect {}", prospect_id);
            return Ok(None);
        }

        if self.dummy {
            let payload = self
                .store
                .find_dummy_bureau(&applicant.identity.id_number)
                .await
                .context("loading dummy PBK payload")?;
            if payload.is_none() {
                tracing::debug!("No dummy PBK payload; treating as no data");
            }
            return Ok(Some(UpstreamReply::ok(payload.unwrap_or(Value::Null))));
        }

        let applicant_subject = subject(&applicant.identity, applicant.gender);
        let spouse_subject = spouse.map(|s| subject(&s.identity, s.gender));

        self.client
            .call_bureau(prospect_id, &applicant_subject, spouse_subject.as_ref())
            .await
            .context("PBK inquiry")
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored(body: Value) -> UpstreamReply {
        UpstreamReply::ok(body)
    }

    fn verdict_of(outcome: BureauOutcome) -> DupcheckResult {
        match outcome {
            BureauOutcome::Verdict(result) => result,
            BureauOutcome::Pending { .. } => panic!("expected a verdict"),
        }
    }

    #[test]
    fn test_disabled_is_no_hit() {
        let result =
            verdict_of(evaluate(None, TitleOwnership::SameOwner, CustomerStatus::New).unwrap());
        assert_eq!(result.code, CODE_PBK_CLOSED);
        assert_eq!(result.decision, Decision::NoHit);
    }

    #[test]
    fn test_null_twelve_month_passes_regardless_of_current() {
        let reply = scored(json!({
            "code": 200,
            "result": "REJECT",
            "max_overdue": 9999,
            "max_overdue_last12months": null
        }));
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap(),
        );

        assert_eq!(result.decision, Decision::Pass);
        assert_eq!(result.code, RiskCode(3101));
        assert!(result.reason.contains("Null"));
    }

    #[test]
    fn test_different_owner_current_overdue_with_write_off_over_ceiling() {
        let reply = scored(json!({
            "code": 200,
            "max_overdue": 999,
            "max_overdue_last12months": 5,
            "wo_contract": true,
            "wo_ada_agunan": false,
            "total_baki_debet_non_agunan": 25_000_000
        }));
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::DifferentOwner, CustomerStatus::Ro).unwrap(),
        );

        assert_eq!(result.decision, Decision::Reject);
        assert_eq!(result.code, RiskCode(3302));
        assert!(result.reason.starts_with("PBK BPKB Different Owner: Current Overdue"));
        assert_eq!(result.total_baki_debet, Some(25_000_000.0));
        assert!(!result.next_process);
    }

    #[test]
    fn test_different_owner_write_off_under_ceiling_overrides_to_pass() {
        let reply = scored(json!({
            "code": 200,
            "max_overdue": "999",
            "max_overdue_last12months": "5",
            "wo_contract": true,
            "wo_ada_agunan": false,
            "total_baki_debet_non_agunan": "5000000"
        }));
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::DifferentOwner, CustomerStatus::Ro).unwrap(),
        );

        assert_eq!(result.decision, Decision::Pass);
        assert_eq!(result.code, RiskCode(3303));
        assert!(result.next_process);
    }

    #[test]
    fn test_write_off_with_collateral_always_rejects() {
        let reply = scored(json!({
            "code": 200,
            "max_overdue": 0,
            "max_overdue_last12months": 90,
            "wo_contract": true,
            "wo_ada_agunan": true,
            "total_baki_debet_non_agunan": 0
        }));
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap(),
        );
        assert_eq!(result.code, RiskCode(3301));
        assert_eq!(result.decision, Decision::Reject);
    }

    #[test]
    fn test_same_owner_thresholds() {
        let limits = OverdueLimits::for_title(TitleOwnership::SameOwner);
        let facts = |m12: f64, cur: f64| OverdueFacts {
            last_12_months: Some(m12),
            current: cur,
        };

        assert_eq!(overdue_branch(&facts(60.0, 30.0), &limits), OverdueBranch::WithinLimits);
        assert_eq!(overdue_branch(&facts(60.0, 31.0), &limits), OverdueBranch::CurrentExceeded);
        assert_eq!(
            overdue_branch(&facts(61.0, 0.0), &limits),
            OverdueBranch::TwelveMonthExceeded
        );
    }

    #[test]
    fn test_unscored_distinguishes_returning() {
        let reply = scored(json!({"code": 201}));
        let new = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap(),
        );
        let returning = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::Ao).unwrap(),
        );

        assert_eq!(new.code, CODE_PBK_UNSCORED_NEW);
        assert_eq!(returning.code, CODE_PBK_UNSCORED_RETURNING);
        assert_eq!(returning.decision, Decision::Pass);
    }

    #[test]
    fn test_scored_unscore_result_is_unscored() {
        let reply = scored(json!({
            "code": 200,
            "result": "UNSCORE",
            "max_overdue_last12months": 500
        }));
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap(),
        );
        assert_eq!(result.code, CODE_PBK_UNSCORED_NEW);
    }

    #[test]
    fn test_empty_payload_is_no_data() {
        let reply = scored(Value::Null);
        let result = verdict_of(
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap(),
        );
        assert_eq!(result.decision, Decision::Pass);
    }

    #[test]
    fn test_bureau_down_is_pending() {
        let reply = scored(json!({"code": 202}));
        let outcome =
            evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New).unwrap();
        assert!(matches!(outcome, BureauOutcome::Pending { .. }));
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let reply = scored(json!({"code": 200, "max_overdue": "lots"}));
        let err = evaluate(Some(&reply), TitleOwnership::SameOwner, CustomerStatus::New)
            .unwrap_err();
        assert!(matches!(err, AppError::DecodeError(_)));
    }

    #[test]
    fn test_priority_report_ignores_outcome() {
        let reply = scored(json!({
            "code": 200,
            "max_overdue_last12months": 999,
            "pbk_report": "https://pbk.example.com/r/1",
            "total_baki_debet_non_agunan": 1000
        }));
        let report = priority_report(Some(&reply)).unwrap();
        assert_eq!(report.pbk_report.as_deref(), Some("https://pbk.example.com/r/1"));
        assert_eq!(report.total_baki_debet, Some(1000.0));

        let down = priority_report(Some(&scored(json!({"code": 202})))).unwrap();
        assert_eq!(down, PriorityReport::default());
    }
}
