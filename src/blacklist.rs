//! Blacklist / duplicate-check evaluation.
//!
//! Each person's dupcheck history is reduced to one [`Finding`] by an ordered
//! rule list; the (applicant, spouse) pair is then looked up in a fixed matrix
//! that names every combination with its own risk code.

use crate::errors::AppError;
use crate::models::{CustomerStatus, Decision, DupcheckResult, RiskCode};
use crate::thresholds::{DUPCHECK_MAX_ASSET_INVENTORIED, DUPCHECK_MAX_OVERDUE_DAYS};
use crate::upstream_models::{DupcheckHistory, UpstreamReply};
use Decision::{Pass, Reject};
use Finding::{AssetInventoried, BadType, Clean, MaxOverdue, NoHistory, Restructured};

/// Classification of one person's dupcheck history, worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Finding {
    BadType,
    MaxOverdue,
    AssetInventoried,
    Restructured,
    Clean,
    NoHistory,
}

impl Finding {
    pub const ALL: [Finding; 6] = [
        Finding::BadType,
        Finding::MaxOverdue,
        Finding::AssetInventoried,
        Finding::Restructured,
        Finding::Clean,
        Finding::NoHistory,
    ];

    pub fn is_reject(self) -> bool {
        matches!(
            self,
            Finding::BadType
                | Finding::MaxOverdue
                | Finding::AssetInventoried
                | Finding::Restructured
        )
    }

    fn applicant_reason(self) -> &'static str {
        match self {
            Finding::BadType => "Applicant Flagged Bad Type",
            Finding::MaxOverdue => "Applicant Max Overdue Above 60 Days",
            Finding::AssetInventoried => "Applicant Has Inventoried Asset",
            Finding::Restructured => "Applicant Has Restructured Contract",
            Finding::Clean => "Applicant Clean History",
            Finding::NoHistory => "New Applicant",
        }
    }

    fn spouse_reason(self) -> &'static str {
        match self {
            Finding::BadType => "Spouse Flagged Bad Type",
            Finding::MaxOverdue => "Spouse Max Overdue Above 60 Days",
            Finding::AssetInventoried => "Spouse Has Inventoried Asset",
            Finding::Restructured => "Spouse Has Restructured Contract",
            Finding::Clean => "Spouse Clean History",
            Finding::NoHistory => "New Spouse",
        }
    }
}

/// Normalized facts the classification rules read.
#[derive(Debug, Clone, PartialEq)]
pub struct DupcheckFacts {
    pub has_history: bool,
    pub bad_type: bool,
    pub max_overdue_days: f64,
    pub assets_inventoried: f64,
    pub restructured: bool,
}

impl DupcheckFacts {
    pub fn from_history(history: &DupcheckHistory) -> Result<Self, AppError> {
        Ok(Self {
            has_history: history.has_history(),
            bad_type: history
                .bad_type
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
            max_overdue_days: history
                .max_overdue_days
                .normalize("max_overdue_days")?
                .unwrap_or(0.0),
            assets_inventoried: history
                .num_of_asset_inventoried
                .normalize("num_of_asset_inventoried")?
                .unwrap_or(0.0),
            restructured: history.is_restructure,
        })
    }
}

type Predicate = fn(&DupcheckFacts) -> bool;

fn is_bad_type(f: &DupcheckFacts) -> bool {
    f.bad_type
}

fn exceeds_overdue(f: &DupcheckFacts) -> bool {
    f.max_overdue_days > DUPCHECK_MAX_OVERDUE_DAYS
}

fn exceeds_inventoried(f: &DupcheckFacts) -> bool {
    f.assets_inventoried > DUPCHECK_MAX_ASSET_INVENTORIED
}

fn is_restructured(f: &DupcheckFacts) -> bool {
    f.restructured
}

fn has_history(f: &DupcheckFacts) -> bool {
    f.has_history
}

/// Evaluated top to bottom; the first predicate that holds wins. Nothing
/// matching means no history.
static CLASSIFICATION_RULES: [(Predicate, Finding); 5] = [
    (is_bad_type, Finding::BadType),
    (exceeds_overdue, Finding::MaxOverdue),
    (exceeds_inventoried, Finding::AssetInventoried),
    (is_restructured, Finding::Restructured),
    (has_history, Finding::Clean),
];

pub fn classify(facts: &DupcheckFacts) -> Finding {
    CLASSIFICATION_RULES
        .iter()
        .find(|(applies, _)| applies(facts))
        .map(|(_, finding)| *finding)
        .unwrap_or(Finding::NoHistory)
}

/// One cell of the applicant x spouse matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlacklistRow {
    pub applicant: Finding,
    /// `None` when the applicant is not married.
    pub spouse: Option<Finding>,
    pub code: RiskCode,
    pub decision: Decision,
}

impl BlacklistRow {
    pub fn reason(&self) -> String {
        match self.spouse {
            Some(spouse) => format!(
                "{} & {}",
                self.applicant.applicant_reason(),
                spouse.spouse_reason()
            ),
            None => self.applicant.applicant_reason().to_string(),
        }
    }

    /// The single worst finding across both people.
    pub fn worst(&self) -> Finding {
        match self.spouse {
            Some(spouse) => self.applicant.min(spouse),
            None => self.applicant,
        }
    }
}

const fn row(
    applicant: Finding,
    spouse: Option<Finding>,
    code: u16,
    decision: Decision,
) -> BlacklistRow {
    BlacklistRow {
        applicant,
        spouse,
        code: RiskCode(code),
        decision,
    }
}

/// Code layout: 1000 + 10 * applicant rank + spouse rank (0 = no spouse).
pub static BLACKLIST_MATRIX: [BlacklistRow; 42] = [
    row(BadType, None, 1010, Reject),
    row(BadType, Some(BadType), 1011, Reject),
    row(BadType, Some(MaxOverdue), 1012, Reject),
    row(BadType, Some(AssetInventoried), 1013, Reject),
    row(BadType, Some(Restructured), 1014, Reject),
    row(BadType, Some(Clean), 1015, Reject),
    row(BadType, Some(NoHistory), 1016, Reject),
    row(MaxOverdue, None, 1020, Reject),
    row(MaxOverdue, Some(BadType), 1021, Reject),
    row(MaxOverdue, Some(MaxOverdue), 1022, Reject),
    row(MaxOverdue, Some(AssetInventoried), 1023, Reject),
    row(MaxOverdue, Some(Restructured), 1024, Reject),
    row(MaxOverdue, Some(Clean), 1025, Reject),
    row(MaxOverdue, Some(NoHistory), 1026, Reject),
    row(AssetInventoried, None, 1030, Reject),
    row(AssetInventoried, Some(BadType), 1031, Reject),
    row(AssetInventoried, Some(MaxOverdue), 1032, Reject),
    row(AssetInventoried, Some(AssetInventoried), 1033, Reject),
    row(AssetInventoried, Some(Restructured), 1034, Reject),
    row(AssetInventoried, Some(Clean), 1035, Reject),
    row(AssetInventoried, Some(NoHistory), 1036, Reject),
    row(Restructured, None, 1040, Reject),
    row(Restructured, Some(BadType), 1041, Reject),
    row(Restructured, Some(MaxOverdue), 1042, Reject),
    row(Restructured, Some(AssetInventoried), 1043, Reject),
    row(Restructured, Some(Restructured), 1044, Reject),
    row(Restructured, Some(Clean), 1045, Reject),
    row(Restructured, Some(NoHistory), 1046, Reject),
    row(Clean, None, 1050, Pass),
    row(Clean, Some(BadType), 1051, Reject),
    row(Clean, Some(MaxOverdue), 1052, Reject),
    row(Clean, Some(AssetInventoried), 1053, Reject),
    row(Clean, Some(Restructured), 1054, Reject),
    row(Clean, Some(Clean), 1055, Pass),
    row(Clean, Some(NoHistory), 1056, Pass),
    row(NoHistory, None, 1060, Pass),
    row(NoHistory, Some(BadType), 1061, Reject),
    row(NoHistory, Some(MaxOverdue), 1062, Reject),
    row(NoHistory, Some(AssetInventoried), 1063, Reject),
    row(NoHistory, Some(Restructured), 1064, Reject),
    row(NoHistory, Some(Clean), 1065, Pass),
    row(NoHistory, Some(NoHistory), 1066, Pass),
];

pub fn lookup(
    applicant: Finding,
    spouse: Option<Finding>,
) -> Result<&'static BlacklistRow, AppError> {
    BLACKLIST_MATRIX
        .iter()
        .find(|row| row.applicant == applicant && row.spouse == spouse)
        .ok_or_else(|| {
            AppError::InternalError(format!(
                "blacklist matrix has no row for {:?} / {:?}",
                applicant, spouse
            ))
        })
}

/// Customer status implied by the applicant's own history.
pub fn customer_status(history: &DupcheckHistory) -> CustomerStatus {
    if !history.has_history() {
        return CustomerStatus::New;
    }
    match history.customer_status.as_deref().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("AO") => CustomerStatus::Ao,
        _ => CustomerStatus::Ro,
    }
}

/// Raw dupcheck replies for one application.
#[derive(Debug, Clone)]
pub struct DupcheckReplies {
    pub applicant: UpstreamReply,
    pub spouse: Option<UpstreamReply>,
}

/// Combines applicant and spouse histories into one stage result.
pub fn evaluate(replies: &DupcheckReplies) -> Result<DupcheckResult, AppError> {
    let applicant_history = DupcheckHistory::from_payload(&replies.applicant.payload)?;
    let applicant = classify(&DupcheckFacts::from_history(&applicant_history)?);

    let spouse = match &replies.spouse {
        Some(reply) => {
            let history = DupcheckHistory::from_payload(&reply.payload)?;
            Some(classify(&DupcheckFacts::from_history(&history)?))
        }
        None => None,
    };

    let row = lookup(applicant, spouse)?;
    let status = customer_status(&applicant_history);

    tracing::info!(
        "Blacklist: applicant={:?} spouse={:?} -> code {} {}",
        applicant,
        spouse,
        row.code,
        row.decision
    );

    Ok(DupcheckResult {
        code: row.code,
        decision: row.decision,
        reason: row.reason(),
        status_konsumen: status,
        category: None,
        next_process: row.decision == Decision::Pass,
        pbk_report: None,
        total_baki_debet: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn facts() -> DupcheckFacts {
        DupcheckFacts {
            has_history: true,
            bad_type: false,
            max_overdue_days: 0.0,
            assets_inventoried: 0.0,
            restructured: false,
        }
    }

    #[test]
    fn test_classification_priority() {
        let mut f = facts();
        assert_eq!(classify(&f), Finding::Clean);

        f.restructured = true;
        assert_eq!(classify(&f), Finding::Restructured);

        f.assets_inventoried = 1.0;
        assert_eq!(classify(&f), Finding::AssetInventoried);

        f.max_overdue_days = 61.0;
        assert_eq!(classify(&f), Finding::MaxOverdue);

        f.bad_type = true;
        assert_eq!(classify(&f), Finding::BadType);
    }

    #[test]
    fn test_overdue_threshold_is_exclusive() {
        let mut f = facts();
        f.max_overdue_days = 60.0;
        assert_eq!(classify(&f), Finding::Clean);
    }

    #[test]
    fn test_no_history() {
        let f = DupcheckFacts::from_history(&DupcheckHistory::default()).unwrap();
        assert_eq!(classify(&f), Finding::NoHistory);
    }

    #[test]
    fn test_matrix_is_total_and_unique() {
        let mut keys = HashSet::new();
        let mut codes = HashSet::new();
        for row in BLACKLIST_MATRIX.iter() {
            assert!(keys.insert((row.applicant, row.spouse)), "duplicate key {:?}", row);
            assert!(codes.insert(row.code), "duplicate code {}", row.code);
        }

        for applicant in Finding::ALL {
            assert!(lookup(applicant, None).is_ok());
            for spouse in Finding::ALL {
                assert!(lookup(applicant, Some(spouse)).is_ok());
            }
        }
    }

    #[test]
    fn test_matrix_decision_follows_worst_finding() {
        for applicant in Finding::ALL {
            for spouse in Finding::ALL {
                let row = lookup(applicant, Some(spouse)).unwrap();
                let expected = if applicant.is_reject() || spouse.is_reject() {
                    Decision::Reject
                } else {
                    Decision::Pass
                };
                assert_eq!(row.decision, expected, "{:?} / {:?}", applicant, spouse);
                assert_eq!(row.decision == Decision::Reject, row.worst().is_reject());
            }
        }
    }

    #[test]
    fn test_reason_concatenates_spouse() {
        let row = lookup(Finding::Clean, Some(Finding::NoHistory)).unwrap();
        assert_eq!(row.reason(), "Applicant Clean History & New Spouse");
        let row = lookup(Finding::NoHistory, None).unwrap();
        assert_eq!(row.reason(), "New Applicant");
    }

    #[test]
    fn test_evaluate_clean_without_spouse() {
        let replies = DupcheckReplies {
            applicant: UpstreamReply::ok(json!({
                "customer_id": "CUST-9",
                "customer_status": "AO",
                "max_overdue_days": "3",
                "total_contracts": 2
            })),
            spouse: None,
        };

        let result = evaluate(&replies).unwrap();
        assert_eq!(result.code, RiskCode(1050));
        assert_eq!(result.decision, Decision::Pass);
        assert_eq!(result.status_konsumen, CustomerStatus::Ao);
        assert!(result.next_process);
    }

    #[test]
    fn test_evaluate_spouse_bad_type_rejects() {
        let replies = DupcheckReplies {
            applicant: UpstreamReply::ok(serde_json::Value::Null),
            spouse: Some(UpstreamReply::ok(json!({
                "customer_id": "CUST-2",
                "bad_type": "B"
            }))),
        };

        let result = evaluate(&replies).unwrap();
        assert_eq!(result.code, RiskCode(1061));
        assert_eq!(result.decision, Decision::Reject);
        assert_eq!(result.status_konsumen, CustomerStatus::New);
        assert_eq!(result.reason, "New Applicant & Spouse Flagged Bad Type");
        assert!(!result.next_process);
    }

    #[test]
    fn test_evaluate_malformed_payload() {
        let replies = DupcheckReplies {
            applicant: UpstreamReply::ok(json!({"max_overdue_days": "lots"})),
            spouse: None,
        };
        assert!(matches!(evaluate(&replies), Err(AppError::DecodeError(_))));
    }
}
