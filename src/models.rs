use crate::errors::AppError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

// ============ Decision vocabulary ============

/// Outcome of one decision-table branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Pass,
    Reject,
    NoHit,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pass => "PASS",
            Decision::Reject => "REJECT",
            Decision::NoHit => "NO_HIT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(Decision::Pass),
            "REJECT" => Ok(Decision::Reject),
            "NO_HIT" | "NOHIT" => Ok(Decision::NoHit),
            other => Err(AppError::DecodeError(format!("unknown decision '{}'", other))),
        }
    }
}

/// Stable identifier of one decision-table branch.
///
/// Families: 1xxx blacklist, 2xxx customer category, 3xxx credit bureau,
/// 4xxx elaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskCode(pub u16);

impl fmt::Display for RiskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Customer relationship with the lender: brand new, repeat order, or active obligor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    New,
    Ro,
    Ao,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::New => "NEW",
            CustomerStatus::Ro => "RO",
            CustomerStatus::Ao => "AO",
        }
    }

    pub fn is_returning(&self) -> bool {
        matches!(self, CustomerStatus::Ro | CustomerStatus::Ao)
    }
}

impl FromStr for CustomerStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(CustomerStatus::New),
            "RO" => Ok(CustomerStatus::Ro),
            "AO" => Ok(CustomerStatus::Ao),
            other => Err(AppError::DecodeError(format!(
                "unknown customer status '{}'",
                other
            ))),
        }
    }
}

/// Customer segmentation reported by the customer domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerCategory {
    Prime,
    Priority,
    Regular,
}

impl CustomerCategory {
    /// Maps a free-form segment name; anything that is not Prime/Priority is Regular.
    pub fn from_segment_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "PRIME" => CustomerCategory::Prime,
            "PRIORITY" => CustomerCategory::Priority,
            _ => CustomerCategory::Regular,
        }
    }

    pub fn is_preferential(&self) -> bool {
        matches!(self, CustomerCategory::Prime | CustomerCategory::Priority)
    }
}

/// BPKB (vehicle title) name relation to the borrower. Wire format: 0 / 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TitleOwnership {
    SameOwner,
    DifferentOwner,
}

impl TryFrom<u8> for TitleOwnership {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TitleOwnership::SameOwner),
            1 => Ok(TitleOwnership::DifferentOwner),
            other => Err(format!("bpkb_name_type must be 0 or 1, got {}", other)),
        }
    }
}

impl From<TitleOwnership> for u8 {
    fn from(value: TitleOwnership) -> Self {
        match value {
            TitleOwnership::SameOwner => 0,
            TitleOwnership::DifferentOwner => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

/// Vehicle age at the end of the tenor, bucketed at twelve years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleAgeBucket {
    #[serde(rename = "<=12", alias = "≤12")]
    UpTo12,
    #[serde(rename = ">12")]
    Over12,
}

impl VehicleAgeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleAgeBucket::UpTo12 => "<=12",
            VehicleAgeBucket::Over12 => ">12",
        }
    }
}

impl FromStr for VehicleAgeBucket {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<=12" | "≤12" => Ok(VehicleAgeBucket::UpTo12),
            ">12" => Ok(VehicleAgeBucket::Over12),
            other => Err(AppError::DecodeError(format!(
                "unknown vehicle age bucket '{}'",
                other
            ))),
        }
    }
}

/// Serializes a boolean flag as the integers 0 / 1 and accepts either form on input.
pub mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(u8),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Int(0) => Ok(false),
            Raw::Int(1) => Ok(true),
            Raw::Int(other) => Err(serde::de::Error::custom(format!(
                "flag must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

// ============ Applicant data ============

/// Identity fields shared by applicant and spouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// National ID number (NIK).
    pub id_number: String,
    pub legal_name: String,
    pub birth_date: NaiveDate,
    pub mother_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    #[serde(flatten)]
    pub identity: Identity,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    pub bpkb_name_type: TitleOwnership,
    pub manufacture_year: i32,
    /// Requested tenor in months.
    pub tenor: u32,
    #[serde(default)]
    pub outstanding_debt: Option<f64>,
    #[serde(default)]
    pub monthly_installment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpouseProfile {
    #[serde(flatten)]
    pub identity: Identity,
    pub gender: Gender,
}

/// Body of `POST /api/v1/filtering`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteringRequest {
    pub prospect_id: String,
    pub branch_id: String,
    pub applicant: ApplicantProfile,
    #[serde(default)]
    pub spouse: Option<SpouseProfile>,
}

static ID_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{16}$").expect("valid ID number regex"));

/// Oldest manufacture year the lender finances.
const MIN_MANUFACTURE_YEAR: i32 = 1980;

impl FilteringRequest {
    /// Rejects structurally valid JSON that the pipeline cannot evaluate.
    pub fn validate(&self, received_at: DateTime<Utc>) -> Result<(), AppError> {
        require_text("prospect_id", &self.prospect_id)?;
        require_text("branch_id", &self.branch_id)?;
        validate_identity("applicant", &self.applicant.identity, received_at)?;

        let applicant = &self.applicant;
        if applicant.tenor == 0 {
            return Err(AppError::BadRequest(
                "applicant.tenor must be greater than zero".to_string(),
            ));
        }
        if applicant.manufacture_year < MIN_MANUFACTURE_YEAR
            || applicant.manufacture_year > received_at.year()
        {
            return Err(AppError::BadRequest(format!(
                "applicant.manufacture_year must be between {} and {}",
                MIN_MANUFACTURE_YEAR,
                received_at.year()
            )));
        }
        for (field, value) in [
            ("applicant.outstanding_debt", applicant.outstanding_debt),
            ("applicant.monthly_installment", applicant.monthly_installment),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(AppError::BadRequest(format!(
                    "{} must be a non-negative number",
                    field
                )));
            }
        }

        match (applicant.marital_status, &self.spouse) {
            (MaritalStatus::Married, None) => Err(AppError::BadRequest(
                "spouse is required when marital_status is MARRIED".to_string(),
            )),
            (MaritalStatus::Married, Some(spouse)) => {
                validate_identity("spouse", &spouse.identity, received_at)?;
                if spouse.identity.id_number == applicant.identity.id_number {
                    return Err(AppError::BadRequest(
                        "spouse.id_number must differ from applicant.id_number".to_string(),
                    ));
                }
                Ok(())
            }
            (_, Some(_)) => Err(AppError::BadRequest(
                "spouse is only accepted when marital_status is MARRIED".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }

    /// Spouse view; only ever present for married applicants after validation.
    pub fn spouse(&self) -> Option<&SpouseProfile> {
        match self.applicant.marital_status {
            MaritalStatus::Married => self.spouse.as_ref(),
            _ => None,
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_identity(
    who: &str,
    identity: &Identity,
    received_at: DateTime<Utc>,
) -> Result<(), AppError> {
    if !ID_NUMBER.is_match(&identity.id_number) {
        return Err(AppError::BadRequest(format!(
            "{}.id_number must be 16 digits",
            who
        )));
    }
    require_text(&format!("{}.legal_name", who), &identity.legal_name)?;
    require_text(&format!("{}.mother_name", who), &identity.mother_name)?;
    if identity.birth_date >= received_at.date_naive() {
        return Err(AppError::BadRequest(format!(
            "{}.birth_date must be in the past",
            who
        )));
    }
    Ok(())
}

// ============ Stage results ============

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DupcheckResult {
    pub code: RiskCode,
    pub decision: Decision,
    pub reason: String,
    pub status_konsumen: CustomerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CustomerCategory>,
    #[serde(with = "flag")]
    pub next_process: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbk_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_baki_debet: Option<f64>,
}

/// Terminal answer of the filtering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteringResult {
    pub request_id: Uuid,
    pub code: RiskCode,
    pub decision: Decision,
    pub reason: String,
    pub status_konsumen: CustomerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CustomerCategory>,
    #[serde(with = "flag")]
    pub next_process: bool,
    #[serde(with = "flag")]
    pub is_blacklist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbk_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_baki_debet: Option<f64>,
}

// ============ Elaboration ============

/// Body of `POST /api/v1/elaboration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElaborateRequest {
    pub prospect_id: String,
    pub branch_id: String,
    pub customer_status: CustomerStatus,
    pub bpkb_name_type: TitleOwnership,
    /// Tenor in months.
    pub tenor: u32,
    pub vehicle_age: VehicleAgeBucket,
    /// Scaled loan-to-value; 0 means not supplied.
    pub ltv: i64,
    /// Outstanding non-collateral debt.
    pub baki_debet: f64,
    pub result_pefindo: Decision,
}

impl ElaborateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("prospect_id", &self.prospect_id)?;
        require_text("branch_id", &self.branch_id)?;
        if self.tenor == 0 {
            return Err(AppError::BadRequest(
                "tenor must be greater than zero".to_string(),
            ));
        }
        if self.ltv < 0 {
            return Err(AppError::BadRequest("ltv must not be negative".to_string()));
        }
        if !self.baki_debet.is_finite() || self.baki_debet < 0.0 {
            return Err(AppError::BadRequest(
                "baki_debet must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElaborateResult {
    pub request_id: Uuid,
    pub prospect_id: String,
    pub code: RiskCode,
    pub cluster: String,
    pub decision: Decision,
    pub reason: String,
    pub ltv_start: Option<i64>,
}

/// One row of the underwriting scheme table. Range bounds are inclusive;
/// a `None` end is open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeRow {
    pub id: i64,
    pub cluster: String,
    pub bureau_decision: Decision,
    pub bpkb_name_type: Option<TitleOwnership>,
    pub tenor_start: u32,
    pub tenor_end: Option<u32>,
    pub vehicle_age: Option<VehicleAgeBucket>,
    pub ltv_start: Option<i64>,
    pub ltv_end: Option<i64>,
    pub baki_debet_start: Option<f64>,
    pub baki_debet_end: Option<f64>,
    pub decision: Decision,
}

// ============ Audit records ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Filtering,
    Elaboration,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Filtering => "filtering",
            RecordKind::Elaboration => "elaboration",
        }
    }
}

/// States of the filtering state machine as persisted on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Intake,
    BlacklistChecked,
    CategoryChecked,
    BureauChecked,
    /// Bureau reported itself down; the application awaits a retry.
    BureauPending,
    Finalized,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Intake => "intake",
            PipelineStage::BlacklistChecked => "blacklist_checked",
            PipelineStage::CategoryChecked => "category_checked",
            PipelineStage::BureauChecked => "bureau_checked",
            PipelineStage::BureauPending => "bureau_pending",
            PipelineStage::Finalized => "finalized",
        }
    }
}

impl FromStr for PipelineStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(PipelineStage::Intake),
            "blacklist_checked" => Ok(PipelineStage::BlacklistChecked),
            "category_checked" => Ok(PipelineStage::CategoryChecked),
            "bureau_checked" => Ok(PipelineStage::BureauChecked),
            "bureau_pending" => Ok(PipelineStage::BureauPending),
            "finalized" => Ok(PipelineStage::Finalized),
            other => Err(AppError::DecodeError(format!("unknown stage '{}'", other))),
        }
    }
}

/// Which upstream a raw payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSource {
    DupcheckApplicant,
    DupcheckSpouse,
    CustomerDomain,
    Bureau,
}

impl RawSource {
    pub fn key(&self) -> &'static str {
        match self {
            RawSource::DupcheckApplicant => "dupcheck_applicant",
            RawSource::DupcheckSpouse => "dupcheck_spouse",
            RawSource::CustomerDomain => "customer_domain",
            RawSource::Bureau => "bureau",
        }
    }
}

/// One entry of the human-readable reason trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: PipelineStage,
    pub code: RiskCode,
    pub decision: Option<Decision>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Initial insert for a new audit record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub request_id: Uuid,
    pub kind: RecordKind,
    pub prospect_id: String,
    pub received_at: DateTime<Utc>,
    pub payload_hash: String,
    pub request_payload: Value,
}

impl NewRecord {
    /// Every submission gets a fresh request id, even for a byte-identical
    /// payload; the fingerprint is what ties resubmissions together.
    pub fn submission(
        kind: RecordKind,
        prospect_id: &str,
        received_at: DateTime<Utc>,
        request_payload: Value,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            prospect_id: prospect_id.to_string(),
            received_at,
            payload_hash: payload_fingerprint(&request_payload),
            request_payload,
        }
    }
}

/// Hex SHA-256 of the canonical JSON encoding of a payload.
pub fn payload_fingerprint(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Partial update applied to an existing record. Updates only ever add
/// information; nothing already written is removed.
#[derive(Debug, Clone)]
pub enum RecordPatch {
    RawResponse { source: RawSource, payload: Value },
    Stage { trace: StageTrace },
    Pending { trace: StageTrace },
    Finalized { trace: StageTrace, result: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub request_id: Uuid,
    pub kind: RecordKind,
    pub prospect_id: String,
    pub received_at: DateTime<Utc>,
    pub payload_hash: String,
    pub request_payload: Value,
    pub raw_responses: serde_json::Map<String, Value>,
    pub stage: PipelineStage,
    pub trail: Vec<StageTrace>,
    pub code: Option<RiskCode>,
    pub decision: Option<Decision>,
    pub reason: Option<String>,
    pub result: Option<Value>,
}

impl EvaluationRecord {
    pub fn new(record: NewRecord) -> Self {
        Self {
            request_id: record.request_id,
            kind: record.kind,
            prospect_id: record.prospect_id,
            received_at: record.received_at,
            payload_hash: record.payload_hash,
            request_payload: record.request_payload,
            raw_responses: serde_json::Map::new(),
            stage: PipelineStage::Intake,
            trail: Vec::new(),
            code: None,
            decision: None,
            reason: None,
            result: None,
        }
    }

    /// Applies a patch in memory with the same semantics as the SQL store.
    pub fn apply(&mut self, patch: RecordPatch) {
        match patch {
            RecordPatch::RawResponse { source, payload } => {
                self.raw_responses.insert(source.key().to_string(), payload);
            }
            RecordPatch::Stage { trace } | RecordPatch::Pending { trace } => {
                self.stage = trace.stage;
                self.code = Some(trace.code);
                self.decision = trace.decision;
                self.reason = Some(trace.reason.clone());
                self.trail.push(trace);
            }
            RecordPatch::Finalized { trace, result } => {
                self.stage = PipelineStage::Finalized;
                self.code = Some(trace.code);
                self.decision = trace.decision;
                self.reason = Some(trace.reason.clone());
                self.trail.push(trace);
                self.result = Some(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn request_json() -> Value {
        json!({
            "prospect_id": "SAL-0001",
            "branch_id": "426",
            "applicant": {
                "id_number": "3201010101900001",
                "legal_name": "BUDI SANTOSO",
                "birth_date": "1990-01-01",
                "mother_name": "SITI",
                "gender": "M",
                "marital_status": "SINGLE",
                "bpkb_name_type": 0,
                "manufacture_year": 2019,
                "tenor": 24
            }
        })
    }

    #[test]
    fn test_valid_single_request() {
        let req: FilteringRequest = serde_json::from_value(request_json()).unwrap();
        assert!(req.validate(now()).is_ok());
        assert_eq!(req.applicant.bpkb_name_type, TitleOwnership::SameOwner);
        assert!(req.spouse().is_none());
    }

    #[test]
    fn test_married_requires_spouse() {
        let mut raw = request_json();
        raw["applicant"]["marital_status"] = json!("MARRIED");
        let req: FilteringRequest = serde_json::from_value(raw).unwrap();
        assert!(matches!(req.validate(now()), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_spouse_rejected_when_single() {
        let mut raw = request_json();
        raw["spouse"] = json!({
            "id_number": "3201010101900002",
            "legal_name": "ANI",
            "birth_date": "1991-02-02",
            "mother_name": "WATI",
            "gender": "F"
        });
        let req: FilteringRequest = serde_json::from_value(raw).unwrap();
        assert!(matches!(req.validate(now()), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_bad_id_number() {
        let mut raw = request_json();
        raw["applicant"]["id_number"] = json!("12AB");
        let req: FilteringRequest = serde_json::from_value(raw).unwrap();
        let err = req.validate(now()).unwrap_err();
        assert!(err.to_string().contains("16 digits"));
    }

    #[test]
    fn test_future_manufacture_year() {
        let mut raw = request_json();
        raw["applicant"]["manufacture_year"] = json!(2031);
        let req: FilteringRequest = serde_json::from_value(raw).unwrap();
        assert!(req.validate(now()).is_err());
    }

    #[test]
    fn test_bpkb_name_type_out_of_range() {
        let mut raw = request_json();
        raw["applicant"]["bpkb_name_type"] = json!(2);
        assert!(serde_json::from_value::<FilteringRequest>(raw).is_err());
    }

    #[test]
    fn test_flag_serialization() {
        let result = DupcheckResult {
            code: RiskCode(1050),
            decision: Decision::Pass,
            reason: "ok".to_string(),
            status_konsumen: CustomerStatus::Ro,
            category: None,
            next_process: true,
            pbk_report: None,
            total_baki_debet: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["next_process"], json!(1));
        assert_eq!(value["code"], json!(1050));
        assert_eq!(value["decision"], json!("PASS"));
        assert_eq!(value["status_konsumen"], json!("RO"));

        let back: DupcheckResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_vehicle_age_accepts_unicode_alias() {
        let bucket: VehicleAgeBucket = serde_json::from_value(json!("≤12")).unwrap();
        assert_eq!(bucket, VehicleAgeBucket::UpTo12);
        assert_eq!(serde_json::to_value(bucket).unwrap(), json!("<=12"));
    }

    #[test]
    fn test_identical_submissions_get_distinct_ids() {
        let payload = request_json();
        let a = NewRecord::submission(RecordKind::Filtering, "SAL-0001", now(), payload.clone());
        let b = NewRecord::submission(RecordKind::Filtering, "SAL-0001", now(), payload);

        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_eq!(a.payload_hash.len(), 64);
    }

    #[test]
    fn test_segment_mapping() {
        assert_eq!(
            CustomerCategory::from_segment_name(" prime "),
            CustomerCategory::Prime
        );
        assert!(CustomerCategory::from_segment_name("PRIORITY").is_preferential());
        assert!(!CustomerCategory::from_segment_name("GOLD").is_preferential());
    }
}
