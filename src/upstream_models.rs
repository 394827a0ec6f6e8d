//! Payload shapes of the dupcheck, credit-bureau (PBK) and customer-domain services.
//!
//! Raw payloads are always persisted as received; these types are only the
//! typed view the evaluators read.

use crate::errors::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `(http_status, payload)` as returned by an upstream. An empty body is `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: u16,
    pub payload: Value,
}

impl UpstreamReply {
    pub fn ok(payload: Value) -> Self {
        Self {
            status: 200,
            payload,
        }
    }
}

// ============ Numeric coercion ============

/// A numeric field that upstreams send as a number, a numeric string, or null.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LooseNumber {
    #[default]
    Missing,
    Number(f64),
    Text(String),
}

impl LooseNumber {
    /// Normalizes to `f64`. Null, missing and blank strings mean "no value";
    /// a non-numeric string is a decode error.
    pub fn normalize(&self, field: &str) -> Result<Option<f64>, AppError> {
        match self {
            LooseNumber::Missing => Ok(None),
            LooseNumber::Number(n) => Ok(Some(*n)),
            LooseNumber::Text(s) if s.trim().is_empty() => Ok(None),
            LooseNumber::Text(s) => s
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| {
                    AppError::DecodeError(format!("{} is not numeric: '{}'", field, s))
                }),
        }
    }
}

impl<'de> Deserialize<'de> for LooseNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(LooseNumber::Missing),
            Value::Number(n) => n
                .as_f64()
                .map(LooseNumber::Number)
                .ok_or_else(|| serde::de::Error::custom("number out of range")),
            Value::String(s) => Ok(LooseNumber::Text(s)),
            other => Err(serde::de::Error::custom(format!(
                "expected number, string or null, got {}",
                other
            ))),
        }
    }
}

/// Flags and counts where upstreams send `null` for "none".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============ Dupcheck ============

/// Contract history returned by the dupcheck service for one person.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DupcheckHistory {
    #[serde(default)]
    pub customer_id: Option<String>,
    /// "RO" or "AO" when the person has contracts with the lender.
    #[serde(default)]
    pub customer_status: Option<String>,
    /// Non-empty when the person is flagged ("B" black, "W" warning).
    #[serde(default)]
    pub bad_type: Option<String>,
    #[serde(default)]
    pub max_overdue_days: LooseNumber,
    #[serde(default)]
    pub num_of_asset_inventoried: LooseNumber,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_restructure: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_contracts: u32,
}

impl DupcheckHistory {
    /// Decodes a raw payload; `null` or an empty object means no history.
    pub fn from_payload(payload: &Value) -> Result<Self, AppError> {
        match payload {
            Value::Null => Ok(Self::default()),
            Value::Object(map) if map.is_empty() => Ok(Self::default()),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                AppError::DecodeError(format!("dupcheck payload: {}", e))
            }),
        }
    }

    pub fn has_history(&self) -> bool {
        self.customer_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
            || self.total_contracts > 0
    }
}

// ============ Credit bureau (PBK) ============

/// Status carried in the bureau payload's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BureauStatus {
    Scored,
    Unscored,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BureauReport {
    #[serde(default)]
    pub code: LooseNumber,
    /// "PASS", "REJECT" or "UNSCORE".
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub max_overdue: LooseNumber,
    #[serde(default, alias = "max_overdue_last_12_months")]
    pub max_overdue_last12months: LooseNumber,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wo_contract: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wo_ada_agunan: bool,
    #[serde(default)]
    pub total_baki_debet_non_agunan: LooseNumber,
    #[serde(default)]
    pub pbk_report: Option<String>,
}

impl BureauReport {
    pub fn from_payload(payload: &Value) -> Result<Self, AppError> {
        match payload {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other.clone())
                .map_err(|e| AppError::DecodeError(format!("bureau payload: {}", e))),
        }
    }

    /// Missing code is treated as "no data".
    pub fn status(&self) -> Result<BureauStatus, AppError> {
        match self.code.normalize("code")?.map(|c| c as i64) {
            Some(200) => Ok(BureauStatus::Scored),
            Some(201) | None => Ok(BureauStatus::Unscored),
            Some(202) => Ok(BureauStatus::Down),
            Some(other) => Err(AppError::DecodeError(format!(
                "unknown bureau code {}",
                other
            ))),
        }
    }

    pub fn is_unscore(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("UNSCORE"))
    }

    pub fn total_debt(&self) -> Result<Option<f64>, AppError> {
        self.total_baki_debet_non_agunan
            .normalize("total_baki_debet_non_agunan")
    }

    pub fn report_link(&self) -> Option<String> {
        self.pbk_report
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

/// Subject of a bureau inquiry.
#[derive(Debug, Clone, Serialize)]
pub struct BureauSubject {
    pub id_number: String,
    pub legal_name: String,
    pub birth_date: String,
    pub mother_name: String,
    pub gender: String,
}

// ============ Customer domain ============

/// Codes the customer domain uses for "no such customer".
pub const CUSTOMER_NOT_FOUND_CODES: [&str; 2] = ["CUSTOMER-NOT-FOUND", "CORE-CUSTOMER-NOT-EXIST"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerDomainResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<CustomerDomainData>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerDomainData {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_segmentation: Vec<CustomerSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerSegment {
    #[serde(default)]
    pub segment_name: Option<String>,
}

impl CustomerDomainResponse {
    pub fn from_payload(payload: &Value) -> Result<Self, AppError> {
        match payload {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                AppError::DecodeError(format!("customer domain payload: {}", e))
            }),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| CUSTOMER_NOT_FOUND_CODES.contains(&code.trim()))
    }

    /// Name of the first listed segmentation entry, trimmed; empty when absent.
    pub fn first_segment_name(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.customer_segmentation.first())
            .and_then(|s| s.segment_name.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

/// Token issued by the customer-domain auth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loose_number_forms() {
        let report: BureauReport = serde_json::from_value(json!({
            "code": "200",
            "max_overdue": "12.5",
            "max_overdue_last12months": null
        }))
        .unwrap();

        assert_eq!(report.status().unwrap(), BureauStatus::Scored);
        assert_eq!(report.max_overdue.normalize("max_overdue").unwrap(), Some(12.5));
        assert_eq!(
            report
                .max_overdue_last12months
                .normalize("max_overdue_last12months")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_loose_number_rejects_garbage() {
        let n = LooseNumber::Text("abc".to_string());
        assert!(matches!(n.normalize("x"), Err(AppError::DecodeError(_))));
        assert_eq!(LooseNumber::Text("  ".to_string()).normalize("x").unwrap(), None);
    }

    #[test]
    fn test_loose_number_rejects_object() {
        let parsed: Result<BureauReport, _> =
            serde_json::from_value(json!({"max_overdue": {"days": 3}}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_bureau_status_codes() {
        let status = |code: Value| {
            BureauReport::from_payload(&json!({ "code": code }))
                .unwrap()
                .status()
                .unwrap()
        };
        assert_eq!(status(json!(200)), BureauStatus::Scored);
        assert_eq!(status(json!("201")), BureauStatus::Unscored);
        assert_eq!(status(json!(202)), BureauStatus::Down);
        assert!(BureauReport::from_payload(&json!({"code": 500}))
            .unwrap()
            .status()
            .is_err());
    }

    #[test]
    fn test_null_flags_and_counts_read_as_absent() {
        let history = DupcheckHistory::from_payload(&json!({
            "customer_id": "C1",
            "is_restructure": null,
            "total_contracts": null
        }))
        .unwrap();
        assert!(!history.is_restructure);
        assert_eq!(history.total_contracts, 0);
        assert!(history.has_history());

        let report = BureauReport::from_payload(&json!({
            "code": 200,
            "wo_contract": null,
            "wo_ada_agunan": null
        }))
        .unwrap();
        assert!(!report.wo_contract);
        assert!(!report.wo_ada_agunan);
    }

    #[test]
    fn test_non_boolean_flag_is_still_rejected() {
        assert!(BureauReport::from_payload(&json!({"wo_contract": "maybe"})).is_err());
    }

    #[test]
    fn test_dupcheck_empty_payload_is_no_history() {
        let history = DupcheckHistory::from_payload(&Value::Null).unwrap();
        assert!(!history.has_history());
        let history = DupcheckHistory::from_payload(&json!({})).unwrap();
        assert!(!history.has_history());
    }

    #[test]
    fn test_customer_domain_not_found_and_segment() {
        let resp = CustomerDomainResponse::from_payload(&json!({
            "code": "CUSTOMER-NOT-FOUND",
            "message": "customer not found"
        }))
        .unwrap();
        assert!(resp.is_not_found());

        let resp = CustomerDomainResponse::from_payload(&json!({
            "code": "OK",
            "data": {
                "customer_id": "C-1",
                "customer_segmentation": [
                    {"segment_name": " PRIME "},
                    {"segment_name": "REGULAR"}
                ]
            }
        }))
        .unwrap();
        assert!(!resp.is_not_found());
        assert_eq!(resp.first_segment_name(), "PRIME");
    }
}
