//! Customer segmentation via the customer domain.

use crate::config::EvaluationSettings;
use crate::credit_bureau::PriorityReport;
use crate::errors::{AppError, ResultExt};
use crate::models::{CustomerCategory, CustomerStatus, Decision, DupcheckResult, Identity, RiskCode};
use crate::services::ExternalServiceClient;
use crate::upstream_models::{CustomerDomainResponse, UpstreamReply};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const CODE_CUSTOMER_NOT_FOUND: RiskCode = RiskCode(2001);
pub const CODE_RETURNING_REGULAR: RiskCode = RiskCode(2002);
pub const CODE_NEW_WITH_SEGMENT: RiskCode = RiskCode(2003);
pub const CODE_PREFERENTIAL: RiskCode = RiskCode(2004);

/// What the customer domain knows about an applicant.
#[derive(Debug, Clone, PartialEq)]
pub enum Segmentation {
    NotFound,
    Segment {
        category: CustomerCategory,
        name: String,
    },
}

impl Segmentation {
    /// Prime/Priority returning customers skip full bureau screening.
    pub fn is_preferential(&self, status: CustomerStatus) -> bool {
        match self {
            Segmentation::Segment { category, .. } => {
                category.is_preferential() && status.is_returning()
            }
            Segmentation::NotFound => false,
        }
    }
}

/// Reads the classification reply. HTTP 400 and the not-found codes mean
/// the customer is unknown to the domain.
pub fn segment(
    reply: &UpstreamReply,
    dummy_segment_name: Option<&str>,
) -> Result<Segmentation, AppError> {
    if reply.status == 400 {
        return Ok(Segmentation::NotFound);
    }

    let response = CustomerDomainResponse::from_payload(&reply.payload)?;
    if response.is_not_found() {
        return Ok(Segmentation::NotFound);
    }

    let mut name = response.first_segment_name();
    if name.is_empty() {
        if let Some(fallback) = dummy_segment_name {
            tracing::debug!("Empty segment name; using dummy segment {}", fallback);
            name = fallback.trim().to_string();
        }
    }

    Ok(Segmentation::Segment {
        category: CustomerCategory::from_segment_name(&name),
        name,
    })
}

/// Folds segmentation and the blacklist's customer status into a stage result.
/// `priority` carries the bureau report fetched for preferential customers.
pub fn evaluate(
    segmentation: &Segmentation,
    status: CustomerStatus,
    priority: Option<PriorityReport>,
) -> DupcheckResult {
    match segmentation {
        Segmentation::NotFound => DupcheckResult {
            code: CODE_CUSTOMER_NOT_FOUND,
            decision: Decision::Pass,
            reason: "New Customer - Not Registered in Customer Domain".to_string(),
            status_konsumen: CustomerStatus::New,
            category: None,
            next_process: true,
            pbk_report: None,
            total_baki_debet: None,
        },
        Segmentation::Segment { category, name } if segmentation.is_preferential(status) => {
            let report = priority.unwrap_or_default();
            DupcheckResult {
                code: CODE_PREFERENTIAL,
                decision: Decision::Pass,
                reason: format!("Returning {} Customer", name.to_ascii_uppercase()),
                status_konsumen: status,
                category: Some(*category),
                next_process: false,
                pbk_report: report.pbk_report,
                total_baki_debet: report.total_baki_debet,
            }
        }
        Segmentation::Segment { category, .. } if status.is_returning() => DupcheckResult {
            code: CODE_RETURNING_REGULAR,
            decision: Decision::Pass,
            reason: "Returning Customer".to_string(),
            status_konsumen: status,
            category: Some(*category),
            next_process: true,
            pbk_report: None,
            total_baki_debet: None,
        },
        Segmentation::Segment { category, .. } => DupcheckResult {
            code: CODE_NEW_WITH_SEGMENT,
            decision: Decision::Pass,
            reason: "New Customer".to_string(),
            status_konsumen: status,
            category: Some(*category),
            next_process: true,
            pbk_report: None,
            total_baki_debet: None,
        },
    }
}

/// Calls the customer domain with a cached access token.
pub struct CustomerCategoryClassifier {
    client: Arc<dyn ExternalServiceClient>,
    settings: EvaluationSettings,
    tokens: Cache<String, String>,
}

impl CustomerCategoryClassifier {
    pub fn new(
        client: Arc<dyn ExternalServiceClient>,
        settings: EvaluationSettings,
        token_ttl: Duration,
    ) -> Self {
        let tokens = Cache::builder()
            .time_to_live(token_ttl)
            .max_capacity(16)
            .build();

        Self {
            client,
            settings,
            tokens,
        }
    }

    /// Fallback segment name, only honoured in dummy mode.
    pub fn dummy_segment_name(&self) -> Option<&str> {
        if self.settings.dummy_enabled {
            self.settings.dummy_segment_name.as_deref()
        } else {
            None
        }
    }

    /// SHA-256 of the client-credential pair.
    fn credential_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.settings.customer_domain_client_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.settings.customer_domain_client_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Concurrent misses for the same credentials share one token request.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let client = self.client.clone();
        let client_id = self.settings.customer_domain_client_id.clone();
        let client_secret = self.settings.customer_domain_client_secret.clone();

        self.tokens
            .try_get_with(self.credential_key(), async move {
                let token = client
                    .fetch_customer_domain_token(&client_id, &client_secret)
                    .await?;
                Ok::<_, AppError>(token.access_token)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn fetch(&self, identity: &Identity) -> Result<UpstreamReply, AppError> {
        let token = self
            .access_token()
            .await
            .context("customer domain token")?;

        self.client
            .call_customer_classification(identity, &token)
            .await
            .context("customer classification")
    }
}
