use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::Identity;
use crate::upstream_models::{AccessToken, BureauSubject, UpstreamReply};
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

/// Outbound calls the filtering pipeline depends on.
///
/// Every call is timeout-bound. A timeout, transport failure or non-tolerated
/// status is `UpstreamUnavailable`; a body that is not JSON is `DecodeError`;
/// an empty body is `Ok` with a `Value::Null` payload.
#[async_trait]
pub trait ExternalServiceClient: Send + Sync {
    async fn call_dupcheck(&self, identity: &Identity) -> Result<UpstreamReply, AppError>;

    async fn call_bureau(
        &self,
        prospect_id: &str,
        applicant: &BureauSubject,
        spouse: Option<&BureauSubject>,
    ) -> Result<UpstreamReply, AppError>;

    /// HTTP 400 is tolerated: the customer domain answers it for unknown customers.
    async fn call_customer_classification(
        &self,
        identity: &Identity,
        access_token: &str,
    ) -> Result<UpstreamReply, AppError>;

    async fn fetch_customer_domain_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AccessToken, AppError>;
}

/// reqwest implementation talking to the real services.
pub struct HttpServiceClient {
    client: Client,
    dupcheck_base_url: String,
    bureau_base_url: String,
    customer_domain_base_url: String,
    dupcheck_breaker: UpstreamBreaker,
    bureau_breaker: UpstreamBreaker,
    customer_domain_breaker: UpstreamBreaker,
}

impl HttpServiceClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::with_urls(
            config.dupcheck_base_url.clone(),
            config.bureau_base_url.clone(),
            config.customer_domain_base_url.clone(),
            config.upstream_timeout(),
        )
    }

    pub fn with_urls(
        dupcheck_base_url: String,
        bureau_base_url: String,
        customer_domain_base_url: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create upstream client: {}", e))
        })?;

        Ok(Self {
            client,
            dupcheck_base_url,
            bureau_base_url,
            customer_domain_base_url,
            dupcheck_breaker: create_upstream_circuit_breaker(),
            bureau_breaker: create_upstream_circuit_breaker(),
            customer_domain_breaker: create_upstream_circuit_breaker(),
        })
    }

    /// Sends one request through the service's circuit breaker.
    async fn send(
        &self,
        breaker: &UpstreamBreaker,
        service: &'static str,
        request: RequestBuilder,
        tolerated: &'static [u16],
    ) -> Result<UpstreamReply, AppError> {
        let call = async move {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamUnavailable(format!("{} timed out", service))
                } else {
                    AppError::UpstreamUnavailable(format!("{} request failed: {}", service, e))
                }
            })?;

            let status = response.status().as_u16();
            if !tolerated.contains(&status) {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!("{} returned error {}: {}", service, status, error_text);
                return Err(AppError::UpstreamUnavailable(format!(
                    "{} returned status {}",
                    service, status
                )));
            }

            let body = response.bytes().await.map_err(|e| {
                AppError::UpstreamUnavailable(format!("{} body read failed: {}", service, e))
            })?;

            let payload = if body.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                match serde_json::from_slice(&body) {
                    Ok(payload) => payload,
                    // Tolerated error statuses are judged by status alone
                    Err(_) if !(200..300).contains(&status) => {
                        Value::String(String::from_utf8_lossy(&body).trim().to_string())
                    }
                    Err(e) => {
                        return Err(AppError::DecodeError(format!(
                            "Failed to parse {} response: {}",
                            service, e
                        )))
                    }
                }
            };

            tracing::debug!("{} replied {} ({} bytes)", service, status, body.len());
            Ok(UpstreamReply { status, payload })
        };

        match breaker.call_with(is_outage, call).await {
            Ok(reply) => Ok(reply),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("{} circuit open, failing fast", service);
                Err(AppError::UpstreamUnavailable(format!(
                    "{} circuit open",
                    service
                )))
            }
        }
    }
}

#[async_trait]
impl ExternalServiceClient for HttpServiceClient {
    async fn call_dupcheck(&self, identity: &Identity) -> Result<UpstreamReply, AppError> {
        let url = format!("{}/api/v1/dupcheck", self.dupcheck_base_url);
        tracing::info!("Calling dupcheck for ID ending {}", id_suffix(&identity.id_number));

        let request = self.client.post(&url).json(identity);
        self.send(&self.dupcheck_breaker, "dupcheck", request, &[200])
            .await
    }

    async fn call_bureau(
        &self,
        prospect_id: &str,
        applicant: &BureauSubject,
        spouse: Option<&BureauSubject>,
    ) -> Result<UpstreamReply, AppError> {
        let url = format!("{}/api/v1/pbk", self.bureau_base_url);
        tracing::info!(
            "Calling PBK for prospect {} (spouse: {})",
            prospect_id,
            spouse.is_some()
        );

        let body = json!({
            "prospect_id": prospect_id,
            "applicant": applicant,
            "spouse": spouse,
        });

        let request = self.client.post(&url).json(&body);
        self.send(&self.bureau_breaker, "pbk", request, &[200]).await
    }

    async fn call_customer_classification(
        &self,
        identity: &Identity,
        access_token: &str,
    ) -> Result<UpstreamReply, AppError> {
        let url = format!(
            "{}/api/v1/customers/segmentation",
            self.customer_domain_base_url
        );
        tracing::info!(
            "Calling customer domain for ID ending {}",
            id_suffix(&identity.id_number)
        );

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&json!({
                "id_number": identity.id_number,
                "legal_name": identity.legal_name,
                "birth_date": identity.birth_date,
                "mother_name": identity.mother_name,
            }));

        self.send(
            &self.customer_domain_breaker,
            "customer domain",
            request,
            &[200, 400],
        )
        .await
    }

    async fn fetch_customer_domain_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AccessToken, AppError> {
        let url = format!("{}/api/v1/auth/token", self.customer_domain_base_url);
        tracing::info!("Requesting customer domain token for client {}", client_id);

        let request = self.client.post(&url).json(&json!({
            "client_id": client_id,
            "client_secret": client_secret,
        }));

        let reply = self
            .send(
                &self.customer_domain_breaker,
                "customer domain auth",
                request,
                &[200],
            )
            .await?;

        let token: AccessToken = serde_json::from_value(reply.payload).map_err(|e| {
            AppError::DecodeError(format!("Failed to parse token response: {}", e))
        })?;

        if token.access_token.trim().is_empty() {
            return Err(AppError::DecodeError(
                "customer domain returned an empty access token".to_string(),
            ));
        }

        Ok(token)
    }
}

/// Only outages count toward opening a circuit; a malformed payload from a
/// reachable service does not.
fn is_outage(err: &AppError) -> bool {
    matches!(err, AppError::UpstreamUnavailable(_))
}

/// Last four digits of an ID number; full numbers never reach the logs.
fn id_suffix(id_number: &str) -> &str {
    let len = id_number.len();
    id_number.get(len.saturating_sub(4)..).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpServiceClient::with_urls(
            "https://dupcheck.example.com".to_string(),
            "https://pbk.example.com".to_string(),
            "https://customer.example.com".to_string(),
            Duration::from_secs(10),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_id_suffix() {
        assert_eq!(id_suffix("3201010101900001"), "0001");
        assert_eq!(id_suffix("12"), "12");
    }
}
