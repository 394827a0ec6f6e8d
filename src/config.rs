use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub api_key: Option<String>, // Optional: unset disables the X-Api-Key guard
    pub dupcheck_base_url: String,
    pub bureau_base_url: String,
    pub customer_domain_base_url: String,
    pub customer_domain_client_id: String,
    pub customer_domain_client_secret: String,
    pub upstream_timeout_secs: u64,
    pub bureau_enabled: bool,
    pub dummy_enabled: bool,
    pub dummy_segment_name: Option<String>,
    pub auth_cache_ttl_secs: u64,
    pub cluster_cache_ttl_secs: u64,
}

/// Knobs the filtering pipeline reads on every request.
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    /// When false the bureau is never called and the stage resolves to NO_HIT.
    pub bureau_enabled: bool,
    /// Substitute stored dummy payloads for live bureau calls and allow the
    /// fallback segment name.
    pub dummy_enabled: bool,
    pub dummy_segment_name: Option<String>,
    pub customer_domain_client_id: String,
    pub customer_domain_client_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            api_key: std::env::var("API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            dupcheck_base_url: required_url("DUPCHECK_BASE_URL")?,
            bureau_base_url: required_url("PBK_BASE_URL")?,
            customer_domain_base_url: required_url("CUSTOMER_DOMAIN_BASE_URL")?,
            customer_domain_client_id: required("CUSTOMER_DOMAIN_CLIENT_ID")?,
            customer_domain_client_secret: required("CUSTOMER_DOMAIN_CLIENT_SECRET")?,
            upstream_timeout_secs: parse_or("UPSTREAM_TIMEOUT_SECS", 10)?,
            bureau_enabled: flag_or("PBK_ENABLED", true)?,
            dummy_enabled: flag_or("DUMMY_ENABLED", false)?,
            dummy_segment_name: std::env::var("DUMMY_SEGMENT_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            auth_cache_ttl_secs: parse_or("AUTH_CACHE_TTL_SECS", 3000)?,
            cluster_cache_ttl_secs: parse_or("CLUSTER_CACHE_TTL_SECS", 3600)?,
        };

        if config.upstream_timeout_secs == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_SECS must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Dupcheck Base URL: {}", config.dupcheck_base_url);
        tracing::debug!("PBK Base URL: {}", config.bureau_base_url);
        tracing::debug!(
            "Customer Domain Base URL: {}",
            config.customer_domain_base_url
        );
        tracing::info!(
            "PBK enabled: {}, dummy data: {}, upstream timeout: {}s",
            config.bureau_enabled,
            config.dummy_enabled,
            config.upstream_timeout_secs
        );
        if config.api_key.is_none() {
            tracing::warn!("API_KEY not set - inbound requests are not authenticated");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn evaluation_settings(&self) -> EvaluationSettings {
        EvaluationSettings {
            bureau_enabled: self.bureau_enabled,
            dummy_enabled: self.dummy_enabled,
            dummy_segment_name: self.dummy_segment_name.clone(),
            customer_domain_client_id: self.customer_domain_client_id.clone(),
            customer_domain_client_secret: self.customer_domain_client_secret.clone(),
        }
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn required_url(name: &str) -> anyhow::Result<String> {
    required(name).and_then(|url| {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must start with http:// or https://", name);
        }
        Ok(url.trim_end_matches('/').to_string())
    })
}

fn parse_or(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a positive integer", name)),
        _ => Ok(default),
    }
}

fn flag_or(name: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_flag(&raw)
            .ok_or_else(|| anyhow::anyhow!("{} must be one of true/false/1/0", name)),
        _ => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 1 "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
