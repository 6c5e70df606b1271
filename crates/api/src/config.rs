//! API server configuration

/// Server configuration loaded from the environment at boot.
///
/// Stripe/email/fulfillment secrets are read by their own services; this
/// struct only carries what the HTTP layer itself needs. Missing payment or
/// email configuration does not stop boot — the affected endpoints fail
/// closed at first use instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret for the internal analytics endpoints. When unset, those
    /// endpoints refuse all requests.
    pub admin_api_token: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let admin_api_token = std::env::var("ADMIN_API_TOKEN")
            .ok()
            .filter(|v| !v.is_empty());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            admin_api_token,
            allowed_origins,
        })
    }
}
