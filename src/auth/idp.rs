use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::IdpConfig;
use crate::error::AuthError;

const SIGNUP_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNIN_TIMEOUT: Duration = Duration::from_secs(10);
const USERINFO_TIMEOUT: Duration = Duration::from_secs(8);

/// What the provider knows about the holder of a token.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIdentity {
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    pub aud: Option<String>,
}

impl ExternalIdentity {
    /// Display name from the provider's metadata, falling back to the
    /// audience field when none was recorded.
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata
            .get("name")
            .and_then(Value::as_str)
            .or(self.aud.as_deref())
    }
}

/// Client for the external identity provider's auth endpoints. Every call
/// carries its own short timeout and fails soft: a bad response or a dead
/// network is reported, never raised as a crash.
#[derive(Clone)]
pub struct IdentityProvider {
    http: Client,
    base_url: Option<String>,
    anon_key: Option<String>,
    service_key: Option<String>,
}

impl IdentityProvider {
    pub fn new(cfg: &IdpConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: cfg
                .base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_owned()),
            anon_key: cfg.anon_key.clone(),
            service_key: cfg.service_key.clone(),
        }
    }

    /// Base URL and anon key are the minimum for any provider call.
    fn configured(&self) -> Option<(&str, &str)> {
        match (self.base_url.as_deref(), self.anon_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured().is_some()
    }

    /// Asks the provider who a token belongs to. Unconfigured provider,
    /// timeout, transport failure and non-success responses all mean
    /// "unknown token" here; delegation failure is not a hard error.
    pub async fn validate_token(&self, token: &str) -> Option<ExternalIdentity> {
        let (base, anon) = self.configured()?;

        let res = self
            .http
            .get(format!("{base}/auth/v1/user"))
            .bearer_auth(token)
            .header("apikey", anon)
            .timeout(USERINFO_TIMEOUT)
            .send()
            .await;

        let res = match res {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "idp user lookup failed");
                return None;
            }
        };
        if !res.status().is_success() {
            debug!(status = %res.status(), "idp rejected token");
            return None;
        }
        res.json::<ExternalIdentity>().await.ok()
    }

    /// Creates a user at the provider: via the admin endpoint when a
    /// service key is configured, else the self-signup endpoint.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Value, AuthError> {
        if let (Some(base), Some(service)) = (self.base_url.as_deref(), self.service_key.as_deref())
        {
            let mut payload = json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            });
            if let Some(name) = name {
                payload["user_metadata"] = json!({ "name": name });
            }
            let res = self
                .http
                .post(format!("{base}/auth/v1/admin/users"))
                .bearer_auth(service)
                .header("apikey", service)
                .json(&payload)
                .timeout(SIGNUP_TIMEOUT)
                .send()
                .await
                .map_err(|e| AuthError::Upstream(e.to_string()))?;
            return read_success(res).await;
        }

        let (base, anon) = self
            .configured()
            .ok_or_else(|| AuthError::Upstream("identity provider not configured".into()))?;
        let mut payload = json!({ "email": email, "password": password });
        if let Some(name) = name {
            payload["data"] = json!({ "name": name });
        }
        let res = self
            .http
            .post(format!("{base}/auth/v1/signup"))
            .header("apikey", anon)
            .json(&payload)
            .timeout(SIGNUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;
        read_success(res).await
    }

    /// Password sign-in at the provider's token endpoint.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Value, AuthError> {
        let (base, anon) = self
            .configured()
            .ok_or_else(|| AuthError::Upstream("identity provider not configured".into()))?;

        let res = self
            .http
            .post(format!("{base}/auth/v1/token?grant_type=password"))
            .header("apikey", anon)
            .json(&json!({ "email": email, "password": password }))
            .timeout(SIGNIN_TIMEOUT)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        if !res.status().is_success() {
            warn!(status = %res.status(), "idp sign-in rejected");
            return Err(AuthError::Unauthorized);
        }
        res.json::<Value>()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))
    }
}

async fn read_success(res: reqwest::Response) -> Result<Value, AuthError> {
    let status = res.status();
    if !status.is_success() {
        let detail = res.text().await.unwrap_or_default();
        warn!(%status, "idp call failed");
        return Err(AuthError::Upstream(format!("{status}: {detail}")));
    }
    res.json::<Value>()
        .await
        .map_err(|e| AuthError::Upstream(e.to_string()))
}
