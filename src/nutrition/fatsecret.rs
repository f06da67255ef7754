//! FatSecret platform API
//!
//! OAuth2 client-credentials token, cached until it is about to expire,
//! then form-encoded `server.api` calls with `format=json`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::NutritionError;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::remote::provider::truncate_body;

/// Refresh when less than this much validity remains
const REFRESH_MARGIN: Duration = Duration::from_secs(30);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const API_TIMEOUT: Duration = Duration::from_secs(30);
/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct Credentials {
    client_id: String,
    client_secret: String,
}

pub struct FatSecretClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    token_url: String,
    api_url: String,
    token: Mutex<Option<CachedToken>>,
    clock: Arc<dyn Clock>,
}

impl FatSecretClient {
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self::with_clock(config, http, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        let credentials = match (&config.fatsecret_client_id, &config.fatsecret_client_secret) {
            (Some(id), Some(secret)) => Some(Credentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };

        Self {
            http,
            credentials,
            token_url: config.fatsecret_token_url.clone(),
            api_url: config.fatsecret_api_url.clone(),
            token: Mutex::new(None),
            clock,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// `foods.search`
    pub async fn search_foods(&self, expression: &str) -> Result<Value, NutritionError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(NutritionError::InvalidQuery("search_expression must not be empty".to_string()));
        }
        self.call("foods.search", &[("search_expression", expression)]).await
    }

    /// `food.get`
    pub async fn get_food(&self, food_id: &str) -> Result<Value, NutritionError> {
        let food_id = food_id.trim();
        if !is_digits(food_id) {
            return Err(NutritionError::InvalidQuery("food_id must be numeric".to_string()));
        }
        self.call("food.get", &[("food_id", food_id)]).await
    }

    /// `food.find_id_for_barcode`
    pub async fn find_by_barcode(&self, barcode: &str) -> Result<Value, NutritionError> {
        let barcode = barcode.trim();
        if !is_digits(barcode) {
            return Err(NutritionError::InvalidQuery("barcode must contain only digits".to_string()));
        }
        self.call("food.find_id_for_barcode", &[("barcode", barcode)]).await
    }

    /// QR payloads resolve through the barcode lookup
    pub async fn find_by_qr(&self, payload: &str) -> Result<Value, NutritionError> {
        let barcode = barcode_from_qr(payload)
            .ok_or_else(|| NutritionError::InvalidQuery("QR code does not contain a barcode".to_string()))?;
        self.find_by_barcode(&barcode).await
    }

    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, NutritionError> {
        let token = self.access_token().await?;

        let mut form: Vec<(&str, &str)> = vec![("method", method), ("format", "json")];
        form.extend_from_slice(params);

        tracing::debug!("FatSecret call {}", method);
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(token)
            .form(&form)
            .timeout(API_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NutritionError::Status { status: status.as_u16(), body: truncate_body(body) });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| NutritionError::Parse(e.to_string()))
    }

    /// Cached token, fetching a new one when missing or near expiry
    async fn access_token(&self) -> Result<String, NutritionError> {
        let credentials = self.credentials.as_ref().ok_or(NutritionError::NotConfigured)?;

        // Held across the fetch so concurrent callers share one refresh
        let mut cached = self.token.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref().filter(|t| !needs_refresh(t.expires_at, now)) {
            return Ok(token.access_token.clone());
        }

        tracing::debug!("Fetching FatSecret access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "basic")])
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NutritionError::Status { status: status.as_u16(), body: truncate_body(body) });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| NutritionError::Parse(e.to_string()))?;

        let expires_in = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        let fresh = CachedToken {
            access_token: token.access_token,
            expires_at: self.clock.now() + expires_in,
        };
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

fn needs_refresh(expires_at: Instant, now: Instant) -> bool {
    expires_at.saturating_duration_since(now) <= REFRESH_MARGIN
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// A bare code, or the longest digit run in a URL-style payload
fn barcode_from_qr(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if is_digits(payload) {
        return Some(payload.to_string());
    }

    payload
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| (8..=14).contains(&run.len()))
        .max_by_key(|run| run.len())
        .map(str::to_string)
}
