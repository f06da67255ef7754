//! Nutrition database
//!
//! Thin FatSecret client; responses are passed to callers untouched.

pub mod fatsecret;

pub use fatsecret::FatSecretClient;

#[derive(Debug, thiserror::Error)]
pub enum NutritionError {
    #[error("nutrition database credentials are not configured")]
    NotConfigured,
    #[error("{0}")]
    InvalidQuery(String),
    #[error("nutrition database request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("nutrition database returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected nutrition database response: {0}")]
    Parse(String),
}
