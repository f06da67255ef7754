//! Dish deconstruction models

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::prediction::Source;

#[derive(Debug, Deserialize, Validate)]
pub struct DeconstructRequest {
    #[validate(length(min = 1, max = 120), custom(function = "not_blank"))]
    pub food_name: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Remote answer to "what is this dish made of"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deconstruction {
    pub is_dish: bool,
    pub ingredients: Vec<String>,
    pub suggested_recipes: Vec<String>,
    pub reasoning: String,
}

/// `/deconstruct-dish` response body
#[derive(Debug, Serialize, Deserialize)]
pub struct DeconstructResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub food_name: String,
    pub deconstruction: Option<Deconstruction>,
    pub source: Option<Source>,
}
