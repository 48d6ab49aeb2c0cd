use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    /// Price in minor currency units, must be positive.
    pub price: i64,
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub stock_quantity: i32,
    pub category_id: Uuid,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub image_url: Option<String>,
    pub is_available: Option<bool>,
    pub stock_quantity: Option<i32>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
