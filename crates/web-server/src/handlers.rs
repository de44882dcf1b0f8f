use crate::{error::AppError, AppState};
use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    Form, Json,
};
use chrono::{SecondsFormat, Utc};
use database::{NewProduct, Product};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Body of `POST /api/products`.
///
/// Every field is optional at the serde level so that a missing field and a
/// present-but-falsy one (`"quantity": 0`) can be told apart during validation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

impl CreateProductRequest {
    pub fn validate(self) -> Result<NewProduct, AppError> {
        let missing = || AppError::Validation("Name, price, and quantity are required".to_string());

        let name = self.name.filter(|name| !name.trim().is_empty()).ok_or_else(missing)?;
        let price = self.price.ok_or_else(missing)?;
        let quantity = self.quantity.ok_or_else(missing)?;

        Ok(NewProduct {
            name,
            description: self.description,
            quantity,
            price,
            category: self.category,
        })
    }
}

/// The same body sent as `application/x-www-form-urlencoded`. Form values are
/// always text, so the numeric fields are parsed on conversion.
#[derive(Debug, Default, Deserialize)]
pub struct ProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
}

impl TryFrom<ProductForm> for CreateProductRequest {
    type Error = AppError;

    fn try_from(form: ProductForm) -> Result<Self, Self::Error> {
        let quantity = non_blank(form.quantity)
            .map(|quantity| quantity.parse::<i32>())
            .transpose()
            .map_err(|_| AppError::Validation("Quantity must be an integer".to_string()))?;
        let price = non_blank(form.price)
            .map(|price| Decimal::from_str(&price))
            .transpose()
            .map_err(|_| AppError::Validation("Price must be a number".to_string()))?;

        Ok(Self {
            name: form.name,
            description: form.description,
            quantity,
            price,
            category: form.category,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// A product body in either encoding the service accepts, picked by `Content-Type`.
/// Anything that is not a form goes through the JSON extractor, which rejects
/// a missing or foreign content type itself.
pub struct ProductPayload(pub CreateProductRequest);

#[async_trait]
impl<S> FromRequest<S> for ProductPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(req.headers()) {
            let Form(form) = Form::<ProductForm>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
            Ok(Self(form.try_into()?))
        } else {
            let Json(body) = Json::<CreateProductRequest>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
            Ok(Self(body))
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// How a `:id` path segment maps onto the INT primary key.
#[derive(Debug, PartialEq)]
enum ProductId {
    Row(i64),
    /// A number no row can carry: fractional, infinite or out of range.
    Unmatched,
}

/// Any numeric text is a valid id (`"42"`, `" 7 "`, `"1e2"`, `"1.5"`); only
/// text that is not a number at all is rejected.
fn parse_product_id(raw: &str) -> Result<ProductId, AppError> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(ProductId::Row(id));
    }

    let value = raw
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
        .ok_or_else(|| AppError::Validation("Valid product ID is required".to_string()))?;

    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(ProductId::Row(value as i64))
    } else {
        Ok(ProductId::Unmatched)
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: &'static str,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub database: &'static str,
    pub environment: EnvironmentInfo,
}

/// The connection target the supervisor is using. Never includes the password.
#[derive(Debug, Serialize)]
pub struct EnvironmentInfo {
    pub host: String,
    pub name: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub database: &'static str,
}

/// # GET /
pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Inventory API is running!",
        database: state.database_status(),
    })
}

/// # GET /api/health
/// Answers regardless of the database state.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        database: state.database_status(),
        environment: EnvironmentInfo {
            host: state.database.host.clone(),
            name: state.database.name.clone(),
            user: state.database.user.clone(),
        },
    })
}

/// # GET /api/products
/// Every product, newest first.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Product>>, AppError> {
    state.ensure_ready()?;

    let products = state
        .supervisor
        .list_products()
        .await
        .map_err(AppError::storage("Failed to fetch products"))?;

    tracing::info!("Found {} products", products.len());
    Ok(Json(products))
}

/// # POST /api/products
/// Accepts JSON or an urlencoded form.
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    payload: Result<ProductPayload, AppError>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    state.ensure_ready()?;

    let ProductPayload(request) = payload?;
    let product = request.validate()?;

    let id = state
        .supervisor
        .insert_product(&product)
        .await
        .map_err(AppError::storage("Failed to add product"))?;

    tracing::info!("Added new product: {}", product.name);
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Product added successfully",
            id,
        }),
    ))
}

/// # DELETE /api/products/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.ensure_ready()?;

    let id = match parse_product_id(&id)? {
        ProductId::Row(id) => id,
        ProductId::Unmatched => return Err(AppError::NotFound("Product not found".to_string())),
    };

    let affected = state
        .supervisor
        .delete_product(id)
        .await
        .map_err(AppError::storage("Failed to delete product"))?;

    if affected == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    tracing::info!("Deleted product with ID: {}", id);
    Ok(Json(MessageResponse {
        message: "Product deleted successfully",
    }))
}
