//! Operator-side product and order management.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::render_description;
use crate::domain::aggregates::{DeliveryStatus, NewProduct, Order, OrderStatus, Product, ProductFilter, ProductStatus, Recipient};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::Won;
use crate::error::{ApiError, ApiResult};
use crate::services::catalog::{Page, ProductView};
use crate::services::checkout::{load_order, OrderView};
use crate::AppState;

// ============ Products ============

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductForm {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "brand is required"))]
    pub brand: String,
    #[validate(length(min = 1, message = "category1 is required"))]
    pub category1: String,
    #[serde(default)]
    pub category2: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub purchase_price: i64,
    #[serde(default)]
    pub discount_rate: u8,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub summary: Option<String>,
}

fn check_prices(price: Option<i64>, purchase_price: Option<i64>, discount_rate: Option<u8>) -> ApiResult<()> {
    if price.is_some_and(|p| p <= 0) {
        return Err(ApiError::validation("price must be positive"));
    }
    if purchase_price.is_some_and(|p| p < 0) {
        return Err(ApiError::validation("purchase price cannot be negative"));
    }
    if discount_rate.is_some_and(|r| r > 100) {
        return Err(ApiError::validation("discount rate is a percentage"));
    }
    Ok(())
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ProductForm {
    fn into_new_product(self) -> NewProduct {
        NewProduct {
            name: self.name.trim().to_string(),
            brand: self.brand.trim().to_string(),
            category1: self.category1.trim().to_string(),
            category2: clean(self.category2),
            size: clean(self.size),
            price: Won::new(self.price),
            purchase_price: Won::new(self.purchase_price),
            discount_rate: self.discount_rate,
            condition: clean(self.condition),
            status: self.status.unwrap_or(ProductStatus::Preparing),
            image_count: self.image_count,
            summary: self.summary.unwrap_or_default(),
        }
    }
}

/// Insert, then write the description once the id (and so the image paths) is known.
pub async fn create_product(state: &AppState, form: ProductForm) -> ApiResult<Product> {
    let mut form = form;
    form.name = form.name.trim().to_string();
    form.brand = form.brand.trim().to_string();
    form.category1 = form.category1.trim().to_string();
    form.validate()?;
    check_prices(Some(form.price), Some(form.purchase_price), Some(form.discount_rate))?;

    let new = form.into_new_product();
    let mut product = state.repos.products.insert(&new, state.clock.now()).await?;
    product.description = render_description(product.id, &product.name, &new.summary, product.image_count);
    state.repos.products.save(&product).await?;

    tracing::info!(product_id = product.id, status = %product.status, images = product.image_count, "product created");
    state.events.publish_all(vec![DomainEvent::Product(ProductEvent::Created { product_id: product.id })]).await;
    Ok(product)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category1: Option<String>,
    pub category2: Option<String>,
    pub size: Option<String>,
    pub price: Option<i64>,
    pub purchase_price: Option<i64>,
    pub discount_rate: Option<u8>,
    pub condition: Option<String>,
    pub status: Option<ProductStatus>,
    pub image_count: Option<u32>,
    /// Explicit HTML; wins over regeneration.
    pub description: Option<String>,
    /// Blurb for a regenerated description.
    pub summary: Option<String>,
}

/// Field-level edit. The description is rebuilt from the template when the image
/// count or summary changes and no explicit description was sent.
pub async fn update_product(state: &AppState, id: i64, patch: ProductPatch) -> ApiResult<Product> {
    let mut product = state.repos.products.find(id).await?.ok_or(ApiError::NotFound("Product"))?;

    // Blank values for required fields are ignored rather than clearing them.
    if let Some(name) = clean(patch.name) { product.name = name; }
    if let Some(brand) = clean(patch.brand) { product.brand = brand; }
    if let Some(category1) = clean(patch.category1) { product.category1 = category1; }
    if patch.category2.is_some() { product.category2 = clean(patch.category2); }
    if patch.size.is_some() { product.size = clean(patch.size); }
    if patch.condition.is_some() { product.condition = clean(patch.condition); }
    check_prices(patch.price, patch.purchase_price, patch.discount_rate)?;
    if let Some(price) = patch.price { product.price = Won::new(price); }
    if let Some(purchase_price) = patch.purchase_price { product.purchase_price = Won::new(purchase_price); }
    if let Some(rate) = patch.discount_rate { product.discount_rate = rate; }
    let previous_status = product.status;
    if let Some(status) = patch.status { product.status = status; }

    let images_changed = patch.image_count.is_some_and(|n| n != product.image_count);
    if let Some(count) = patch.image_count { product.image_count = count; }
    match patch.description {
        Some(html) => product.description = html,
        None if images_changed || patch.summary.is_some() => {
            product.description = render_description(product.id, &product.name, patch.summary.as_deref().unwrap_or_default(), product.image_count);
        }
        None => {}
    }

    state.repos.products.save(&product).await?;
    tracing::info!(product_id = id, "product updated");
    if product.status != previous_status {
        state.events.publish_all(vec![DomainEvent::Product(ProductEvent::StatusChanged { product_id: id, status: product.status })]).await;
    }
    Ok(product)
}

/// Any status may be set; no transition rules apply to operators.
pub async fn set_product_status(state: &AppState, id: i64, status: ProductStatus) -> ApiResult<()> {
    if state.repos.products.set_status(&[id], status).await? == 0 {
        return Err(ApiError::NotFound("Product"));
    }
    tracing::info!(product_id = id, %status, "product status set");
    state.events.publish_all(vec![DomainEvent::Product(ProductEvent::StatusChanged { product_id: id, status })]).await;
    Ok(())
}

pub async fn list_products(state: &AppState, filter: ProductFilter) -> ApiResult<Page<ProductView>> {
    crate::services::catalog::search_products(state, ProductFilter { include_hidden: true, ..filter }).await
}

// ============ Orders ============

pub async fn list_orders(state: &AppState, status: Option<OrderStatus>) -> ApiResult<Vec<OrderView>> {
    Ok(state.repos.orders.list(status).await?.into_iter().map(OrderView::from).collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub address_detail: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    /// `{ "status": "in_transit", "tracking_number": "..." }` and friends.
    pub delivery: Option<DeliveryStatus>,
    pub recipient: Option<RecipientPatch>,
}

fn apply_recipient(current: Option<Recipient>, patch: RecipientPatch) -> Recipient {
    let mut recipient = current.unwrap_or_default();
    if let Some(v) = clean(patch.name) { recipient.name = v; }
    if let Some(v) = clean(patch.phone) { recipient.phone = v; }
    if let Some(v) = clean(patch.postal_code) { recipient.postal_code = v; }
    if let Some(v) = clean(patch.address) { recipient.address = v; }
    if patch.address_detail.is_some() { recipient.address_detail = clean(patch.address_detail); }
    if patch.memo.is_some() { recipient.memo = clean(patch.memo); }
    recipient
}

pub async fn update_order(state: &AppState, id: Uuid, patch: OrderPatch) -> ApiResult<OrderView> {
    let mut order: Order = load_order(state, id).await?;
    let now = state.clock.now();
    if let Some(status) = patch.status { order.force_status(status, now); }
    if let Some(delivery) = patch.delivery { order.set_delivery(delivery, now); }
    if let Some(recipient) = patch.recipient {
        order.recipient = Some(apply_recipient(order.recipient.take(), recipient));
    }

    if !state.repos.orders.update(&order).await? {
        return Err(ApiError::Conflict("order was changed by another request; reload and try again".into()));
    }
    tracing::info!(order_id = %id, status = %order.status, delivery = order.delivery.label(), "order updated by operator");
    state.events.publish_all(order.take_events()).await;
    order.version += 1;
    Ok(order.into())
}
