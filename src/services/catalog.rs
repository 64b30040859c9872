//! Catalog browsing and cart pricing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::aggregates::{Cart, CartSnapshot, Product, ProductFilter, ProductStatus};
use crate::domain::value_objects::Won;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub category1: Option<String>,
    pub category2: Option<String>,
    pub brand: Option<String>,
    pub q: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductQuery {
    pub fn into_filter(self, include_hidden: bool) -> ApiResult<ProductFilter> {
        let blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let status = blank(self.status).map(|s| s.parse::<ProductStatus>()).transpose()?;
        Ok(ProductFilter {
            category1: blank(self.category1),
            category2: blank(self.category2),
            brand: blank(self.brand),
            keyword: self.q,
            status,
            include_hidden,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(0),
        }
        .normalised())
    }
}

/// A product as the storefront renders it.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub sale_price: Won,
    pub images: Vec<String>,
    pub thumbnail: Option<String>,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self { sale_price: product.sale_price(), images: product.image_paths(), thumbnail: product.thumbnail(), product }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

pub async fn search_products(state: &AppState, filter: ProductFilter) -> ApiResult<Page<ProductView>> {
    let (products, total) = state.repos.products.search(&filter).await?;
    Ok(Page { data: products.into_iter().map(ProductView::from).collect(), total, page: filter.page, per_page: filter.per_page })
}

pub async fn get_product(state: &AppState, id: i64) -> ApiResult<ProductView> {
    let product = state.repos.products.find(id).await?.ok_or(ApiError::NotFound("Product"))?;
    Ok(product.into())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub name: String,
    pub children: Vec<String>,
}

pub async fn list_categories(state: &AppState) -> ApiResult<Vec<CategoryNode>> {
    let mut tree: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (top, sub) in state.repos.products.category_pairs().await? {
        let children = tree.entry(top).or_default();
        if let Some(sub) = sub.filter(|s| !children.contains(s)) {
            children.push(sub);
        }
    }
    Ok(tree.into_iter().map(|(name, children)| CategoryNode { name, children }).collect())
}

pub async fn list_brands(state: &AppState) -> ApiResult<Vec<String>> {
    Ok(state.repos.products.brands().await?)
}

// ============ Cart ============

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub price: Won,
    pub discount_rate: u8,
    pub amount: Won,
    pub selected: bool,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartQuote {
    pub items: Vec<CartLine>,
    /// Items that can no longer be bought; the client should drop them.
    pub unavailable: Vec<i64>,
    pub subtotal: Won,
    /// The stored cart, migrated to the current schema and with unavailable items removed.
    pub snapshot: CartSnapshot,
}

pub async fn quote_cart(state: &AppState, raw: serde_json::Value) -> ApiResult<CartQuote> {
    let mut cart = Cart::from_snapshot(CartSnapshot::migrate(raw)?);
    let ids: Vec<i64> = cart.items().iter().map(|i| i.product_id).collect();
    let products = state.repos.products.find_many(&ids).await?;

    let mut items = Vec::new();
    let mut unavailable = Vec::new();
    for entry in cart.items() {
        match products.iter().find(|p| p.id == entry.product_id && p.is_available()) {
            Some(p) => items.push(CartLine {
                product_id: p.id,
                name: p.name.clone(),
                brand: p.brand.clone(),
                price: p.price,
                discount_rate: p.discount_rate,
                amount: p.sale_price(),
                selected: entry.selected,
                thumbnail: p.thumbnail(),
            }),
            None => unavailable.push(entry.product_id),
        }
    }
    for id in &unavailable {
        cart.remove(*id)?;
    }

    let subtotal = items.iter().filter(|l| l.selected).map(|l| l.amount).sum();
    Ok(CartQuote { items, unavailable, subtotal, snapshot: cart.snapshot() })
}
