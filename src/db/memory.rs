//! In-process store with the same semantics as the PostgreSQL one, including the
//! conditional writes. Used by tests and by development without `DATABASE_URL`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::repository::*;
use crate::domain::aggregates::{
    BuyerIdentity, NewProduct, NewReview, Order, OrderStatus, Product, ProductFilter, ProductStatus, Review,
    ReviewToken, User, VerificationCode,
};
use crate::reporting::{CartLog, OrderFact, PageView};

#[derive(Default)]
struct State {
    products: Vec<Product>,
    next_product_id: i64,
    orders: HashMap<Uuid, Order>,
    users: HashMap<String, User>,
    codes: Vec<VerificationCode>,
    tokens: Vec<ReviewToken>,
    reviews: Vec<Review>,
    page_views: Vec<PageView>,
    cart_logs: Vec<CartLog>,
    steps: HashMap<(Uuid, PaymentStep), StepRow>,
}

struct StepRow {
    payment_key: String,
    done: bool,
    claimed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Store a fully-formed product as-is; used to seed fixtures.
    pub fn put_product(&self, product: Product) -> Result<()> {
        let mut state = self.lock()?;
        state.next_product_id = state.next_product_id.max(product.id);
        state.products.retain(|p| p.id != product.id);
        state.products.push(product);
        Ok(())
    }

    pub fn put_order(&self, order: Order) -> Result<()> {
        self.lock()?.orders.insert(order.id, order);
        Ok(())
    }
}

fn newest_first(products: &mut [Product]) {
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn insert(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let mut state = self.lock()?;
        state.next_product_id += 1;
        let stored = Product {
            id: state.next_product_id,
            name: product.name.clone(),
            brand: product.brand.clone(),
            category1: product.category1.clone(),
            category2: product.category2.clone(),
            size: product.size.clone(),
            price: product.price,
            purchase_price: product.purchase_price,
            discount_rate: product.discount_rate,
            condition: product.condition.clone(),
            description: String::new(),
            status: product.status,
            image_count: product.image_count,
            created_at: now,
        };
        state.products.push(stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.lock()?.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<Product>> {
        Ok(self.lock()?.products.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn search(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)> {
        let mut hits: Vec<Product> = self.lock()?.products.iter().filter(|p| filter.matches(p)).cloned().collect();
        newest_first(&mut hits);
        let total = hits.len() as i64;
        let page = hits.into_iter().skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX)).take(filter.per_page as usize).collect();
        Ok((page, total))
    }

    async fn save(&self, product: &Product) -> Result<()> {
        let mut state = self.lock()?;
        let slot = state.products.iter_mut().find(|p| p.id == product.id).ok_or_else(|| anyhow!("product {} not found", product.id))?;
        *slot = product.clone();
        Ok(())
    }

    async fn set_status(&self, ids: &[i64], status: ProductStatus) -> Result<u64> {
        let mut state = self.lock()?;
        let mut changed = 0;
        for product in state.products.iter_mut().filter(|p| ids.contains(&p.id)) {
            product.status = status;
            changed += 1;
        }
        Ok(changed)
    }

    async fn category_pairs(&self) -> Result<Vec<(String, Option<String>)>> {
        let visible = ProductFilter::default();
        let pairs: BTreeSet<(String, Option<String>)> = self
            .lock()?
            .products
            .iter()
            .filter(|p| visible.matches(p))
            .map(|p| (p.category1.clone(), p.category2.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn brands(&self) -> Result<Vec<String>> {
        let visible = ProductFilter::default();
        let brands: BTreeSet<String> = self.lock()?.products.iter().filter(|p| visible.matches(p)).map(|p| p.brand.clone()).collect();
        Ok(brands.into_iter().collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut state = self.lock()?;
        if state.orders.contains_key(&order.id) { return Err(anyhow!("order {} already exists", order.id)); }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(stored) = state.orders.get_mut(&order.id) else { return Ok(false) };
        if stored.version != order.version { return Ok(false); }
        let mut next = order.clone();
        next.version += 1;
        next.events.clear();
        *stored = next;
        Ok(true)
    }

    async fn list_for_buyer(&self, buyer: &BuyerIdentity) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .lock()?
            .orders
            .values()
            .filter(|o| o.status != OrderStatus::Temp && o.is_owned_by(buyer))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.lock()?.orders.values().filter(|o| status.map_or(true, |s| o.status == s)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn facts_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<OrderFact>> {
        Ok(self
            .lock()?
            .orders
            .values()
            .filter(|o| o.created_at >= from && o.created_at < to)
            .map(|o| OrderFact { status: o.status, created_at: o.created_at })
            .collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert(&self, user: &User) -> Result<User> {
        let mut state = self.lock()?;
        let stored = match state.users.get(&user.kakao_id) {
            Some(existing) => User { created_at: existing.created_at, ..user.clone() },
            None => user.clone(),
        };
        state.users.insert(stored.kakao_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, kakao_id: &str) -> Result<Option<User>> {
        Ok(self.lock()?.users.get(kakao_id).cloned())
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.lock()?.users.insert(user.kakao_id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl VerificationRepository for MemoryStore {
    async fn insert(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<VerificationCode> {
        let mut state = self.lock()?;
        let row = VerificationCode { id: state.codes.len() as i64 + 1, phone: phone.to_string(), code: code.to_string(), verified: false, created_at: now };
        state.codes.push(row.clone());
        Ok(row)
    }

    async fn latest_unverified(&self, phone: &str, code: &str) -> Result<Option<VerificationCode>> {
        let state = self.lock()?;
        Ok(crate::domain::aggregates::verification::latest_match(&state.codes, phone, code).cloned())
    }

    async fn mark_verified(&self, id: i64) -> Result<bool> {
        let mut state = self.lock()?;
        match state.codes.iter_mut().find(|c| c.id == id && !c.verified) {
            Some(row) => { row.verified = true; Ok(true) }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn insert_token(&self, token: &ReviewToken) -> Result<ReviewToken> {
        let mut state = self.lock()?;
        if let Some(existing) = state.tokens.iter().find(|t| t.order_id == token.order_id && t.product_id == token.product_id) {
            return Ok(existing.clone());
        }
        state.tokens.push(token.clone());
        Ok(token.clone())
    }

    async fn find_token(&self, token: &str) -> Result<Option<ReviewToken>> {
        Ok(self.lock()?.tokens.iter().find(|t| t.token == token).cloned())
    }

    async fn mark_token_used(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        match state.tokens.iter_mut().find(|t| t.token == token && t.used_at.is_none()) {
            Some(row) => { row.used_at = Some(now); Ok(true) }
            None => Ok(false),
        }
    }

    async fn find_for_product(&self, product_id: i64) -> Result<Option<Review>> {
        Ok(self.lock()?.reviews.iter().filter(|r| r.product_id == product_id).min_by_key(|r| r.id).cloned())
    }

    async fn insert_review(&self, review: &NewReview, now: DateTime<Utc>) -> Result<Option<Review>> {
        let mut state = self.lock()?;
        if state.reviews.iter().any(|r| r.product_id == review.product_id) { return Ok(None); }
        let stored = Review {
            id: state.reviews.len() as i64 + 1,
            product_id: review.product_id,
            order_id: review.order_id,
            content: review.content.clone(),
            rating: review.rating,
            nickname: review.nickname.clone(),
            image_url: review.image_url.clone(),
            created_at: now,
        };
        state.reviews.push(stored.clone());
        Ok(Some(stored))
    }
}

#[async_trait]
impl EventLogRepository for MemoryStore {
    async fn insert_page_view(&self, view: &PageView) -> Result<()> {
        self.lock()?.page_views.push(view.clone());
        Ok(())
    }

    async fn insert_cart_log(&self, log: &CartLog) -> Result<()> {
        self.lock()?.cart_logs.push(log.clone());
        Ok(())
    }

    async fn page_views_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PageView>> {
        Ok(self.lock()?.page_views.iter().filter(|v| v.created_at >= from && v.created_at < to).cloned().collect())
    }

    async fn cart_logs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CartLog>> {
        Ok(self.lock()?.cart_logs.iter().filter(|c| c.created_at >= from && c.created_at < to).cloned().collect())
    }
}

#[async_trait]
impl PaymentLedger for MemoryStore {
    async fn claim(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<Claim> {
        let mut state = self.lock()?;
        match state.steps.get(&(order_id, step)) {
            Some(row) if row.done => return Ok(Claim::Done { payment_key: row.payment_key.clone() }),
            Some(row) if row.claimed_at >= stale_before => return Ok(Claim::InProgress),
            _ => {}
        }
        state.steps.insert((order_id, step), StepRow { payment_key: payment_key.to_string(), done: false, claimed_at: now });
        Ok(Claim::Acquired)
    }

    async fn complete(&self, order_id: Uuid, step: PaymentStep, _now: DateTime<Utc>) -> Result<()> {
        if let Some(row) = self.lock()?.steps.get_mut(&(order_id, step)) { row.done = true; }
        Ok(())
    }

    async fn release(&self, order_id: Uuid, step: PaymentStep) -> Result<()> {
        let mut state = self.lock()?;
        if state.steps.get(&(order_id, step)).is_some_and(|row| !row.done) { state.steps.remove(&(order_id, step)); }
        Ok(())
    }

    async fn record(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>) -> Result<()> {
        self.lock()?
            .steps
            .entry((order_id, step))
            .and_modify(|row| row.done = true)
            .or_insert_with(|| StepRow { payment_key: payment_key.to_string(), done: true, claimed_at: now });
        Ok(())
    }

    async fn completed(&self, order_id: Uuid) -> Result<Vec<PaymentStep>> {
        let state = self.lock()?;
        let mut done: Vec<PaymentStep> = state.steps.iter().filter(|((id, _), row)| *id == order_id && row.done).map(|((_, step), _)| *step).collect();
        done.sort_by_key(|s| *s as u8);
        Ok(done)
    }
}

#[async_trait]
impl StorageHealth for MemoryStore {
    fn backend(&self) -> &'static str { "memory" }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
