//! PostgreSQL repositories.
//!
//! Rows are read into `*Row` structs and decoded into domain types right here, so
//! nothing above this module sees a raw status label or an undecoded JSON column.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::repository::*;
use super::Database;
use crate::domain::aggregates::order::{decode_lines, encode_lines};
use crate::domain::aggregates::{
    BuyerIdentity, DeliveryStatus, NewProduct, NewReview, Order, OrderStatus, Product, ProductFilter, ProductStatus,
    Recipient, Review, ReviewToken, User, VerificationCode,
};
use crate::domain::value_objects::Won;
use crate::reporting::{CartLog, OrderFact, PageView};

// ============ Rows ============

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    brand: String,
    category1: String,
    category2: Option<String>,
    size: Option<String>,
    price: i64,
    purchase_price: i64,
    discount_rate: i16,
    condition: Option<String>,
    description: String,
    status: String,
    image_count: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = anyhow::Error;
    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Product {
            id: row.id,
            name: row.name,
            brand: row.brand,
            category1: row.category1,
            category2: row.category2,
            size: row.size,
            price: Won::new(row.price),
            purchase_price: Won::new(row.purchase_price),
            discount_rate: u8::try_from(row.discount_rate).with_context(|| format!("product {} discount_rate", row.id))?,
            condition: row.condition,
            description: row.description,
            status: row.status.parse()?,
            image_count: u32::try_from(row.image_count).with_context(|| format!("product {} image_count", row.id))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    kakao_id: Option<String>,
    phone: Option<String>,
    recipient_name: Option<String>,
    recipient_phone: Option<String>,
    postal_code: Option<String>,
    address: Option<String>,
    address_detail: Option<String>,
    delivery_memo: Option<String>,
    products: serde_json::Value,
    subtotal_amount: i64,
    shipping_fee: i64,
    discount_amount: i64,
    total_amount: i64,
    coupon_code: Option<String>,
    status: String,
    delivery_status: Option<String>,
    tracking_number: Option<String>,
    delivery_complete_date: Option<DateTime<Utc>>,
    refund_product_ids: Vec<i64>,
    payment_key: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;
    fn try_from(row: OrderRow) -> Result<Self> {
        let recipient = match (row.recipient_name, row.recipient_phone) {
            (Some(name), Some(phone)) => Some(Recipient {
                name,
                phone,
                postal_code: row.postal_code.unwrap_or_default(),
                address: row.address.unwrap_or_default(),
                address_detail: row.address_detail,
                memo: row.delivery_memo,
            }),
            _ => None,
        };
        Ok(Order {
            id: row.id,
            kakao_id: row.kakao_id,
            phone: row.phone,
            recipient,
            lines: decode_lines(row.products).with_context(|| format!("order {}", row.id))?,
            subtotal_amount: Won::new(row.subtotal_amount),
            shipping_fee: Won::new(row.shipping_fee),
            discount_amount: Won::new(row.discount_amount),
            total_amount: Won::new(row.total_amount),
            coupon_code: row.coupon_code,
            status: row.status.parse()?,
            delivery: DeliveryStatus::from_columns(row.delivery_status.as_deref(), row.tracking_number.as_deref())?,
            delivery_complete_date: row.delivery_complete_date,
            refund_product_ids: row.refund_product_ids,
            payment_key: row.payment_key,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    kakao_id: String,
    nickname: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            kakao_id: row.kakao_id,
            nickname: row.nickname,
            email: row.email,
            phone: row.phone,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CodeRow {
    id: i64,
    phone: String,
    code: String,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl From<CodeRow> for VerificationCode {
    fn from(row: CodeRow) -> Self {
        VerificationCode { id: row.id, phone: row.phone, code: row.code, verified: row.verified, created_at: row.created_at }
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    token: String,
    order_id: Uuid,
    product_id: i64,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for ReviewToken {
    fn from(row: TokenRow) -> Self {
        ReviewToken { token: row.token, order_id: row.order_id, product_id: row.product_id, used_at: row.used_at, created_at: row.created_at }
    }
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i64,
    product_id: i64,
    order_id: Uuid,
    content: String,
    rating: i16,
    nickname: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = anyhow::Error;
    fn try_from(row: ReviewRow) -> Result<Self> {
        Ok(Review {
            id: row.id,
            product_id: row.product_id,
            order_id: row.order_id,
            content: row.content,
            rating: u8::try_from(row.rating).with_context(|| format!("review {} rating", row.id))?,
            nickname: row.nickname,
            image_url: row.image_url,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PageViewRow {
    ip: String,
    path: String,
    referrer: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CartLogRow {
    ip: String,
    product_id: i64,
    action: String,
    created_at: DateTime<Utc>,
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============ Products ============

const PRODUCT_COLUMNS: &str = "id, name, brand, category1, category2, size, price, purchase_price, discount_rate, \
                               condition, description, status, image_count, created_at";

// $1 category1, $2 category2, $3 brand, $4 keyword, $5 status, $6 include_hidden
const PRODUCT_FILTER: &str = r#"
    ($1::text IS NULL OR category1 = $1)
    AND ($2::text IS NULL OR category2 = $2)
    AND ($3::text IS NULL OR brand = $3)
    AND ($4::text IS NULL OR name ILIKE '%' || $4 || '%' OR brand ILIKE '%' || $4 || '%')
    AND (($5::text IS NULL AND ($6 OR status <> '판매준비')) OR status = $5)
"#;

fn like_escaped(keyword: &str) -> String {
    keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl ProductRepository for Database {
    async fn insert(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (
                name, brand, category1, category2, size, price, purchase_price,
                discount_rate, condition, description, status, image_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, '', $10, $11, $12)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category1)
        .bind(&product.category2)
        .bind(&product.size)
        .bind(product.price.value())
        .bind(product.purchase_price.value())
        .bind(i16::from(product.discount_rate))
        .bind(&product.condition)
        .bind(product.status.as_str())
        .bind(i32::try_from(product.image_count)?)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        decode_all(rows)
    }

    async fn search(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)> {
        let keyword = filter.keyword.as_deref().map(like_escaped);
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {PRODUCT_FILTER} ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        ))
        .bind(&filter.category1)
        .bind(&filter.category2)
        .bind(&filter.brand)
        .bind(&keyword)
        .bind(status)
        .bind(filter.include_hidden)
        .bind(i64::from(filter.per_page))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products WHERE {PRODUCT_FILTER}"))
            .bind(&filter.category1)
            .bind(&filter.category2)
            .bind(&filter.brand)
            .bind(&keyword)
            .bind(status)
            .bind(filter.include_hidden)
            .fetch_one(&self.pool)
            .await?;

        Ok((decode_all(rows)?, total.0))
    }

    async fn save(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products SET
                name = $2, brand = $3, category1 = $4, category2 = $5, size = $6,
                price = $7, purchase_price = $8, discount_rate = $9, condition = $10,
                description = $11, status = $12, image_count = $13
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category1)
        .bind(&product.category2)
        .bind(&product.size)
        .bind(product.price.value())
        .bind(product.purchase_price.value())
        .bind(i16::from(product.discount_rate))
        .bind(&product.condition)
        .bind(&product.description)
        .bind(product.status.as_str())
        .bind(i32::try_from(product.image_count)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(&self, ids: &[i64], status: ProductStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE products SET status = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn category_pairs(&self) -> Result<Vec<(String, Option<String>)>> {
        let pairs = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT DISTINCT category1, category2 FROM products WHERE status <> '판매준비' ORDER BY category1, category2",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs)
    }

    async fn brands(&self) -> Result<Vec<String>> {
        let brands = sqlx::query_as::<_, (String,)>("SELECT DISTINCT brand FROM products WHERE status <> '판매준비' ORDER BY brand")
            .fetch_all(&self.pool)
            .await?;

        Ok(brands.into_iter().map(|(b,)| b).collect())
    }
}

// ============ Orders ============

const ORDER_COLUMNS: &str = "id, kakao_id, phone, recipient_name, recipient_phone, postal_code, address, \
                             address_detail, delivery_memo, products, subtotal_amount, shipping_fee, \
                             discount_amount, total_amount, coupon_code, status, delivery_status, \
                             tracking_number, delivery_complete_date, refund_product_ids, payment_key, \
                             version, created_at, updated_at";

#[async_trait]
impl OrderRepository for Database {
    async fn insert(&self, order: &Order) -> Result<()> {
        let (delivery_status, tracking_number) = order.delivery.to_columns();
        let recipient = order.recipient.clone().unwrap_or_default();
        let has_recipient = order.recipient.is_some();

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, kakao_id, phone, recipient_name, recipient_phone, postal_code, address,
                address_detail, delivery_memo, products, subtotal_amount, shipping_fee,
                discount_amount, total_amount, coupon_code, status, delivery_status,
                tracking_number, delivery_complete_date, refund_product_ids, payment_key,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(order.id)
        .bind(&order.kakao_id)
        .bind(&order.phone)
        .bind(has_recipient.then_some(recipient.name))
        .bind(has_recipient.then_some(recipient.phone))
        .bind(has_recipient.then_some(recipient.postal_code))
        .bind(has_recipient.then_some(recipient.address))
        .bind(recipient.address_detail)
        .bind(recipient.memo)
        .bind(encode_lines(&order.lines))
        .bind(order.subtotal_amount.value())
        .bind(order.shipping_fee.value())
        .bind(order.discount_amount.value())
        .bind(order.total_amount.value())
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .bind(delivery_status)
        .bind(tracking_number)
        .bind(order.delivery_complete_date)
        .bind(&order.refund_product_ids)
        .bind(&order.payment_key)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn update(&self, order: &Order) -> Result<bool> {
        let (delivery_status, tracking_number) = order.delivery.to_columns();
        let recipient = order.recipient.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                kakao_id = $3, phone = $4, recipient_name = $5, recipient_phone = $6,
                postal_code = $7, address = $8, address_detail = $9, delivery_memo = $10,
                products = $11, subtotal_amount = $12, shipping_fee = $13, discount_amount = $14,
                total_amount = $15, coupon_code = $16, status = $17, delivery_status = $18,
                tracking_number = $19, delivery_complete_date = $20, refund_product_ids = $21,
                payment_key = $22, updated_at = $23, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id)
        .bind(order.version)
        .bind(&order.kakao_id)
        .bind(&order.phone)
        .bind(recipient.map(|r| r.name.as_str()))
        .bind(recipient.map(|r| r.phone.as_str()))
        .bind(recipient.map(|r| r.postal_code.as_str()))
        .bind(recipient.map(|r| r.address.as_str()))
        .bind(recipient.and_then(|r| r.address_detail.as_deref()))
        .bind(recipient.and_then(|r| r.memo.as_deref()))
        .bind(encode_lines(&order.lines))
        .bind(order.subtotal_amount.value())
        .bind(order.shipping_fee.value())
        .bind(order.discount_amount.value())
        .bind(order.total_amount.value())
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .bind(delivery_status)
        .bind(tracking_number)
        .bind(order.delivery_complete_date)
        .bind(&order.refund_product_ids)
        .bind(&order.payment_key)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_buyer(&self, buyer: &BuyerIdentity) -> Result<Vec<Order>> {
        let query = match buyer {
            BuyerIdentity::Kakao { .. } => format!("SELECT {ORDER_COLUMNS} FROM orders WHERE kakao_id = $1 AND status <> 'temp' ORDER BY created_at DESC"),
            BuyerIdentity::Phone { .. } => format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE phone = $1 AND kakao_id IS NULL AND status <> 'temp' ORDER BY created_at DESC"
            ),
        };
        let key = match buyer {
            BuyerIdentity::Kakao { kakao_id } => kakao_id.as_str(),
            BuyerIdentity::Phone { phone } => phone.as_str(),
        };

        let rows = sqlx::query_as::<_, OrderRow>(&query).bind(key).fetch_all(&self.pool).await?;
        decode_all(rows)
    }

    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    async fn facts_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<OrderFact>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>("SELECT status, created_at FROM orders WHERE created_at >= $1 AND created_at < $2")
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(status, created_at)| Ok(OrderFact { status: status.parse()?, created_at }))
            .collect()
    }
}

// ============ Users ============

#[async_trait]
impl UserRepository for Database {
    async fn upsert(&self, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (kakao_id, nickname, email, phone, address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (kakao_id)
            DO UPDATE SET
                nickname = EXCLUDED.nickname,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                updated_at = EXCLUDED.updated_at
            RETURNING kakao_id, nickname, email, phone, address, created_at, updated_at
            "#,
        )
        .bind(&user.kakao_id)
        .bind(&user.nickname)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find(&self, kakao_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT kakao_id, nickname, email, phone, address, created_at, updated_at FROM users WHERE kakao_id = $1",
        )
        .bind(kakao_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn save(&self, user: &User) -> Result<()> {
        sqlx::query("UPDATE users SET nickname = $2, phone = $3, address = $4, updated_at = $5 WHERE kakao_id = $1")
            .bind(&user.kakao_id)
            .bind(&user.nickname)
            .bind(&user.phone)
            .bind(&user.address)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============ Verification codes ============

#[async_trait]
impl VerificationRepository for Database {
    async fn insert(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<VerificationCode> {
        let row = sqlx::query_as::<_, CodeRow>(
            r#"
            INSERT INTO verification_codes (phone, code, verified, created_at)
            VALUES ($1, $2, FALSE, $3)
            RETURNING id, phone, code, verified, created_at
            "#,
        )
        .bind(phone)
        .bind(code)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn latest_unverified(&self, phone: &str, code: &str) -> Result<Option<VerificationCode>> {
        let row = sqlx::query_as::<_, CodeRow>(
            r#"
            SELECT id, phone, code, verified, created_at
            FROM verification_codes
            WHERE phone = $1 AND code = $2 AND verified = FALSE
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VerificationCode::from))
    }

    async fn mark_verified(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE verification_codes SET verified = TRUE WHERE id = $1 AND verified = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============ Reviews ============

#[async_trait]
impl ReviewRepository for Database {
    async fn insert_token(&self, token: &ReviewToken) -> Result<ReviewToken> {
        sqlx::query(
            r#"
            INSERT INTO review_tokens (token, order_id, product_id, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, product_id) DO NOTHING
            "#,
        )
        .bind(&token.token)
        .bind(token.order_id)
        .bind(token.product_id)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token, order_id, product_id, used_at, created_at FROM review_tokens WHERE order_id = $1 AND product_id = $2",
        )
        .bind(token.order_id)
        .bind(token.product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_token(&self, token: &str) -> Result<Option<ReviewToken>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT token, order_id, product_id, used_at, created_at FROM review_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ReviewToken::from))
    }

    async fn mark_token_used(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE review_tokens SET used_at = $2 WHERE token = $1 AND used_at IS NULL")
            .bind(token)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_for_product(&self, product_id: i64) -> Result<Option<Review>> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT id, product_id, order_id, content, rating, nickname, image_url, created_at
            FROM reviews WHERE product_id = $1 ORDER BY id LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Review::try_from).transpose()
    }

    async fn insert_review(&self, review: &NewReview, now: DateTime<Utc>) -> Result<Option<Review>> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r#"
            INSERT INTO reviews (product_id, order_id, content, rating, nickname, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id) DO NOTHING
            RETURNING id, product_id, order_id, content, rating, nickname, image_url, created_at
            "#,
        )
        .bind(review.product_id)
        .bind(review.order_id)
        .bind(&review.content)
        .bind(i16::from(review.rating))
        .bind(&review.nickname)
        .bind(&review.image_url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Review::try_from).transpose()
    }
}

// ============ Visit logs ============

#[async_trait]
impl EventLogRepository for Database {
    async fn insert_page_view(&self, view: &PageView) -> Result<()> {
        sqlx::query("INSERT INTO page_views (ip, path, referrer, user_agent, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(&view.ip)
            .bind(&view.path)
            .bind(&view.referrer)
            .bind(&view.user_agent)
            .bind(view.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_cart_log(&self, log: &CartLog) -> Result<()> {
        sqlx::query("INSERT INTO cart_logs (ip, product_id, action, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&log.ip)
            .bind(log.product_id)
            .bind(&log.action)
            .bind(log.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn page_views_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PageView>> {
        let rows = sqlx::query_as::<_, PageViewRow>(
            "SELECT ip, path, referrer, user_agent, created_at FROM page_views WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PageView { ip: r.ip, path: r.path, referrer: r.referrer, user_agent: r.user_agent, created_at: r.created_at })
            .collect())
    }

    async fn cart_logs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CartLog>> {
        let rows = sqlx::query_as::<_, CartLogRow>(
            "SELECT ip, product_id, action, created_at FROM cart_logs WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CartLog { ip: r.ip, product_id: r.product_id, action: r.action, created_at: r.created_at })
            .collect())
    }
}

// ============ Payment ledger ============

#[async_trait]
impl PaymentLedger for Database {
    async fn claim(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<Claim> {
        // Inserts a fresh claim, or takes over a pending one whose holder went away.
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_steps (order_id, step, payment_key, done, created_at, claimed_at)
            VALUES ($1, $2, $3, FALSE, $4, $4)
            ON CONFLICT (order_id, step) DO UPDATE
                SET payment_key = EXCLUDED.payment_key, claimed_at = EXCLUDED.claimed_at
                WHERE payment_steps.done = FALSE AND payment_steps.claimed_at < $5
            "#,
        )
        .bind(order_id)
        .bind(step.as_str())
        .bind(payment_key)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(Claim::Acquired);
        }

        let (key, done) = sqlx::query_as::<_, (String, bool)>("SELECT payment_key, done FROM payment_steps WHERE order_id = $1 AND step = $2")
            .bind(order_id)
            .bind(step.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("payment step {step} for {order_id} vanished while claiming"))?;

        Ok(if done { Claim::Done { payment_key: key } } else { Claim::InProgress })
    }

    async fn complete(&self, order_id: Uuid, step: PaymentStep, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE payment_steps SET done = TRUE, completed_at = $3 WHERE order_id = $1 AND step = $2")
            .bind(order_id)
            .bind(step.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn release(&self, order_id: Uuid, step: PaymentStep) -> Result<()> {
        sqlx::query("DELETE FROM payment_steps WHERE order_id = $1 AND step = $2 AND done = FALSE")
            .bind(order_id)
            .bind(step.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_steps (order_id, step, payment_key, done, created_at, claimed_at, completed_at)
            VALUES ($1, $2, $3, TRUE, $4, $4, $4)
            ON CONFLICT (order_id, step)
            DO UPDATE SET done = TRUE, completed_at = COALESCE(payment_steps.completed_at, EXCLUDED.completed_at)
            "#,
        )
        .bind(order_id)
        .bind(step.as_str())
        .bind(payment_key)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn completed(&self, order_id: Uuid) -> Result<Vec<PaymentStep>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT step FROM payment_steps WHERE order_id = $1 AND done = TRUE")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        let mut steps = rows.into_iter().map(|(s,)| s.parse::<PaymentStep>().map_err(anyhow::Error::from)).collect::<Result<Vec<_>>>()?;
        steps.sort_by_key(|s| *s as u8);
        Ok(steps)
    }
}

#[async_trait]
impl StorageHealth for Database {
    fn backend(&self) -> &'static str { "postgres" }

    async fn ping(&self) -> Result<()> {
        self.health_check().await
    }
}
