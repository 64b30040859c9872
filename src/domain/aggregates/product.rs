//! Product Aggregate
//!
//! Every listing is a single second-hand item, so there is no inventory count:
//! a product is either for sale or it is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::value_objects::Won;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    #[serde(rename = "판매중")] Selling,
    #[serde(rename = "판매완료")] Sold,
    #[serde(rename = "판매준비")] Preparing,
    #[serde(rename = "환불요청")] RefundRequested,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selling => "판매중",
            Self::Sold => "판매완료",
            Self::Preparing => "판매준비",
            Self::RefundRequested => "환불요청",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "판매중" => Ok(Self::Selling),
            "판매완료" => Ok(Self::Sold),
            "판매준비" => Ok(Self::Preparing),
            "환불요청" => Ok(Self::RefundRequested),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A status label that none of the known enums accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);
impl std::error::Error for UnknownStatus {}
impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown status '{}'", self.0) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub category1: String,
    pub category2: Option<String>,
    pub size: Option<String>,
    pub price: Won,
    pub purchase_price: Won,
    /// Whole percent, 0..=100.
    pub discount_rate: u8,
    pub condition: Option<String>,
    pub description: String,
    pub status: ProductStatus,
    pub image_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// What the buyer actually pays for this item.
    pub fn sale_price(&self) -> Won { self.price.discounted(self.discount_rate) }
    pub fn is_available(&self) -> bool { self.status == ProductStatus::Selling }
    pub fn image_paths(&self) -> Vec<String> { image_paths(self.id, self.image_count) }
    pub fn thumbnail(&self) -> Option<String> { self.image_paths().into_iter().next() }
}

/// Validated admin input for a new listing.
#[derive(Clone, Debug)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub category1: String,
    pub category2: Option<String>,
    pub size: Option<String>,
    pub price: Won,
    pub purchase_price: Won,
    pub discount_rate: u8,
    pub condition: Option<String>,
    pub status: ProductStatus,
    pub image_count: u32,
    /// Plain-text blurb placed above the image gallery.
    pub summary: String,
}

/// Catalog query. `status: None` means "everything a shopper may see".
#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category1: Option<String>,
    pub category2: Option<String>,
    pub brand: Option<String>,
    pub keyword: Option<String>,
    pub status: Option<ProductStatus>,
    pub include_hidden: bool,
    pub page: u32,
    pub per_page: u32,
}

impl ProductFilter {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn normalised(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = match self.per_page { 0 => 20, n => n.min(Self::MAX_PER_PAGE) };
        self.keyword = self.keyword.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        self
    }

    /// Row offset of the page. Widened so any `page` a client sends is representable.
    pub fn offset(&self) -> u64 { u64::from(self.page.max(1) - 1) * u64::from(self.per_page) }

    pub fn matches(&self, product: &Product) -> bool {
        let status_ok = match self.status {
            Some(status) => product.status == status,
            None => self.include_hidden || product.status != ProductStatus::Preparing,
        };
        let eq = |want: &Option<String>, have: Option<&str>| want.as_deref().map_or(true, |w| Some(w) == have);
        let keyword_ok = self.keyword.as_deref().map_or(true, |k| {
            let k = k.to_lowercase();
            product.name.to_lowercase().contains(&k) || product.brand.to_lowercase().contains(&k)
        });
        status_ok
            && eq(&self.category1, Some(product.category1.as_str()))
            && eq(&self.category2, product.category2.as_deref())
            && eq(&self.brand, Some(product.brand.as_str()))
            && keyword_ok
    }
}

/// Image URLs follow a fixed convention; files are uploaded out-of-band after the row exists.
pub fn image_paths(product_id: i64, image_count: u32) -> Vec<String> {
    (1..=image_count).map(|n| format!("/products/{product_id}/{n}.jpg")).collect()
}

/// Long-form HTML description for a listing.
pub fn render_description(product_id: i64, name: &str, summary: &str, image_count: u32) -> String {
    let mut html = String::from("<div class=\"product-detail\">\n");
    if !summary.trim().is_empty() {
        for line in summary.lines().map(str::trim).filter(|l| !l.is_empty()) {
            html.push_str(&format!("  <p>{}</p>\n", escape_html(line)));
        }
    }
    let alt = escape_html(name);
    for (idx, path) in image_paths(product_id, image_count).iter().enumerate() {
        html.push_str(&format!("  <img src=\"{path}\" alt=\"{alt} {}\" loading=\"lazy\" />\n", idx + 1));
    }
    html.push_str("</div>");
    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(status: ProductStatus) -> Product {
        Product {
            id: 7, name: "Bonpoint 원피스".into(), brand: "Bonpoint".into(), category1: "의류".into(),
            category2: Some("원피스".into()), size: Some("4Y".into()), price: Won::new(89_000),
            purchase_price: Won::new(40_000), discount_rate: 10, condition: Some("A".into()),
            description: String::new(), status, image_count: 2, created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [ProductStatus::Selling, ProductStatus::Sold, ProductStatus::Preparing, ProductStatus::RefundRequested] {
            assert_eq!(status.as_str().parse::<ProductStatus>().unwrap(), status);
        }
        assert!("sold".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn test_sale_price() {
        assert_eq!(product(ProductStatus::Selling).sale_price(), Won::new(80_100));
    }

    #[test]
    fn test_offset_of_huge_page() {
        let filter = ProductFilter { page: u32::MAX, per_page: 100, ..Default::default() }.normalised();
        assert_eq!(filter.offset(), (u64::from(u32::MAX) - 1) * 100);
        assert_eq!(ProductFilter::default().normalised().offset(), 0);
    }

    #[test]
    fn test_filter_hides_preparing_by_default() {
        let filter = ProductFilter::default().normalised();
        assert!(filter.matches(&product(ProductStatus::Selling)));
        assert!(filter.matches(&product(ProductStatus::Sold)));
        assert!(!filter.matches(&product(ProductStatus::Preparing)));
        let admin = ProductFilter { include_hidden: true, ..Default::default() };
        assert!(admin.matches(&product(ProductStatus::Preparing)));
    }

    #[test]
    fn test_filter_keyword_and_category() {
        let filter = ProductFilter { keyword: Some("bonpoint".into()), category2: Some("원피스".into()), ..Default::default() };
        assert!(filter.matches(&product(ProductStatus::Selling)));
        let filter = ProductFilter { brand: Some("Jacadi".into()), ..Default::default() };
        assert!(!filter.matches(&product(ProductStatus::Selling)));
    }

    #[test]
    fn test_render_description_uses_image_convention() {
        let html = render_description(12, "A & B", "첫 줄\n\n둘째 줄", 2);
        assert!(html.contains("<p>첫 줄</p>"));
        assert!(html.contains("<p>둘째 줄</p>"));
        assert!(html.contains("src=\"/products/12/1.jpg\""));
        assert!(html.contains("src=\"/products/12/2.jpg\""));
        assert!(html.contains("alt=\"A &amp; B 2\""));
        assert!(!html.contains("3.jpg"));
    }
}
