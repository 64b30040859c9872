//! Cart Aggregate
//!
//! The cart lives on the shopper's device. The server owns its schema: what a
//! stored snapshot looks like, how older snapshots migrate, and what can be done
//! to it.

use serde::{Deserialize, Serialize};

pub const CART_SCHEMA_VERSION: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    #[serde(default = "selected_by_default")]
    pub selected: bool,
}

fn selected_by_default() -> bool { true }

/// Persisted form of the cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub version: u32,
    pub items: Vec<CartItem>,
}

impl CartSnapshot {
    /// Decode whatever the device stored. Version 1 was a bare array of product ids.
    pub fn migrate(raw: serde_json::Value) -> Result<Self, CartError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Versioned { version: u32, items: Vec<CartItem> },
            Legacy(Vec<i64>),
        }
        match serde_json::from_value::<Stored>(raw).map_err(|_| CartError::Malformed)? {
            Stored::Versioned { version: CART_SCHEMA_VERSION, items } => Ok(Self { version: CART_SCHEMA_VERSION, items }),
            Stored::Versioned { version, .. } => Err(CartError::UnsupportedVersion(version)),
            Stored::Legacy(ids) => Ok(Self {
                version: CART_SCHEMA_VERSION,
                items: ids.into_iter().map(|product_id| CartItem { product_id, selected: true }).collect(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn from_snapshot(snapshot: CartSnapshot) -> Self {
        let mut cart = Self::new();
        for item in snapshot.items {
            if !cart.contains(item.product_id) { cart.items.push(item); }
        }
        cart
    }

    pub fn snapshot(&self) -> CartSnapshot { CartSnapshot { version: CART_SCHEMA_VERSION, items: self.items.clone() } }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn contains(&self, product_id: i64) -> bool { self.items.iter().any(|i| i.product_id == product_id) }

    pub fn selected_ids(&self) -> Vec<i64> {
        self.items.iter().filter(|i| i.selected).map(|i| i.product_id).collect()
    }

    /// Each listing is one physical item, so adding twice changes nothing.
    pub fn add(&mut self, product_id: i64) {
        if !self.contains(product_id) { self.items.push(CartItem { product_id, selected: true }); }
    }

    pub fn set_selected(&mut self, product_id: i64, selected: bool) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        item.selected = selected;
        Ok(())
    }

    pub fn remove(&mut self, product_id: i64) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, Malformed, UnsupportedVersion(u32) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::Malformed => write!(f, "Cart snapshot is malformed"),
            Self::UnsupportedVersion(v) => write!(f, "Cart schema version {v} is not supported"),
        }
    }
}
