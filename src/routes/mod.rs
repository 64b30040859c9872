//! HTTP handlers. Each handler extracts, calls one service function and shapes
//! the response; all business rules live in `crate::services`.
//!
//! # Routes
//! - `/health` - service and storage status
//! - `/api/products/*`, `/api/categories`, `/api/brands` - catalog
//! - `/api/cart/quote` - cart pricing
//! - `/api/auth/*`, `/api/users/me` - phone OTP, Kakao login, sessions
//! - `/api/orders/*`, `/api/payments/*` - checkout and the payment saga
//! - `/api/reviews/*` - one-time review links
//! - `/api/events/*` - visit and cart-click logging
//! - `/api/admin/*` - operator endpoints behind the admin key

pub mod admin;
pub mod auth;
pub mod cart;
pub mod events;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
