//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod review;
pub mod user;
pub mod verification;

pub use product::{NewProduct, Product, ProductFilter, ProductStatus, UnknownStatus};
pub use order::{DeliveryStatus, Order, OrderError, OrderLine, OrderStatus, Recipient, RefundError, RefundToggle};
pub use cart::{Cart, CartError, CartItem, CartSnapshot};
pub use review::{NewReview, Review, ReviewError, ReviewToken};
pub use user::{BuyerIdentity, User, UserContactUpdate};
pub use verification::{VerificationCode, VerificationError};
