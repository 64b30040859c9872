//! Database Module
//!
//! `Database` owns the PostgreSQL pool and implements every repository trait in
//! `postgres.rs`. `MemoryStore` is the drop-in used when no database is configured.

mod memory;
mod postgres;
mod repository;

pub use memory::MemoryStore;
pub use repository::*;

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Pool of at most 10 connections; acquiring waits 3 seconds at most.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Every repository the services use, as trait objects over one backing store.
#[derive(Clone)]
pub struct Repositories {
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub event_logs: Arc<dyn EventLogRepository>,
    pub payments: Arc<dyn PaymentLedger>,
    pub health: Arc<dyn StorageHealth>,
}

impl Repositories {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ProductRepository
            + OrderRepository
            + UserRepository
            + VerificationRepository
            + ReviewRepository
            + EventLogRepository
            + PaymentLedger
            + StorageHealth
            + 'static,
    {
        Self {
            products: store.clone(),
            orders: store.clone(),
            users: store.clone(),
            verifications: store.clone(),
            reviews: store.clone(),
            event_logs: store.clone(),
            payments: store.clone(),
            health: store,
        }
    }
}
