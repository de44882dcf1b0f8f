//! An in-memory stand-in for the `products` table.
//!
//! Used to exercise the supervisor and the HTTP layer without a MySQL server.
//! It can refuse handshakes, sever every open session, and fail statements on
//! demand.

use crate::connection::{Connection, Connector};
use crate::error::DbError;
use crate::repository::{NewProduct, Product};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Inner {
    products: Vec<Product>,
    next_id: i64,
    epoch: DateTime<Utc>,
    generation: u64,
    refuse_connections: bool,
    failure: Option<String>,
    connect_attempts: usize,
    query_count: usize,
}

/// Shared handle to the in-memory table and its failure switches.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                products: Vec::new(),
                next_id: 1,
                epoch: Utc::now(),
                generation: 0,
                refuse_connections: false,
                failure: None,
                connect_attempts: 0,
                query_count: 0,
            })),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector { store: self.clone() })
    }

    /// Makes every following handshake fail with "connection refused".
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Severs every session handed out so far.
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    /// Makes every following statement fail with the given message, or stops doing so.
    pub fn fail_queries(&self, message: Option<&str>) {
        self.lock().failure = message.map(str::to_string);
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    /// How many statements reached the table, failed ones included.
    pub fn query_count(&self) -> usize {
        self.lock().query_count
    }

    /// The stored rows, in insertion order.
    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn io_error(kind: io::ErrorKind, message: &str) -> DbError {
    DbError::Query(sqlx::Error::Io(io::Error::new(kind, message.to_string())))
}

struct MemoryConnector {
    store: MemoryStore,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let mut inner = self.store.lock();
        inner.connect_attempts += 1;
        if inner.refuse_connections {
            return Err(io_error(io::ErrorKind::ConnectionRefused, "connect ECONNREFUSED"));
        }
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            generation: inner.generation,
        }))
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

struct MemoryConnection {
    store: MemoryStore,
    generation: u64,
}

impl MemoryConnection {
    /// Locks the table for one statement, failing the way a real session would.
    fn statement(&self) -> Result<MutexGuard<'_, Inner>, DbError> {
        let mut inner = self.store.lock();
        if inner.generation != self.generation {
            return Err(io_error(io::ErrorKind::ConnectionReset, "connection lost"));
        }
        inner.query_count += 1;
        if let Some(message) = &inner.failure {
            return Err(sqlx::Error::Decode(message.clone().into()).into());
        }
        Ok(inner)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn ping(&mut self) -> Result<(), DbError> {
        if self.store.lock().generation != self.generation {
            return Err(io_error(io::ErrorKind::ConnectionReset, "connection lost"));
        }
        Ok(())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>, DbError> {
        let inner = self.statement()?;
        let mut products = inner.products.clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn insert_product(&mut self, product: &NewProduct) -> Result<u64, DbError> {
        let mut inner = self.statement()?;
        let id = inner.next_id;
        inner.next_id += 1;
        // One second per row keeps creation times strictly increasing.
        let created_at = inner.epoch + Duration::seconds(id);
        inner.products.push(Product {
            id,
            name: product.name.clone(),
            description: product.description.clone(),
            quantity: product.quantity,
            price: product.price,
            category: product.category.clone(),
            created_at,
        });
        Ok(id as u64)
    }

    async fn delete_product(&mut self, id: i64) -> Result<u64, DbError> {
        let mut inner = self.statement()?;
        let before = inner.products.len();
        inner.products.retain(|product| product.id != id);
        Ok((before - inner.products.len()) as u64)
    }
}
