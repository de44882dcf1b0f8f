use crate::connection::Connection;
use crate::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnection;
use sqlx::Connection as _;
use sqlx::FromRow;

/// Represents a row from the `products` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The caller-supplied columns of a product; `id` and `created_at` are
/// assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub category: Option<String>,
}

/// The `ProductRepository` owns one live MySQL session and encapsulates all
/// SQL the service issues against it.
#[derive(Debug)]
pub struct ProductRepository {
    conn: MySqlConnection,
}

impl ProductRepository {
    pub fn new(conn: MySqlConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Connection for ProductRepository {
    async fn ping(&mut self) -> Result<(), DbError> {
        self.conn.ping().await?;
        Ok(())
    }

    /// Fetches every product, newest first.
    async fn list_products(&mut self) -> Result<Vec<Product>, DbError> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, quantity, price, category, created_at
            FROM products
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;
        Ok(products)
    }

    async fn insert_product(&mut self, product: &NewProduct) -> Result<u64, DbError> {
        let result = sqlx::query(
            "INSERT INTO products (name, description, quantity, price, category) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.quantity)
        .bind(product.price)
        .bind(product.category.as_deref())
        .execute(&mut self.conn)
        .await?;
        Ok(result.last_insert_id())
    }

    async fn delete_product(&mut self, id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected())
    }
}
