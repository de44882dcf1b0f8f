use crate::error::DbError;
use crate::repository::{NewProduct, Product, ProductRepository};
use async_trait::async_trait;
use configuration::DatabaseSettings;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection as _;
use std::fmt;

/// One live database session, as seen by the supervisor.
///
/// Every method takes `&mut self`: a session runs one statement at a time.
#[async_trait]
pub trait Connection: Send {
    /// A cheap round-trip used to detect a dead session.
    async fn ping(&mut self) -> Result<(), DbError>;

    async fn list_products(&mut self) -> Result<Vec<Product>, DbError>;

    /// Inserts a product and returns the id the database assigned to it.
    async fn insert_product(&mut self, product: &NewProduct) -> Result<u64, DbError>;

    /// Deletes by id and returns the number of affected rows.
    async fn delete_product(&mut self, id: i64) -> Result<u64, DbError>;
}

/// Opens new sessions. The supervisor calls this on every (re)connect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError>;

    /// A human-readable description of the target, for logs.
    fn describe(&self) -> String;
}

/// Connects to MySQL with the configured host, credentials and schema.
#[derive(Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    description: String,
}

// `MySqlConnectOptions` prints the password in its own `Debug` output.
impl fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("target", &self.description)
            .finish_non_exhaustive()
    }
}

impl MySqlConnector {
    pub fn new(settings: &DatabaseSettings) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.name);

        Self {
            options,
            description: format!(
                "Host: {}, Database: {}, User: {}",
                settings.host, settings.name, settings.user
            ),
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let conn = MySqlConnection::connect_with(&self.options).await?;
        Ok(Box::new(ProductRepository::new(conn)))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_names_target_but_not_password() {
        let settings = DatabaseSettings {
            host: "db".to_string(),
            port: 3306,
            user: "app".to_string(),
            password: "topsecret".to_string(),
            name: "inventory_db".to_string(),
        };
        let connector = MySqlConnector::new(&settings);

        assert_eq!(connector.describe(), "Host: db, Database: inventory_db, User: app");
        assert!(!format!("{:?}", connector).contains("topsecret"));
    }
}
