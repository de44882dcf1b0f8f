//! # Inventory Database Crate
//!
//! This crate owns everything the service knows about MySQL: the single
//! shared session, the supervisor that keeps it alive, and the SQL issued
//! against the `products` table.
//!
//! ## Architectural Principles
//!
//! - **One Session, Supervised:** There is no pool. A [`Supervisor`] holds at
//!   most one live connection, reconnects on a fixed interval after failures,
//!   and exposes a readiness predicate callers must consult before querying.
//! - **Backend Abstraction:** The supervisor talks to [`Connector`] and
//!   [`Connection`] trait objects. [`MySqlConnector`] is the production
//!   backend; the `memory` feature adds an in-memory one for tests.
//!
//! ## Public API
//!
//! - `Supervisor` / `ConnectionState`: the connection lifecycle.
//! - `MySqlConnector`, `ProductRepository`: the MySQL backend.
//! - `Product`, `NewProduct`: the row types.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod repository;
pub mod supervisor;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{Connection, Connector, MySqlConnector};
pub use error::DbError;
pub use repository::{NewProduct, Product, ProductRepository};
pub use supervisor::{ConnectionState, Supervisor};
