//! The connection supervisor.
//!
//! Owns the single database session of the service and drives it through
//! `Disconnected -> Connecting -> Connected`, falling back to `Retrying`
//! whenever a handshake fails or an established session dies. Retries use a
//! fixed delay and never give up.

use crate::connection::{Connection, Connector};
use crate::error::DbError;
use crate::repository::{NewProduct, Product};
use configuration::SupervisorSettings;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt has been made yet.
    Disconnected,
    Connecting,
    Connected,
    /// The last handshake failed or the session was lost.
    Retrying,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Retrying => "retrying",
        };
        f.write_str(name)
    }
}

/// Owns the shared connection and its reconnect loop.
///
/// Handlers check [`Supervisor::is_ready`] before issuing a query and go
/// through the query methods here, which serialize access to the session.
/// A query that fails with a transport error marks the session lost on the
/// spot; the caller still gets that error back.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    startup_delay: Duration,
    retry_delay: Duration,
    liveness_interval: Duration,
    connection: Mutex<Option<Box<dyn Connection>>>,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>, settings: &SupervisorSettings) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            connector,
            startup_delay: settings.startup_delay,
            retry_delay: settings.retry_delay,
            liveness_interval: settings.liveness_interval,
            connection: Mutex::new(None),
            state,
        })
    }

    /// Starts the connect/retry lifecycle on the runtime.
    ///
    /// The task runs until aborted; dropping the handle does not stop it.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.run().await })
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, DbError> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(DbError::NotConnected)?;
        let result = connection.list_products().await;
        self.inspect(result)
    }

    pub async fn insert_product(&self, product: &NewProduct) -> Result<u64, DbError> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(DbError::NotConnected)?;
        let result = connection.insert_product(product).await;
        self.inspect(result)
    }

    pub async fn delete_product(&self, id: i64) -> Result<u64, DbError> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(DbError::NotConnected)?;
        let result = connection.delete_product(id).await;
        self.inspect(result)
    }

    async fn run(&self) {
        time::sleep(self.startup_delay).await;

        loop {
            self.transition(ConnectionState::Connecting);
            tracing::info!("Attempting to connect to database ({})...", self.connector.describe());

            match self.connector.connect().await {
                Ok(connection) => {
                    *self.connection.lock().await = Some(connection);
                    self.transition(ConnectionState::Connected);
                    tracing::info!("Connected to database successfully.");

                    self.watch_connection().await;

                    self.connection.lock().await.take();
                    tracing::warn!("Database connection lost. Reconnecting...");
                }
                Err(e) => {
                    self.transition(ConnectionState::Retrying);
                    tracing::error!(error = %e, "Database connection failed.");
                    tracing::info!("Retrying in {} seconds...", self.retry_delay.as_secs_f64());
                    time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Returns once the current session is known to be dead, either because a
    /// query reported it or because a liveness ping failed.
    async fn watch_connection(&self) {
        let mut state = self.state.subscribe();
        let mut ticker = time::interval_at(
            time::Instant::now() + self.liveness_interval,
            self.liveness_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // The watch guard is dropped inside this block so it never
                // lives across the ping below.
                _ = async { state.wait_for(|state| !state.is_ready()).await.is_ok() } => return,
                _ = ticker.tick() => {
                    let mut guard = self.connection.lock().await;
                    let Some(connection) = guard.as_mut() else { return };
                    if let Err(e) = connection.ping().await {
                        if e.is_connection_lost() {
                            self.mark_lost(&e);
                            return;
                        }
                        tracing::warn!(error = %e, "Database ping failed.");
                    }
                }
            }
        }
    }

    // Runs while the connection lock is still held, so a loss reported here
    // always belongs to the session currently installed.
    fn inspect<T>(&self, result: Result<T, DbError>) -> Result<T, DbError> {
        if let Err(e) = &result {
            if e.is_connection_lost() {
                self.mark_lost(e);
            }
        }
        result
    }

    fn mark_lost(&self, error: &DbError) {
        if self.state().is_ready() && self.transition(ConnectionState::Retrying) {
            tracing::error!(error = %error, "Database error.");
        }
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            tracing::debug!(state = %next, "Database connection state changed.");
        }
        changed
    }
}
