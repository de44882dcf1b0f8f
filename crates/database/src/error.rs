use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

/// Client-side and server-side MySQL error numbers that mean the session is gone.
const CONNECTION_LOST_CODES: &[u16] = &[
    1053, // ER_SERVER_SHUTDOWN
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
    4031, // ER_CLIENT_INTERACTION_TIMEOUT
];

#[derive(Error, Debug)]
pub enum DbError {
    /// The raw driver error. Its message is passed through to callers untouched.
    #[error("{0}")]
    Query(#[from] sqlx::Error),

    #[error("Database not connected")]
    NotConnected,
}

impl DbError {
    /// Whether this error means the underlying connection can no longer be used.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            DbError::NotConnected => false,
            DbError::Query(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db_err) => db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|mysql| CONNECTION_LOST_CODES.contains(&mysql.number())),
                _ => false,
            },
        }
    }
}
