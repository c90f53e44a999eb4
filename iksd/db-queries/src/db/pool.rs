// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database connection pooling

use super::Config as DbConfig;
use async_bb8_diesel::ConnectionError;
use async_bb8_diesel::ConnectionManager;
use iks_common::api::external::Error;

pub type DbConnection = diesel::PgConnection;

/// A connection checked out of the [`Pool`] that does not borrow from it
pub(crate) type OwnedConnection =
    bb8::PooledConnection<'static, ConnectionManager<DbConnection>>;

/// Wrapper around a database connection pool.
///
/// Expected to be used as the primary interface to the database.
#[derive(Clone)]
pub struct Pool {
    pool: bb8::Pool<ConnectionManager<DbConnection>>,
}

impl Pool {
    pub fn new(log: &slog::Logger, db_config: &DbConfig) -> Self {
        let log = log.new(o!("component" => "db::Pool"));
        info!(
            &log,
            "database connection pool";
            "max_size" => db_config.max_pool_size,
        );
        let error_sink = LoggingErrorSink::new(log);
        let manager =
            ConnectionManager::<DbConnection>::new(db_config.url.clone());
        let pool = bb8::Builder::new()
            .max_size(db_config.max_pool_size)
            .connection_timeout(db_config.connection_timeout())
            .error_sink(Box::new(error_sink))
            .build_unchecked(manager);
        Pool { pool }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &bb8::Pool<ConnectionManager<DbConnection>> {
        &self.pool
    }

    /// Checks out a connection that may outlive the borrow of the pool, as a
    /// transaction does.
    pub(crate) async fn claim(&self) -> Result<OwnedConnection, Error> {
        self.pool.get_owned().await.map_err(|e| {
            Error::unavail(&format!("Failed to access connection pool: {e}"))
        })
    }
}

#[derive(Clone, Debug)]
struct LoggingErrorSink {
    log: slog::Logger,
}

impl LoggingErrorSink {
    fn new(log: slog::Logger) -> LoggingErrorSink {
        LoggingErrorSink { log }
    }
}

impl bb8::ErrorSink<ConnectionError> for LoggingErrorSink {
    fn sink(&self, error: ConnectionError) {
        error!(
            &self.log,
            "database connection error";
            "error_message" => #%error
        );
    }

    fn boxed_clone(&self) -> Box<dyn bb8::ErrorSink<ConnectionError>> {
        Box::new(self.clone())
    }
}
