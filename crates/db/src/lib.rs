//! Storage for polls: the diesel schema, row types and the pooled SQLite
//! connection used by the application.

pub mod campaign;
pub mod email;
pub mod otp;
/// Database schema
pub mod schema;
pub mod user;
pub mod vote;

use std::time::Duration;

use diesel::{
    connection::{Instrumentation, InstrumentationEvent, SimpleConnection},
    r2d2::{ConnectionManager, CustomizeConnection, Error, ManageConnection, Pool},
    Connection, SqliteConnection,
};
use rocket::{Build, Rocket};
use rocket_sync_db_pools::{database, Config, PoolResult, Poolable};

/// Pooled connection to the poll database. The pool is configured from the
/// `databases.database` table of the Rocket figment.
#[database("database")]
pub struct DbConn(DbWrapper);

impl DbConn {
    /// Runs `f` on a pooled connection, off the async executor.
    pub async fn interact<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut SqliteConnection) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |wrapper| f(&mut wrapper.0)).await
    }
}

/// The pooled connection. Every connection gets [`PRAGMAS`] and query
/// tracing when it is handed out.
pub struct DbWrapper(SqliteConnection);

/// WAL lets the live results readers run alongside vote inserts.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
                       PRAGMA busy_timeout = 5000; \
                       PRAGMA foreign_keys = ON;";

/// Logs every statement at `trace` and failed ones at `warn`.
struct QueryTracer;

impl Instrumentation for QueryTracer {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { query, .. } => {
                tracing::trace!(%query, "sql");
            }
            InstrumentationEvent::FinishQuery {
                query,
                error: Some(error),
                ..
            } => {
                tracing::warn!(%query, %error, "sql failed");
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct OnAcquire;

impl CustomizeConnection<DbWrapper, Error> for OnAcquire {
    fn on_acquire(&self, conn: &mut DbWrapper) -> Result<(), Error> {
        conn.0.set_instrumentation(QueryTracer);
        conn.0.batch_execute(PRAGMAS).map_err(Error::QueryError)
    }
}

pub struct DbWrapperManager(ConnectionManager<SqliteConnection>);

impl ManageConnection for DbWrapperManager {
    type Connection = DbWrapper;
    type Error = Error;

    fn connect(&self) -> Result<DbWrapper, Error> {
        self.0.connect().map(DbWrapper)
    }

    fn is_valid(&self, conn: &mut DbWrapper) -> Result<(), Error> {
        self.0.is_valid(&mut conn.0)
    }

    fn has_broken(&self, conn: &mut DbWrapper) -> bool {
        self.0.has_broken(&mut conn.0)
    }
}

impl Poolable for DbWrapper {
    type Manager = DbWrapperManager;
    type Error = std::convert::Infallible;

    fn pool(db_name: &str, rocket: &Rocket<Build>) -> PoolResult<Self> {
        let config = Config::from(db_name, rocket)?;
        tracing::info!(url = %config.url, size = config.pool_size, "opening database pool");

        Ok(Pool::builder()
            .connection_customizer(Box::new(OnAcquire))
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(config.timeout as u64))
            .build(DbWrapperManager(ConnectionManager::new(&config.url)))?)
    }
}
