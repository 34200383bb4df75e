//! Database probe
//!
//! Connects with the monitor's credentials and runs its health query
//! (`SELECT 1` by default). Engines without a compiled-in driver are probed
//! with a TCP connect to the database port instead.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{Probe, ProbeError, ProbeOutcome, TcpProbe};
use crate::models::{Monitor, SqlEngine, SqlSettings};

pub const DEFAULT_QUERY: &str = "SELECT 1";

pub struct SqlProbe;

impl SqlProbe {
    /// Whether a real query can be issued against `engine`
    pub fn driver_available(engine: SqlEngine) -> bool {
        driver::supports(engine)
    }
}

/// Connection URL with percent-encoded credentials
fn connection_url(host: &str, port: u16, settings: &SqlSettings) -> Result<url::Url, ProbeError> {
    let invalid = |reason: &str| ProbeError::InvalidTarget(format!("{host}: {reason}"));

    let mut url = url::Url::parse(&format!("{}://{host}:{port}", settings.engine.url_scheme()))
        .map_err(|e| invalid(&e.to_string()))?;

    if let Some(username) = &settings.username {
        url.set_username(username)
            .map_err(|_| invalid("cannot carry credentials"))?;
    }
    if let Some(password) = &settings.password {
        url.set_password(Some(password))
            .map_err(|_| invalid("cannot carry credentials"))?;
    }
    if let Some(database) = &settings.database {
        url.set_path(database);
    }

    Ok(url)
}

#[async_trait]
impl Probe for SqlProbe {
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        let settings = monitor.sql.clone().unwrap_or_default();
        let port = monitor.port.unwrap_or(settings.engine.default_port());

        if !Self::driver_available(settings.engine) {
            debug!(
                "no {} driver available, probing {}:{port} over TCP",
                settings.engine.url_scheme(),
                monitor.target
            );
            return TcpProbe::connect(&monitor.target, port, timeout).await;
        }

        let url = match connection_url(&monitor.target, port, &settings) {
            Ok(url) => url,
            Err(e) => return ProbeOutcome::down(e),
        };
        let query = settings.query.as_deref().unwrap_or(DEFAULT_QUERY);

        let start = Instant::now();
        match tokio::time::timeout(timeout, driver::run_query(url.as_str(), query)).await {
            Ok(Ok(())) => ProbeOutcome::up(start.elapsed()),
            Ok(Err(e)) => ProbeOutcome::down_after(start.elapsed(), e),
            Err(_) => ProbeOutcome::down_after(start.elapsed(), ProbeError::Timeout),
        }
    }
}

#[cfg(feature = "sql-probe")]
mod driver {
    use std::sync::Once;

    use sqlx::{AnyConnection, Connection};

    use super::ProbeError;
    use crate::models::SqlEngine;

    static INSTALL_DRIVERS: Once = Once::new();

    pub fn supports(engine: SqlEngine) -> bool {
        matches!(engine, SqlEngine::Postgres | SqlEngine::Mysql)
    }

    pub async fn run_query(url: &str, query: &str) -> Result<(), ProbeError> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let mut connection = AnyConnection::connect(url).await.map_err(database_error)?;
        sqlx::query(query)
            .execute(&mut connection)
            .await
            .map_err(database_error)?;
        connection.close().await.map_err(database_error)?;
        Ok(())
    }

    fn database_error(err: sqlx::Error) -> ProbeError {
        ProbeError::Database(err.to_string())
    }
}

#[cfg(not(feature = "sql-probe"))]
mod driver {
    use super::ProbeError;
    use crate::models::SqlEngine;

    pub fn supports(_engine: SqlEngine) -> bool {
        false
    }

    pub async fn run_query(_url: &str, _query: &str) -> Result<(), ProbeError> {
        Err(ProbeError::Database("sql-probe feature disabled".to_string()))
    }
}
