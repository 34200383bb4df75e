//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers don't block the check writers
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **One open incident**: Enforced by a partial unique index
//!
//! Timestamps are stored as unix milliseconds.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{MaintenanceGate, MonitorStore};
use super::error::{StorageError, StorageResult};
use crate::models::{
    Check, CheckStatus, Incident, IncidentStatus, MaintenanceWindow, Monitor, MonitorId, NewCheck,
    ProbeKind, PushSubscription, RelayToken, SqlSettings, SslInfo,
};

const MONITOR_COLUMNS: &str = r#"
    id, name, kind, target, port, interval_sec, retries, timeout_ms,
    expected_status, content_pattern, sql_settings, notify_on_down, is_paused,
    ssl_expiry, ssl_days_until_expiry, ssl_issuer, ssl_valid
"#;

/// SQLite storage backend
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        info!("initializing SQLite backend at: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self { pool })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn monitor_from_row(row: &SqliteRow) -> StorageResult<Monitor> {
        let sql = row
            .try_get::<Option<String>, _>("sql_settings")?
            .map(|json| serde_json::from_str::<SqlSettings>(&json))
            .transpose()
            .map_err(|e| {
                StorageError::SerializationError(format!("failed to deserialize sql settings: {e}"))
            })?;

        let ssl = match row.try_get::<Option<i64>, _>("ssl_expiry")? {
            Some(expiry) => Some(SslInfo {
                cert_expiry: Self::millis_to_timestamp(expiry),
                days_until_expiry: row
                    .try_get::<Option<i64>, _>("ssl_days_until_expiry")?
                    .unwrap_or_default(),
                issuer: row
                    .try_get::<Option<String>, _>("ssl_issuer")?
                    .unwrap_or_default(),
                valid: row
                    .try_get::<Option<bool>, _>("ssl_valid")?
                    .unwrap_or_default(),
            }),
            None => None,
        };

        Ok(Monitor {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: ProbeKind::from(row.try_get::<String, _>("kind")?),
            target: row.try_get("target")?,
            port: row.try_get::<Option<i64>, _>("port")?.map(|v| v as u16),
            interval_sec: row
                .try_get::<Option<i64>, _>("interval_sec")?
                .map(|v| v as u64),
            retries: row.try_get::<Option<i64>, _>("retries")?.map(|v| v as u32),
            timeout_ms: row.try_get::<Option<i64>, _>("timeout_ms")?.map(|v| v as u64),
            expected_status: row
                .try_get::<Option<i64>, _>("expected_status")?
                .map(|v| v as u16),
            content_pattern: row.try_get("content_pattern")?,
            sql,
            notify_on_down: row.try_get("notify_on_down")?,
            is_paused: row.try_get("is_paused")?,
            ssl,
        })
    }

    fn check_from_row(row: &SqliteRow) -> StorageResult<Check> {
        let status: String = row.try_get("status")?;
        Ok(Check {
            id: row.try_get("id")?,
            monitor_id: row.try_get("monitor_id")?,
            status: status
                .parse::<CheckStatus>()
                .map_err(StorageError::SerializationError)?,
            latency_ms: row.try_get::<Option<i64>, _>("latency_ms")?.map(|v| v as u64),
            error: row.try_get("error")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn incident_from_row(row: &SqliteRow) -> StorageResult<Incident> {
        let status: String = row.try_get("status")?;
        Ok(Incident {
            id: row.try_get("id")?,
            monitor_id: row.try_get("monitor_id")?,
            started_at: Self::millis_to_timestamp(row.try_get("started_at")?),
            ended_at: row
                .try_get::<Option<i64>, _>("ended_at")?
                .map(Self::millis_to_timestamp),
            status: status
                .parse::<IncidentStatus>()
                .map_err(StorageError::SerializationError)?,
        })
    }
}

#[async_trait]
impl MonitorStore for SqliteStore {
    #[instrument(skip(self))]
    async fn active_monitors(&self) -> StorageResult<Vec<Monitor>> {
        let rows = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE is_paused = 0 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::monitor_from_row).collect()
    }

    async fn get_monitor(&self, monitor_id: MonitorId) -> StorageResult<Option<Monitor>> {
        let row = sqlx::query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"))
            .bind(monitor_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::monitor_from_row).transpose()
    }

    #[instrument(skip(self, monitor), fields(monitor_id = monitor.id))]
    async fn upsert_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        let sql_settings = monitor
            .sql
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| {
                StorageError::SerializationError(format!("failed to serialize sql settings: {e}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO monitors (
                id, name, kind, target, port, interval_sec, retries, timeout_ms,
                expected_status, content_pattern, sql_settings, notify_on_down, is_paused
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                target = excluded.target,
                port = excluded.port,
                interval_sec = excluded.interval_sec,
                retries = excluded.retries,
                timeout_ms = excluded.timeout_ms,
                expected_status = excluded.expected_status,
                content_pattern = excluded.content_pattern,
                sql_settings = excluded.sql_settings,
                notify_on_down = excluded.notify_on_down,
                is_paused = excluded.is_paused
            "#,
        )
        .bind(monitor.id)
        .bind(&monitor.name)
        .bind(monitor.kind.to_string())
        .bind(&monitor.target)
        .bind(monitor.port.map(i64::from))
        .bind(monitor.interval_sec.map(|v| v as i64))
        .bind(monitor.retries.map(i64::from))
        .bind(monitor.timeout_ms.map(|v| v as i64))
        .bind(monitor.expected_status.map(i64::from))
        .bind(&monitor.content_pattern)
        .bind(sql_settings)
        .bind(monitor.notify_on_down)
        .bind(monitor.is_paused)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<Check>> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, status, latency_ms, error, created_at
            FROM checks
            WHERE monitor_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::check_from_row).collect()
    }

    #[instrument(skip(self, check), fields(monitor_id = check.monitor_id, status = %check.status))]
    async fn insert_check(&self, check: NewCheck) -> StorageResult<Check> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO checks (monitor_id, status, latency_ms, error, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(check.monitor_id)
        .bind(check.status.to_string())
        .bind(check.latency_ms.map(|v| v as i64))
        .bind(&check.error)
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(Check {
            id: result.last_insert_rowid(),
            monitor_id: check.monitor_id,
            status: check.status,
            latency_ms: check.latency_ms,
            error: check.error,
            // round-trip through the stored precision
            created_at: Self::millis_to_timestamp(created_at.timestamp_millis()),
        })
    }

    async fn open_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT id, monitor_id, started_at, ended_at, status
            FROM incidents
            WHERE monitor_id = ? AND status = 'OPEN'
            "#,
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::incident_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let result = sqlx::query(
            "INSERT INTO incidents (monitor_id, started_at, status) VALUES (?, ?, 'OPEN')",
        )
        .bind(monitor_id)
        .bind(started_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StorageError::IncidentAlreadyOpen(monitor_id),
            _ => StorageError::from(e),
        })?;

        Ok(Incident {
            id: result.last_insert_rowid(),
            monitor_id,
            started_at: Self::millis_to_timestamp(started_at.timestamp_millis()),
            ended_at: None,
            status: IncidentStatus::Open,
        })
    }

    #[instrument(skip(self))]
    async fn resolve_incident(
        &self,
        incident_id: i64,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let row = sqlx::query(
            r#"
            UPDATE incidents
            SET status = 'RESOLVED', ended_at = ?
            WHERE id = ?
            RETURNING id, monitor_id, started_at, ended_at, status
            "#,
        )
        .bind(ended_at.timestamp_millis())
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::QueryFailed(format!("incident {incident_id} not found")))?;

        Self::incident_from_row(&row)
    }

    async fn incidents(&self, monitor_id: MonitorId) -> StorageResult<Vec<Incident>> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, started_at, ended_at, status
            FROM incidents
            WHERE monitor_id = ?
            ORDER BY started_at, id
            "#,
        )
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::incident_from_row).collect()
    }

    #[instrument(skip(self, ssl))]
    async fn update_ssl(&self, monitor_id: MonitorId, ssl: &SslInfo) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE monitors
            SET ssl_expiry = ?, ssl_days_until_expiry = ?, ssl_issuer = ?, ssl_valid = ?
            WHERE id = ?
            "#,
        )
        .bind(ssl.cert_expiry.timestamp_millis())
        .bind(ssl.days_until_expiry)
        .bind(&ssl.issuer)
        .bind(ssl.valid)
        .bind(monitor_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::MonitorNotFound(monitor_id));
        }
        Ok(())
    }

    async fn push_subscriptions(&self) -> StorageResult<Vec<PushSubscription>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT endpoint, p256dh, auth FROM push_subscriptions")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(endpoint, p256dh, auth)| PushSubscription {
                endpoint,
                p256dh,
                auth,
            })
            .collect())
    }

    async fn relay_tokens(&self) -> StorageResult<Vec<RelayToken>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT owner, token FROM relay_tokens")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(owner, token)| RelayToken { owner, token })
            .collect())
    }

    async fn save_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StorageResult<()> {
        sqlx::query("INSERT OR REPLACE INTO push_subscriptions (endpoint, p256dh, auth) VALUES (?, ?, ?)")
            .bind(&subscription.endpoint)
            .bind(&subscription.p256dh)
            .bind(&subscription.auth)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_relay_token(&self, token: &RelayToken) -> StorageResult<()> {
        sqlx::query("INSERT OR REPLACE INTO relay_tokens (token, owner) VALUES (?, ?)")
            .bind(&token.token)
            .bind(&token.owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, window), fields(window = %window.name))]
    async fn save_maintenance_window(&self, window: &MaintenanceWindow) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let (window_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO maintenance_windows (name, start_at, end_at) VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET start_at = excluded.start_at, end_at = excluded.end_at
            RETURNING id
            "#,
        )
        .bind(&window.name)
        .bind(window.start.timestamp_millis())
        .bind(window.end.timestamp_millis())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM maintenance_monitors WHERE window_id = ?")
            .bind(window_id)
            .execute(&mut *tx)
            .await?;

        for monitor_id in &window.monitor_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO maintenance_monitors (window_id, monitor_id) VALUES (?, ?)",
            )
            .bind(window_id)
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl MaintenanceGate for SqliteStore {
    async fn is_in_maintenance(
        &self,
        monitor_id: MonitorId,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let now = now.timestamp_millis();
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM maintenance_windows w
            JOIN maintenance_monitors m ON m.window_id = w.id
            WHERE m.monitor_id = ? AND w.start_at <= ? AND w.end_at >= ?
            "#,
        )
        .bind(monitor_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }
}
