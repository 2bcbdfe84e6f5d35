//! Snapshot persistence behind a session-keyed store port.
//!
//! The engines never touch storage directly; everything goes through
//! `SnapshotStore`. The SQLite implementation keeps one serialized
//! snapshot document per session plus an equity-curve history table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::PortfolioSnapshot;

/// One point of the session's equity history.
#[derive(Debug, Clone)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub wallet_balance: Decimal,
    pub positions_value: Decimal,
    pub equity: Decimal,
}

/// Session-keyed persistence port.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for a session, if one was ever saved.
    async fn load(&self, session: &str) -> Result<Option<PortfolioSnapshot>>;

    /// Save the snapshot for a session, replacing any previous one.
    async fn save(&self, session: &str, snapshot: &PortfolioSnapshot) -> Result<()>;

    /// Append a point to the session's equity history.
    async fn record_equity_point(&self, session: &str, point: &EquityPoint) -> Result<()>;

    /// Most recent equity points, oldest first.
    async fn equity_curve(&self, session: &str, limit: i64) -> Result<Vec<EquityPoint>>;
}

/// Equity row as stored; REAL columns, converted back to Decimal on read.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EquityRow {
    timestamp: String,
    wallet_balance: f64,
    positions_value: f64,
    equity: f64,
}

impl EquityRow {
    fn into_point(self) -> EquityPoint {
        EquityPoint {
            timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            wallet_balance: Decimal::from_f64(self.wallet_balance).unwrap_or(Decimal::ZERO),
            positions_value: Decimal::from_f64(self.positions_value).unwrap_or(Decimal::ZERO),
            equity: Decimal::from_f64(self.equity).unwrap_or(Decimal::ZERO),
        }
    }
}

/// SQLite-backed snapshot store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        // An in-memory database lives and dies with its connection, so the
        // pool must hold exactly one.
        let (max, min) = if database_url.contains(":memory:") {
            (1, 1)
        } else {
            (5, 0)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .min_connections(min)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                session TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_curve (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                wallet_balance REAL NOT NULL,
                positions_value REAL NOT NULL,
                equity REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_equity_session ON equity_curve(session, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load(&self, session: &str) -> Result<Option<PortfolioSnapshot>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM snapshots WHERE session = ?")
                .bind(session)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load snapshot")?;

        match body {
            Some(body) => {
                let snapshot =
                    serde_json::from_str(&body).context("Failed to decode snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &str, snapshot: &PortfolioSnapshot) -> Result<()> {
        let body = serde_json::to_string(snapshot).context("Failed to encode snapshot")?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (session, body, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(session) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save snapshot")?;

        Ok(())
    }

    async fn record_equity_point(&self, session: &str, point: &EquityPoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO equity_curve (session, timestamp, wallet_balance, positions_value, equity)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(session)
        .bind(point.timestamp.to_rfc3339())
        .bind(point.wallet_balance.to_f64().unwrap_or(0.0))
        .bind(point.positions_value.to_f64().unwrap_or(0.0))
        .bind(point.equity.to_f64().unwrap_or(0.0))
        .execute(&self.pool)
        .await
        .context("Failed to record equity point")?;

        Ok(())
    }

    async fn equity_curve(&self, session: &str, limit: i64) -> Result<Vec<EquityPoint>> {
        let rows: Vec<EquityRow> = sqlx::query_as(
            r#"
            SELECT timestamp, wallet_balance, positions_value, equity
            FROM (
                SELECT * FROM equity_curve
                WHERE session = ?
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(session)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load equity curve")?;

        Ok(rows.into_iter().map(EquityRow::into_point).collect())
    }
}
