// Trade journal backed by a local sqlite database
use crate::models::Direction;
use crate::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Durable record of orders and decision events
///
/// Fire-and-forget from the trading core's perspective: callers log write
/// failures and keep trading. Use [`Journal::record_order_logged`] /
/// [`Journal::record_event_logged`] from the orchestrator.
pub struct Journal {
    pool: SqlitePool,
}

impl Journal {
    /// Open (creating if needed) the journal database and its tables
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                pnl REAL NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        tracing::info!("Journal opened at {}", path);
        Ok(Self { pool })
    }

    pub async fn record_order(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        exit_price: f64,
        pnl_percent: f64,
    ) -> Result<()> {
        let side = match direction {
            Direction::Long => "long",
            Direction::Short => "short",
        };

        sqlx::query(
            "INSERT INTO orders (timestamp, symbol, side, entry_price, exit_price, pnl) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(symbol)
        .bind(side)
        .bind(entry_price)
        .bind(exit_price)
        .bind(pnl_percent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_event(&self, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO events (timestamp, message) VALUES (?, ?)")
            .bind(Utc::now().to_rfc3339())
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record an order, downgrading failures to a warning
    pub async fn record_order_logged(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        exit_price: f64,
        pnl_percent: f64,
    ) {
        if let Err(e) = self
            .record_order(symbol, direction, entry_price, exit_price, pnl_percent)
            .await
        {
            tracing::warn!("Failed to journal order: {}", e);
        }
    }

    /// Record an event, downgrading failures to a warning
    pub async fn record_event_logged(&self, message: &str) {
        if let Err(e) = self.record_event(message).await {
            tracing::warn!("Failed to journal event: {}", e);
        }
    }

    /// Close the underlying pool; called on shutdown
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub async fn order_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    #[cfg(test)]
    pub async fn event_messages(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT message FROM events ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }
}
