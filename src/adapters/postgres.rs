use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ConsolidatedOrder, OrderSide, TradeRecord};
use crate::error::{Result, TellerError};

use super::TradeStore;

/// Upper bound on the persisted error message
const ERROR_MAX_LEN: usize = 200;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch a trade row by id
    pub async fn get_trade(&self, trade_id: i64) -> Result<Option<TradeRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, crypto_code, crypto_atoms, fiat_code, type, error, created, updated
            FROM trades WHERE id = $1
            "#,
        )
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_trade(&r)).transpose()
    }

    /// Transaction ids linked to a trade: (cash-in origin, cash-out origin)
    pub async fn trade_links(&self, trade_id: i64) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
        let cash_in = sqlx::query_scalar::<_, Uuid>(
            "SELECT tx_id FROM cashin_tx_trades WHERE trade_id = $1",
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await?;

        let cash_out = sqlx::query_scalar::<_, Uuid>(
            "SELECT tx_id FROM cashout_tx_trades WHERE trade_id = $1",
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await?;

        Ok((cash_in, cash_out))
    }
}

fn row_to_trade(row: &PgRow) -> Result<TradeRecord> {
    let crypto_atoms: String = row.get("crypto_atoms");
    let crypto_atoms = Decimal::from_str(&crypto_atoms)
        .map_err(|e| TellerError::Validation(format!("bad crypto_atoms in trade row: {e}")))?;

    let side: String = row.get("type");
    let side = OrderSide::try_from(side.as_str()).map_err(TellerError::Validation)?;

    Ok(TradeRecord {
        id: row.get("id"),
        crypto_code: row.get("crypto_code"),
        crypto_atoms,
        fiat_code: row.get("fiat_code"),
        side,
        error: row.get("error"),
        created: row.get("created"),
        updated: row.get("updated"),
    })
}

/// Truncate on a char boundary so multibyte messages survive the cut
fn truncate_message(message: &str) -> &str {
    match message.char_indices().nth(ERROR_MAX_LEN) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

#[async_trait]
impl TradeStore for PostgresStore {
    async fn record(&self, order: &ConsolidatedOrder) -> Result<TradeRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO trades (crypto_code, crypto_atoms, fiat_code, type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, crypto_code, crypto_atoms, fiat_code, type, error, created, updated
            "#,
        )
        .bind(&order.market.crypto_code)
        .bind(order.quantity().to_string())
        .bind(&order.market.fiat_code)
        .bind(order.side().as_str())
        .fetch_one(&mut *tx)
        .await?;

        let record = row_to_trade(&row)?;

        for tx_id in &order.cash_in_txs {
            sqlx::query("INSERT INTO cashin_tx_trades (tx_id, trade_id) VALUES ($1, $2)")
                .bind(tx_id)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
        }
        for tx_id in &order.cash_out_txs {
            sqlx::query("INSERT INTO cashout_tx_trades (tx_id, trade_id) VALUES ($1, $2)")
                .bind(tx_id)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(
            "Recorded trade {}: {} {} {} for {} links",
            record.id,
            record.side,
            record.crypto_atoms,
            record.crypto_code,
            order.cash_in_txs.len() + order.cash_out_txs.len()
        );
        Ok(record)
    }

    async fn update_error(&self, trade_id: i64, message: &str) -> Result<()> {
        sqlx::query("UPDATE trades SET error = $1, updated = now() WHERE id = $2")
            .bind(truncate_message(message))
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
