use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::persistence::{TransitionRow, TransitionStore};

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

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn row_to_transition(row: &PgRow) -> TransitionRow {
    TransitionRow {
        id: row.get("id"),
        stock: row.get("stock"),
        date: row.get("date"),
        interval: row.get("interval"),
        action: row.get("action"),
        reward: row.get("reward"),
        features: row.get("features"),
        strategy_config: row.get("strategy_config"),
        done: row.get("done"),
        missed_pnl: row.get("missed_pnl"),
        holding_cost: row.get("holding_cost"),
        slippage_penalty: row.get("slippage_penalty"),
        capital_efficiency: row.get("capital_efficiency"),
        state: row.get("state"),
        next_features: row.get("next_features"),
        breakdown: row.get("breakdown"),
        recorded_at: row.get("recorded_at"),
    }
}

#[async_trait]
impl TransitionStore for PostgresStore {
    /// Re-appending the same transition id is a no-op
    #[instrument(skip(self, row), fields(stock = %row.stock, id = %row.id))]
    async fn append(&self, row: &TransitionRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transitions (
                id, stock, date, "interval", action, reward, features, strategy_config,
                done, missed_pnl, holding_cost, slippage_penalty, capital_efficiency,
                state, next_features, breakdown, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(&row.stock)
        .bind(row.date)
        .bind(&row.interval)
        .bind(row.action)
        .bind(row.reward)
        .bind(&row.features)
        .bind(&row.strategy_config)
        .bind(row.done)
        .bind(row.missed_pnl)
        .bind(row.holding_cost)
        .bind(row.slippage_penalty)
        .bind(row.capital_efficiency)
        .bind(&row.state)
        .bind(&row.next_features)
        .bind(&row.breakdown)
        .bind(row.recorded_at)
        .execute(&self.pool)
        .await?;

        debug!("transition persisted");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TransitionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock, date, "interval", action, reward, features, strategy_config,
                   done, missed_pnl, holding_cost, slippage_penalty, capital_efficiency,
                   state, next_features, breakdown, recorded_at
            FROM transitions
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_transition).collect())
    }
}
