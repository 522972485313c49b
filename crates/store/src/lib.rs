//! SQLite persistence for pair settings, order records and per-cycle
//! profit summaries.
//!
//! The store is the only shared mutable resource between the cycle
//! workers and the sweeper. No transaction spans more than one record
//! update; the tables are treated as an eventually-consistent cache of
//! exchange truth, with the sweeper as the reconciler of last resort.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::debug;

use common::{OrderRecord, OrderSide, OrderStatus, PairSettings, ProfitRecord, Result, STRATEGY_TAG};

/// Embedded workspace migrations, applied by the binary at startup and
/// by [`Store::in_memory`] for tests and paper runs.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// A new order row as written by the cycle engine. Timestamps are
/// assigned at insert time.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub cycle_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub status: OrderStatus,
    pub filled_size: Option<f64>,
    pub strategy: String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// In-memory store with migrations applied. A uniquely named
    /// shared-cache database is used so the whole pool sees the same
    /// in-memory data (plain `sqlite::memory:` connections are each a
    /// distinct database).
    ///
    /// Every connection is established and returned to the idle queue
    /// before this returns, so later acquires complete synchronously.
    /// Tests run under tokio's paused clock, which auto-advances past
    /// sqlx's acquire timeout whenever an acquire has to wait on the
    /// sqlite worker thread; a warm pool never arms that timer.
    pub async fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_DB_ID: AtomicU64 = AtomicU64::new(0);
        let id = NEXT_DB_ID.fetch_add(1, Ordering::Relaxed);

        // While this blocking task is alive, tokio's paused test clock
        // does not auto-advance, so the setup below runs in real time
        // even under `start_paused`. Otherwise the clock jumps past
        // sqlx's acquire timeout while the sqlite worker thread is
        // still establishing the connection.
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let inhibit_auto_advance = tokio::task::spawn_blocking(move || {
            let _ = done_rx.recv();
        });

        let result = async {
            const POOL_SIZE: u32 = 10;
            let pool = SqlitePoolOptions::new()
                .max_connections(POOL_SIZE)
                .idle_timeout(None)
                .max_lifetime(None)
                .test_before_acquire(false)
                .connect(&format!(
                    "sqlite:file:store_in_memory_{id}?mode=memory&cache=shared"
                ))
                .await?;
            MIGRATOR.run(&pool).await?;

            let mut warm = Vec::new();
            for _ in 0..POOL_SIZE {
                warm.push(pool.acquire().await?);
            }
            drop(warm);
            while pool.num_idle() < POOL_SIZE as usize {
                tokio::task::yield_now().await;
            }
            Ok(Self::new(pool))
        }
        .await;

        drop(done_tx);
        let _ = inhibit_auto_advance.await;
        result
    }

    // ── settings ─────────────────────────────────────────────────────

    /// All active buy-then-sell pairs. The strategy tag filter accepts
    /// the legacy "BTS" spelling alongside "BUY_SELL".
    pub async fn active_pairs(&self) -> Result<Vec<PairSettings>> {
        let pairs = sqlx::query_as::<_, PairSettings>(
            r#"
            SELECT * FROM settings
            WHERE active = 1 AND UPPER(strategy) IN ('BUY_SELL', 'BTS')
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(pairs)
    }

    /// Current settings row for one symbol, if still present.
    pub async fn pair(&self, symbol: &str) -> Result<Option<PairSettings>> {
        let pair = sqlx::query_as::<_, PairSettings>(
            "SELECT * FROM settings WHERE symbol = ?1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pair)
    }

    pub async fn upsert_pair(&self, s: &PairSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings
                (symbol, strategy, active, amount, sell_bonus,
                 check_delay, cycle_delay, api_key, api_secret, api_passphrase)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(symbol) DO UPDATE SET
                strategy = excluded.strategy,
                active = excluded.active,
                amount = excluded.amount,
                sell_bonus = excluded.sell_bonus,
                check_delay = excluded.check_delay,
                cycle_delay = excluded.cycle_delay,
                api_key = excluded.api_key,
                api_secret = excluded.api_secret,
                api_passphrase = excluded.api_passphrase
            "#,
        )
        .bind(&s.symbol)
        .bind(&s.strategy)
        .bind(s.active)
        .bind(s.amount)
        .bind(s.sell_bonus)
        .bind(s.check_delay)
        .bind(s.cycle_delay)
        .bind(&s.api_key)
        .bind(&s.api_secret)
        .bind(&s.api_passphrase)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── orders ───────────────────────────────────────────────────────

    pub async fn insert_order(&self, o: &NewOrder) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, cycle_id, symbol, side, price, status,
                 filled_size, strategy, created_at, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&o.order_id)
        .bind(&o.cycle_id)
        .bind(&o.symbol)
        .bind(o.side)
        .bind(o.price)
        .bind(o.status)
        .bind(o.filled_size)
        .bind(&o.strategy)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        debug!(
            symbol = %o.symbol,
            side = %o.side,
            status = %o.status,
            cycle_id = %o.cycle_id,
            "Order record saved"
        );
        Ok(())
    }

    /// Mark an order executed, recording the fill price and size when
    /// known. Identity fields are never touched.
    pub async fn mark_executed(
        &self,
        order_id: &str,
        avg_price: Option<f64>,
        filled_size: Option<f64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                status = ?1,
                price = COALESCE(?2, price),
                filled_size = COALESCE(?3, filled_size),
                last_updated = ?4
            WHERE order_id = ?5
            "#,
        )
        .bind(OrderStatus::Executed)
        .bind(avg_price)
        .bind(filled_size)
        .bind(Utc::now())
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Refresh only `last_updated` — a liveness signal for orders the
    /// sweeper checked and found still unfilled. Status is untouched.
    pub async fn touch_order(&self, order_id: &str) -> Result<()> {
        sqlx::query("UPDATE orders SET last_updated = ?1 WHERE order_id = ?2")
            .bind(Utc::now())
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The `limit` oldest still-unresolved orders for a symbol,
    /// oldest `last_updated` first.
    pub async fn stale_orders(&self, symbol: &str, limit: i64) -> Result<Vec<OrderRecord>> {
        let orders = sqlx::query_as::<_, OrderRecord>(
            r#"
            SELECT * FROM orders
            WHERE symbol = ?1 AND strategy = ?2 AND status IN ('pending', 'open')
            ORDER BY last_updated ASC
            LIMIT ?3
            "#,
        )
        .bind(symbol)
        .bind(STRATEGY_TAG)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// All executed legs of one cycle, oldest first.
    pub async fn executed_orders(&self, cycle_id: &str) -> Result<Vec<OrderRecord>> {
        let orders = sqlx::query_as::<_, OrderRecord>(
            r#"
            SELECT * FROM orders
            WHERE cycle_id = ?1 AND strategy = ?2 AND status = 'executed'
            ORDER BY created_at ASC
            "#,
        )
        .bind(cycle_id)
        .bind(STRATEGY_TAG)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    pub async fn order(&self, order_id: &str) -> Result<Option<OrderRecord>> {
        let order = sqlx::query_as::<_, OrderRecord>(
            "SELECT * FROM orders WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    // ── profit_per_cycle ─────────────────────────────────────────────

    /// Insert-or-overwrite the profit summary for a cycle. Settlement
    /// is a pure function of the stored legs, so overwriting an
    /// existing row recomputes identical values.
    pub async fn upsert_profit(&self, p: &ProfitRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profit_per_cycle
                (cycle_id, symbol, strategy, buy_price, sell_price,
                 profit_percent, profit_coin, profit_usdt, execution_secs, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(cycle_id) DO UPDATE SET
                symbol = excluded.symbol,
                strategy = excluded.strategy,
                buy_price = excluded.buy_price,
                sell_price = excluded.sell_price,
                profit_percent = excluded.profit_percent,
                profit_coin = excluded.profit_coin,
                profit_usdt = excluded.profit_usdt,
                execution_secs = excluded.execution_secs,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&p.cycle_id)
        .bind(&p.symbol)
        .bind(&p.strategy)
        .bind(p.buy_price)
        .bind(p.sell_price)
        .bind(p.profit_percent)
        .bind(p.profit_coin)
        .bind(p.profit_usdt)
        .bind(p.execution_secs)
        .bind(p.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn profit(&self, cycle_id: &str) -> Result<Option<ProfitRecord>> {
        let profit = sqlx::query_as::<_, ProfitRecord>(
            "SELECT * FROM profit_per_cycle WHERE cycle_id = ?1",
        )
        .bind(cycle_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profit)
    }
}
