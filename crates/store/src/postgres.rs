use async_trait::async_trait;
use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{
    AdjustmentKind, Aggregate, InventoryRecord, Money, Order, StatsAdjustment, UserOrderStats,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    store::{InventoryStore, OrderStore, UserStatsStore, identity_of},
};

const ORDER_COLUMNS: &str = "document, version";

const INVENTORY_COLUMNS: &str = "product_id, name, category, unit_price_cents, available_quantity";

/// PostgreSQL-backed store for orders, inventory and user stats.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        let mut order: Order = serde_json::from_value(document)?;
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    fn row_to_inventory(row: PgRow) -> Result<InventoryRecord> {
        let product_id: String = row.try_get("product_id")?;
        let quantity: i32 = row.try_get("available_quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| {
            StoreError::InvalidRecord(format!(
                "negative quantity {quantity} for product {product_id}"
            ))
        })?;

        let record = InventoryRecord::new(
            product_id,
            row.try_get::<String, _>("name")?,
            Money::from_cents(row.try_get("unit_price_cents")?),
            quantity,
        );

        Ok(match row.try_get::<Option<String>, _>("category")? {
            Some(category) => record.with_category(category),
            None => record,
        })
    }

    async fn fetch_order(&self, sql: &str, bind: &str) -> Result<Option<Order>> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }
}

fn updated_at(order: &Order) -> chrono::DateTime<chrono::Utc> {
    order
        .updated_at()
        .or(order.created_at())
        .unwrap_or_else(chrono::Utc::now)
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert(&self, order: &Order) -> Result<Version> {
        let (order_id, order_number) = identity_of(order)?;
        let user_id = order
            .user_id()
            .ok_or_else(|| StoreError::InvalidRecord("order has no user".to_string()))?;
        let document = serde_json::to_value(order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, status, payment_status, checkout_session_id,
                total_cents, version, document, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order_number.as_str())
        .bind(user_id.as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.payment().checkout_session_id.as_deref())
        .bind(order.total_amount().cents())
        .bind(Version::first().as_i64())
        .bind(document)
        .bind(order.created_at().unwrap_or_else(chrono::Utc::now))
        .bind(updated_at(order))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("unique_order_number") => {
                        return StoreError::DuplicateOrderNumber(order_number.clone());
                    }
                    Some("orders_pkey") => {
                        return StoreError::ConcurrencyConflict {
                            order_id,
                            expected: Version::initial(),
                            actual: Version::first(),
                        };
                    }
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        Ok(Version::first())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn get_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        self.fetch_order(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"),
            order_number.as_str(),
        )
        .await
    }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>> {
        self.fetch_order(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE checkout_session_id = $1 \
                 ORDER BY updated_at DESC LIMIT 1"
            ),
            session_id,
        )
        .await
    }

    async fn update(&self, order: &Order, expected: Version) -> Result<Version> {
        let (order_id, _) = identity_of(order)?;
        let next = expected.next();
        let document = serde_json::to_value(order)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                payment_status = $4,
                checkout_session_id = $5,
                total_cents = $6,
                version = $7,
                document = $8,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_i64())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.payment().checkout_session_id.as_deref())
        .bind(order.total_amount().cents())
        .bind(next.as_i64())
        .bind(document)
        .bind(updated_at(order))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        // Nothing matched: either the order is gone or someone else wrote first.
        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => {
                tracing::debug!(%order_id, %expected, actual, "conditional order update lost");
                Err(StoreError::ConcurrencyConflict {
                    order_id,
                    expected,
                    actual: Version::new(actual),
                })
            }
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn list(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.payment_status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_status = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(payment_status) = query.payment_status {
            sqlx_query = sqlx_query.bind(payment_status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn get_availability(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_inventory).transpose()
    }

    async fn upsert(&self, record: InventoryRecord) -> Result<()> {
        let quantity = i32::try_from(record.available_quantity()).map_err(|_| {
            StoreError::InvalidRecord(format!(
                "quantity {} out of range for product {}",
                record.available_quantity(),
                record.product_id()
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, name, category, unit_price_cents, available_quantity, is_available_for_sale
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                unit_price_cents = EXCLUDED.unit_price_cents,
                available_quantity = EXCLUDED.available_quantity,
                is_available_for_sale = EXCLUDED.is_available_for_sale,
                updated_at = NOW()
            "#,
        )
        .bind(record.product_id().as_str())
        .bind(record.name())
        .bind(record.category())
        .bind(record.unit_price().cents())
        .bind(quantity)
        .bind(record.is_available_for_sale())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn adjust_quantity(
        &self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<InventoryRecord> {
        // Right-hand sides see the pre-update row, so both columns derive
        // from the same old quantity.
        let row = sqlx::query(&format!(
            r#"
            UPDATE inventory
            SET available_quantity =
                    LEAST(GREATEST(available_quantity::BIGINT + $2::BIGINT, 0), 2147483647)::INTEGER,
                is_available_for_sale = (available_quantity::BIGINT + $2::BIGINT) > 0,
                updated_at = NOW()
            WHERE product_id = $1
            RETURNING {INVENTORY_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_inventory(row),
            None => Err(StoreError::ProductNotFound(product_id.clone())),
        }
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE inventory
            SET available_quantity =
                    LEAST(available_quantity::BIGINT + $2::BIGINT, 2147483647)::INTEGER,
                is_available_for_sale = (available_quantity::BIGINT + $2::BIGINT) > 0,
                updated_at = NOW()
            WHERE product_id = $1
            RETURNING {INVENTORY_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_inventory(row),
            None => Err(StoreError::ProductNotFound(product_id.clone())),
        }
    }
}

#[async_trait]
impl UserStatsStore for PostgresStore {
    async fn get_stats(&self, user_id: UserId) -> Result<Option<UserOrderStats>> {
        let row = sqlx::query(
            "SELECT total_orders, total_spent_cents FROM user_order_stats WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let total_orders: i32 = row.try_get("total_orders")?;
        let total_spent: i64 = row.try_get("total_spent_cents")?;

        let applied = sqlx::query(
            "SELECT order_id, kind FROM user_stat_adjustments WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
            let kind = match row.try_get::<String, _>("kind")?.as_str() {
                "placed" => AdjustmentKind::Placed,
                "reversed" => AdjustmentKind::Reversed,
                other => {
                    return Err(StoreError::InvalidRecord(format!(
                        "unknown adjustment kind {other}"
                    )));
                }
            };
            Ok((order_id, kind))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(UserOrderStats::from_parts(
            user_id,
            u32::try_from(total_orders).unwrap_or(0),
            Money::from_cents(total_spent),
            applied,
        )))
    }

    async fn apply_adjustment(&self, adjustment: &StatsAdjustment) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if adjustment.kind == AdjustmentKind::Reversed {
            let placed: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM user_stat_adjustments WHERE order_id = $1 AND kind = 'placed'",
            )
            .bind(adjustment.order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            if placed.is_none() {
                return Ok(false);
            }
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_stat_adjustments (order_id, kind, user_id, amount_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, kind) DO NOTHING
            "#,
        )
        .bind(adjustment.order_id.as_uuid())
        .bind(adjustment.kind.as_str())
        .bind(adjustment.user_id.as_uuid())
        .bind(adjustment.amount.cents())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        let (order_delta, spent_delta) = match adjustment.kind {
            AdjustmentKind::Placed => (1_i32, adjustment.amount.cents()),
            AdjustmentKind::Reversed => (-1_i32, -adjustment.amount.cents()),
        };

        sqlx::query(
            r#"
            INSERT INTO user_order_stats (user_id, total_orders, total_spent_cents)
            VALUES ($1, GREATEST($2::INTEGER, 0), GREATEST($3::BIGINT, 0))
            ON CONFLICT (user_id) DO UPDATE SET
                total_orders = GREATEST(user_order_stats.total_orders + $2::INTEGER, 0),
                total_spent_cents = GREATEST(user_order_stats.total_spent_cents + $3::BIGINT, 0),
                updated_at = NOW()
            "#,
        )
        .bind(adjustment.user_id.as_uuid())
        .bind(order_delta)
        .bind(spent_delta)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
