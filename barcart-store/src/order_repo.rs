use async_trait::async_trait;
use barcart_core::repository::{
    InsertOutcome, NewOrder, NewOrderItem, OrderRecord, OrderRepository,
};
use barcart_core::BoxError;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    store_id: Uuid,
    total_cents: i64,
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<OrderRecord>, BoxError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, order_number, store_id, total_cents
            FROM orders
            WHERE stripe_payment_intent_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(payment_intent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderRecord {
                id: r.id,
                order_number: r.order_number,
                store_id: r.store_id,
                total_cents: r.total_cents,
            })
            .collect())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, BoxError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, store_id,
                subtotal_cents, tax_cents, delivery_fee_cents, platform_fee_cents, total_cents,
                status, payment_status, payment_method, stripe_payment_intent_id,
                shipping_address, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (stripe_payment_intent_id, store_id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.store_id)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.delivery_fee_cents)
        .bind(order.platform_fee_cents)
        .bind(order.total_cents)
        .bind(order.status.as_str())
        .bind(&order.payment_status)
        .bind(&order.payment_method)
        .bind(&order.stripe_payment_intent_id)
        .bind(&order.shipping_address)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(intent = %order.stripe_payment_intent_id, store = %order.store_id, "order insert hit unique key");
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BoxError> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, inventory_id, product_id, product_name, quantity,
                    unit_price_cents, subtotal_cents, tax_cents, total_cents
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.inventory_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(i32::try_from(item.quantity)?)
            .bind(item.unit_price_cents)
            .bind(item.subtotal_cents)
            .bind(item.tax_cents)
            .bind(item.total_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
