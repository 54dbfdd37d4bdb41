//! Postgres-backed stores, stock, delivery partners and owner notifications.

use async_trait::async_trait;
use barcart_core::inventory::{DecrementOutcome, InventoryLevel, InventoryRequest, InventoryService};
use barcart_core::repository::{
    DeliveryCompany, DeliveryRepository, NewDelivery, Notification, NotificationService,
    StoreDirectory, StoreLocation, StoreProfile,
};
use barcart_core::BoxError;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PgMarketplace {
    pool: PgPool,
}

impl PgMarketplace {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    name: String,
    tenant_id: Option<Uuid>,
    stripe_account_id: Option<String>,
    delivery_fee_cents: Option<i64>,
    free_delivery_threshold_cents: Option<i64>,
}

impl From<StoreRow> for StoreProfile {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            tenant_id: row.tenant_id,
            payout_account_id: row.stripe_account_id.filter(|a| !a.is_empty()),
            delivery_fee_cents: row.delivery_fee_cents,
            free_delivery_threshold_cents: row.free_delivery_threshold_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: Uuid,
    store_id: Uuid,
    name: Option<String>,
    address_line: String,
    city: String,
    state: String,
    zip_code: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct StockRow {
    id: Uuid,
    quantity: i64,
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    is_active: bool,
}

impl From<CompanyRow> for DeliveryCompany {
    fn from(row: CompanyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
        }
    }
}

#[async_trait]
impl StoreDirectory for PgMarketplace {
    async fn get_stores(&self, ids: &[Uuid]) -> Result<Vec<StoreProfile>, BoxError> {
        let rows = sqlx::query_as::<_, StoreRow>(
            r#"
            SELECT id, name, tenant_id, stripe_account_id, delivery_fee_cents, free_delivery_threshold_cents
            FROM stores
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoreProfile::from).collect())
    }

    async fn primary_location(&self, store_id: Uuid) -> Result<Option<StoreLocation>, BoxError> {
        let row = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, store_id, name, address_line, city, state, zip_code, latitude, longitude
            FROM store_locations
            WHERE store_id = $1
            ORDER BY is_primary DESC, created_at
            LIMIT 1
            "#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoreLocation {
            id: r.id,
            store_id: r.store_id,
            name: r.name,
            address_line: r.address_line,
            city: r.city,
            state: r.state,
            zip_code: r.zip_code,
            latitude: r.latitude,
            longitude: r.longitude,
        }))
    }
}

#[async_trait]
impl InventoryService for PgMarketplace {
    async fn check_availability(
        &self,
        requests: &[InventoryRequest],
    ) -> Result<Vec<InventoryLevel>, BoxError> {
        let ids: Vec<Uuid> = requests.iter().map(|r| r.inventory_id).collect();
        let rows = sqlx::query_as::<_, StockRow>("SELECT id, quantity FROM inventory WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| InventoryLevel {
                inventory_id: r.id,
                available: r.quantity,
            })
            .collect())
    }

    async fn reserve_and_decrement(
        &self,
        inventory_id: Uuid,
        quantity: u32,
    ) -> Result<DecrementOutcome, BoxError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory
            SET quantity = quantity - $2, updated_at = now()
            WHERE id = $1 AND quantity >= $2
            RETURNING quantity
            "#,
        )
        .bind(inventory_id)
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(DecrementOutcome::Decremented { remaining });
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT quantity FROM inventory WHERE id = $1")
            .bind(inventory_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match available {
            Some(available) => DecrementOutcome::Insufficient { available },
            None => DecrementOutcome::NotFound,
        })
    }
}

#[async_trait]
impl DeliveryRepository for PgMarketplace {
    async fn preferred_companies(&self, store_id: Uuid) -> Result<Vec<DeliveryCompany>, BoxError> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT dc.id, dc.name, dc.is_active
            FROM store_delivery_preferences p
            JOIN delivery_companies dc ON dc.id = p.delivery_company_id
            WHERE p.store_id = $1 AND p.is_active AND dc.is_active
            ORDER BY p.priority
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeliveryCompany::from).collect())
    }

    async fn active_companies(&self) -> Result<Vec<DeliveryCompany>, BoxError> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, is_active FROM delivery_companies WHERE is_active ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeliveryCompany::from).collect())
    }

    async fn create_delivery(&self, delivery: &NewDelivery) -> Result<Uuid, BoxError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO deliveries (
                id, order_id, store_id, delivery_company_id,
                pickup_address, dropoff_address, delivery_fee_cents, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(delivery.store_id)
        .bind(delivery.delivery_company_id)
        .bind(&delivery.pickup_address)
        .bind(&delivery.dropoff_address)
        .bind(delivery.delivery_fee_cents)
        .bind(&delivery.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn auto_assign_driver(&self, delivery_id: Uuid) -> Result<Option<Uuid>, BoxError> {
        let mut tx = self.pool.begin().await?;

        // Least recently assigned available driver of the delivery's company
        let driver: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE drivers
            SET is_available = false, last_assigned_at = now()
            WHERE id = (
                SELECT d.id
                FROM drivers d
                JOIN deliveries dl ON dl.delivery_company_id = d.delivery_company_id
                WHERE dl.id = $1 AND d.is_available
                ORDER BY d.last_assigned_at NULLS FIRST
                LIMIT 1
                FOR UPDATE OF d SKIP LOCKED
            )
            RETURNING id
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(driver_id) = driver else {
            debug!(delivery = %delivery_id, "no available driver");
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE deliveries SET driver_id = $2, status = 'assigned', assigned_at = now() WHERE id = $1",
        )
        .bind(delivery_id)
        .bind(driver_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(delivery = %delivery_id, driver = %driver_id, "driver assigned");
        Ok(Some(driver_id))
    }
}

#[async_trait]
impl NotificationService for PgMarketplace {
    async fn notify_store_owners(
        &self,
        store_id: Uuid,
        notification: &Notification,
    ) -> Result<usize, BoxError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, order_id, store_id)
            SELECT gen_random_uuid(), tm.user_id, $2, $3, $4, $5, s.id
            FROM stores s
            JOIN tenant_members tm ON tm.tenant_id = s.tenant_id
            WHERE s.id = $1 AND tm.role = 'owner'
            "#,
        )
        .bind(store_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}
