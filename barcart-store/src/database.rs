use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::app_config::FeeOverride;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct FeeSettingRow {
    state: String,
    commission_percent: f64,
    fixed_fee_cents: i64,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Per-state platform fee rules maintained by operators. These win over
    /// the file configuration.
    pub async fn fetch_fee_overrides(
        &self,
        mut overrides: HashMap<String, FeeOverride>,
    ) -> Result<HashMap<String, FeeOverride>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FeeSettingRow>(
            "SELECT state, commission_percent, fixed_fee_cents FROM platform_fee_settings WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            overrides.insert(
                row.state.trim().to_ascii_uppercase(),
                FeeOverride {
                    commission_percent: row.commission_percent,
                    fixed_fee_cents: row.fixed_fee_cents,
                },
            );
        }

        Ok(overrides)
    }
}
