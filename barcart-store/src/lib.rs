pub mod app_config;
pub mod database;
pub mod marketplace_repo;
pub mod order_repo;
pub mod redis_repo;
pub mod stripe;

pub use database::DbClient;
pub use marketplace_repo::PgMarketplace;
pub use order_repo::PgOrderRepository;
pub use redis_repo::RedisClient;
pub use stripe::StripeClient;
