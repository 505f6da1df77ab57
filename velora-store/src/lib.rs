pub mod app_config;
pub mod cart_repo;
pub mod database;
pub mod redis_repo;

pub use cart_repo::PgCartRepository;
pub use database::DbClient;
pub use redis_repo::RedisClient;
