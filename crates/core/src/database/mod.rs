pub mod migrations;
pub mod sqlx_pool;
