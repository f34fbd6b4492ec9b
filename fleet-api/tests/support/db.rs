use fleet_api::db::{DbClient, DbConfig};

pub async fn test_db_client() -> DbClient {
    let config = DbConfig::from_env();
    let db = DbClient::from_config(&config).expect("Failed to create database client");
    db.apply_schema().await.expect("Failed to apply schema");
    db
}
