use crate::db::DbPool;
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: DatabaseConnection,
}
