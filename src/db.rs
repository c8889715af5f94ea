use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("tracker_db")]
pub struct TrackerDb(sqlx::PgPool);
