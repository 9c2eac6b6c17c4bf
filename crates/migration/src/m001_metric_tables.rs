use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_metric_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(CREATE_GAUGES).await?;
        db.execute_unprepared(CREATE_COUNTERS).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS counters").await?;
        db.execute_unprepared("DROP TABLE IF EXISTS gauges").await?;
        Ok(())
    }
}

// Portable across SQLite and PostgreSQL.
const CREATE_GAUGES: &str = "
CREATE TABLE IF NOT EXISTS gauges (
    metric_name TEXT PRIMARY KEY NOT NULL,
    value DOUBLE PRECISION NOT NULL
)";

const CREATE_COUNTERS: &str = "
CREATE TABLE IF NOT EXISTS counters (
    metric_name TEXT PRIMARY KEY NOT NULL,
    value BIGINT NOT NULL
)";
