use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ModuleInfo;
use crate::database::Database;
use crate::error::{Result, ServerError};

const MODULE_COLUMNS: &str =
    "id, created_at, updated_at, module_name, module_duration, exam_type, version";

/// Persistence port for [`ModuleInfo`].
#[async_trait]
pub trait ModuleInfoRepository: Send + Sync {
    /// Insert a new module. Fills `id`, timestamps and `version`.
    async fn insert(&self, module: &mut ModuleInfo) -> Result<()>;

    async fn get(&self, id: i64) -> Result<ModuleInfo>;

    /// Every module, ordered by identifier.
    async fn list(&self) -> Result<Vec<ModuleInfo>>;

    /// Persist a modified module if its `version` is still current.
    /// Bumps `version` on success.
    async fn update(&self, module: &mut ModuleInfo) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct ModuleInfoRecord {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    module_name: String,
    module_duration: i32,
    exam_type: String,
    version: i32,
}

impl From<ModuleInfoRecord> for ModuleInfo {
    fn from(record: ModuleInfoRecord) -> Self {
        ModuleInfo {
            id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            module_name: record.module_name,
            module_duration: record.module_duration,
            exam_type: record.exam_type,
            version: record.version,
        }
    }
}

/// PostgreSQL implementation of [`ModuleInfoRepository`].
#[derive(Clone, Debug)]
pub struct PgModuleInfoRepository {
    db: Database,
}

impl PgModuleInfoRepository {
    /// Create a new [`PgModuleInfoRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModuleInfoRepository for PgModuleInfoRepository {
    async fn insert(&self, module: &mut ModuleInfo) -> Result<()> {
        let (id, created_at, updated_at, version) = self
            .db
            .timed(
                sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>, i32)>(
                    r#"INSERT INTO module_info (module_name, module_duration, exam_type)
                    VALUES ($1, $2, $3)
                    RETURNING id, created_at, updated_at, version"#,
                )
                .bind(&module.module_name)
                .bind(module.module_duration)
                .bind(&module.exam_type)
                .fetch_one(&self.db.postgres),
            )
            .await?;

        module.id = id;
        module.created_at = created_at;
        module.updated_at = updated_at;
        module.version = version;

        Ok(())
    }

    async fn get(&self, id: i64) -> Result<ModuleInfo> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }

        let query = format!("SELECT {MODULE_COLUMNS} FROM module_info WHERE id = $1");
        self.db
            .timed(
                sqlx::query_as::<_, ModuleInfoRecord>(&query)
                    .bind(id)
                    .fetch_optional(&self.db.postgres),
            )
            .await?
            .map(ModuleInfo::from)
            .ok_or(ServerError::NotFound)
    }

    async fn list(&self) -> Result<Vec<ModuleInfo>> {
        let query = format!("SELECT {MODULE_COLUMNS} FROM module_info ORDER BY id");
        let records = self
            .db
            .timed(sqlx::query_as::<_, ModuleInfoRecord>(&query).fetch_all(&self.db.postgres))
            .await?;

        Ok(records.into_iter().map(ModuleInfo::from).collect())
    }

    async fn update(&self, module: &mut ModuleInfo) -> Result<()> {
        let row = self
            .db
            .timed(
                sqlx::query_as::<_, (i32, DateTime<Utc>)>(
                    r#"UPDATE module_info
                    SET module_name = $1, module_duration = $2, exam_type = $3,
                        updated_at = NOW(), version = version + 1
                    WHERE id = $4 AND version = $5
                    RETURNING version, updated_at"#,
                )
                .bind(&module.module_name)
                .bind(module.module_duration)
                .bind(&module.exam_type)
                .bind(module.id)
                .bind(module.version)
                .fetch_optional(&self.db.postgres),
            )
            .await?;

        let Some((version, updated_at)) = row else {
            return Err(ServerError::EditConflict);
        };
        module.version = version;
        module.updated_at = updated_at;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }

        let result = self
            .db
            .timed(
                sqlx::query(r#"DELETE FROM module_info WHERE id = $1"#)
                    .bind(id)
                    .execute(&self.db.postgres),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }
}
