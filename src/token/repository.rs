use async_trait::async_trait;

use super::{Scope, Token};
use crate::database::Database;
use crate::error::Result;

/// Persistence port for [`Token`]. Only the digest is ever stored.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<()>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<()>;

    /// Delete every token of `token.scope` for `token.user_id` then insert
    /// `token`, atomically.
    async fn replace_all_for_user(&self, token: &Token) -> Result<()>;
}

/// PostgreSQL implementation of [`TokenRepository`].
#[derive(Clone, Debug)]
pub struct PgTokenRepository {
    db: Database,
}

impl PgTokenRepository {
    /// Create a new [`PgTokenRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert(&self, token: &Token) -> Result<()> {
        self.db
            .timed(
                sqlx::query(
                    r#"INSERT INTO tokens (hash, user_id, scope, expiry) VALUES ($1, $2, $3, $4)"#,
                )
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.scope.as_str())
                .bind(token.expiry)
                .execute(&self.db.postgres),
            )
            .await?;

        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<()> {
        self.db
            .timed(
                sqlx::query(r#"DELETE FROM tokens WHERE scope = $1 AND user_id = $2"#)
                    .bind(scope.as_str())
                    .bind(user_id)
                    .execute(&self.db.postgres),
            )
            .await?;

        Ok(())
    }

    async fn replace_all_for_user(&self, token: &Token) -> Result<()> {
        self.db
            .timed(async {
                let mut tx = self.db.postgres.begin().await?;

                sqlx::query(r#"DELETE FROM tokens WHERE scope = $1 AND user_id = $2"#)
                    .bind(token.scope.as_str())
                    .bind(token.user_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    r#"INSERT INTO tokens (hash, user_id, scope, expiry) VALUES ($1, $2, $3, $4)"#,
                )
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.scope.as_str())
                .bind(token.expiry)
                .execute(&mut *tx)
                .await?;

                tx.commit().await
            })
            .await
    }
}
