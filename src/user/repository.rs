//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Credential, User};
use crate::database::{Database, is_unique_violation};
use crate::error::{Result, ServerError};
use crate::token::{Scope, Token};

/// Unique index on `users.email`.
pub const EMAIL_CONSTRAINT: &str = "users_email_key";

const USER_COLUMNS: &str = "u.id, u.created_at, u.updated_at, u.fname, u.sname, u.email, \
    u.password_hash, u.role, u.activated, u.version";

const INSERT_USER: &str = r#"INSERT INTO users (fname, sname, email, password_hash, role, activated)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id, created_at, updated_at, version"#;

/// Persistence port for [`User`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fills `id`, `created_at` and `version`.
    async fn insert(&self, user: &mut User) -> Result<()>;

    /// Insert a new user and its first token in one transaction. Either both
    /// rows exist afterwards or neither does. Sets `token.user_id`.
    async fn insert_with_token(&self, user: &mut User, token: &mut Token) -> Result<()>;

    /// Find a user by its identifier.
    async fn get(&self, id: i64) -> Result<User>;

    /// Find a user by its email address.
    async fn get_by_email(&self, email: &str) -> Result<User>;

    /// Every user, ordered by identifier.
    async fn list(&self) -> Result<Vec<User>>;

    /// Persist a modified user if nobody changed it since it was read.
    /// Bumps `version` on success.
    async fn update(&self, user: &mut User) -> Result<()>;

    /// Remove a user and, through cascade, its tokens.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Resolve the owner of a token hash still valid at `now`.
    async fn get_for_token(&self, scope: Scope, hash: &str, now: DateTime<Utc>) -> Result<User>;

    /// Not-activated users whose newest activation token expired before
    /// `cutoff`.
    async fn find_unactivated_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>>;
}

/// Row of `users` table.
#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fname: String,
    pub sname: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub activated: bool,
    pub version: i32,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            fname: record.fname,
            sname: record.sname,
            email: record.email,
            role: record.role,
            password: Credential::Hashed(record.password_hash),
            activated: record.activated,
            version: record.version,
        }
    }
}

/// PostgreSQL implementation of [`UserRepository`].
#[derive(Clone, Debug)]
pub struct PgUserRepository {
    db: Database,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// `id, created_at, updated_at, version` returned by an insert.
type InsertedRow = (i64, DateTime<Utc>, DateTime<Utc>, i32);

fn assign(user: &mut User, (id, created_at, updated_at, version): InsertedRow) {
    user.id = id;
    user.created_at = created_at;
    user.updated_at = updated_at;
    user.version = version;
}

fn duplicate_email(err: ServerError) -> ServerError {
    if is_unique_violation(&err, EMAIL_CONSTRAINT) {
        ServerError::DuplicateEmail
    } else {
        err
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &mut User) -> Result<()> {
        let row = self
            .db
            .timed(
                sqlx::query_as::<_, InsertedRow>(INSERT_USER)
                    .bind(&user.fname)
                    .bind(&user.sname)
                    .bind(&user.email)
                    .bind(user.password.persisted_hash())
                    .bind(&user.role)
                    .bind(user.activated)
                    .fetch_one(&self.db.postgres),
            )
            .await
            .map_err(duplicate_email)?;

        assign(user, row);
        Ok(())
    }

    async fn insert_with_token(&self, user: &mut User, token: &mut Token) -> Result<()> {
        let row = self
            .db
            .timed(async {
                let mut tx = self.db.postgres.begin().await?;

                let row = sqlx::query_as::<_, InsertedRow>(INSERT_USER)
                    .bind(&user.fname)
                    .bind(&user.sname)
                    .bind(&user.email)
                    .bind(user.password.persisted_hash())
                    .bind(&user.role)
                    .bind(user.activated)
                    .fetch_one(&mut *tx)
                    .await?;

                sqlx::query(
                    r#"INSERT INTO tokens (hash, user_id, scope, expiry) VALUES ($1, $2, $3, $4)"#,
                )
                .bind(&token.hash)
                .bind(row.0)
                .bind(token.scope.as_str())
                .bind(token.expiry)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<_, sqlx::Error>(row)
            })
            .await
            .map_err(duplicate_email)?;

        token.user_id = row.0;
        assign(user, row);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<User> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }

        let query = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        self.db
            .timed(
                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(id)
                    .fetch_optional(&self.db.postgres),
            )
            .await?
            .map(User::from)
            .ok_or(ServerError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        self.db
            .timed(
                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(email)
                    .fetch_optional(&self.db.postgres),
            )
            .await?
            .map(User::from)
            .ok_or(ServerError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.id");
        let records = self
            .db
            .timed(sqlx::query_as::<_, UserRecord>(&query).fetch_all(&self.db.postgres))
            .await?;

        Ok(records.into_iter().map(User::from).collect())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        let row = self
            .db
            .timed(
                sqlx::query_as::<_, (i32, DateTime<Utc>)>(
                    r#"UPDATE users
                    SET fname = $1, sname = $2, email = $3, password_hash = $4, role = $5,
                        activated = $6, updated_at = NOW(), version = version + 1
                    WHERE id = $7 AND version = $8
                    RETURNING version, updated_at"#,
                )
                .bind(&user.fname)
                .bind(&user.sname)
                .bind(&user.email)
                .bind(user.password.persisted_hash())
                .bind(&user.role)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.db.postgres),
            )
            .await
            .map_err(duplicate_email)?;

        let Some((version, updated_at)) = row else {
            return Err(ServerError::EditConflict);
        };
        user.version = version;
        user.updated_at = updated_at;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }

        let result = self
            .db
            .timed(
                sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
                    .bind(id)
                    .execute(&self.db.postgres),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, hash: &str, now: DateTime<Utc>) -> Result<User> {
        let query = format!(
            r#"SELECT {USER_COLUMNS}
            FROM users u
            INNER JOIN tokens t ON u.id = t.user_id
            WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3"#
        );
        self.db
            .timed(
                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(hash)
                    .bind(scope.as_str())
                    .bind(now)
                    .fetch_optional(&self.db.postgres),
            )
            .await?
            .map(User::from)
            .ok_or(ServerError::NotFound)
    }

    async fn find_unactivated_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
        let query = format!(
            r#"SELECT {USER_COLUMNS}
            FROM users u
            INNER JOIN tokens t ON t.user_id = u.id AND t.scope = $1
            WHERE u.activated = false
            GROUP BY u.id
            HAVING MAX(t.expiry) < $2
            ORDER BY u.id"#
        );
        let records = self
            .db
            .timed(
                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(Scope::Activation.as_str())
                    .bind(cutoff)
                    .fetch_all(&self.db.postgres),
            )
            .await?;

        Ok(records.into_iter().map(User::from).collect())
    }
}
