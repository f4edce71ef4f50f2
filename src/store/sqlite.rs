use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;

/// Durable token state. Every operation is its own transaction: commit on
/// success, rollback on any failure, connection always returned to the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Raw `tokens` row. `call_count` may be NULL for tokens created before
/// counting was introduced; the gate persists 0 on first sight.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub token: String,
    pub description: Option<String>,
    pub call_count: Option<i64>,
    pub call_count_limit: Option<i64>,
}

/// Token details as reported to the management surface, including the
/// per-endpoint usage breakdown.
#[derive(Debug, Serialize)]
pub struct TokenDetails {
    pub description: Option<String>,
    pub call_count: i64,
    pub call_count_limit: Option<i64>,
    pub call_count_breakdown: BTreeMap<String, i64>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Token Operations --

    /// Create or update a token. On create the count starts at 0 and
    /// `limit_is_relative` is ignored (the base is 0 anyway). On update the
    /// description is only overwritten when given, and a relative limit means
    /// "current count plus `limit`" rather than a literal ceiling.
    pub async fn upsert_token(
        &self,
        token: &str,
        description: Option<&str>,
        limit: Option<i64>,
        limit_is_relative: bool,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, TokenRow>(
            "SELECT token, description, call_count, call_count_limit FROM tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some(row) => {
                let count = row.call_count.unwrap_or(0);
                let new_limit = match limit {
                    Some(l) if limit_is_relative => Some(count + l),
                    other => other,
                };
                sqlx::query(
                    "UPDATE tokens SET description = COALESCE(?, description), \
                     call_count = ?, call_count_limit = ? WHERE token = ?",
                )
                .bind(description)
                .bind(count)
                .bind(new_limit)
                .bind(token)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO tokens (token, description, call_count, call_count_limit) \
                     VALUES (?, ?, 0, ?)",
                )
                .bind(token)
                .bind(description)
                .bind(limit)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a token and all its breakdown rows in one transaction.
    /// Returns whether the token row existed.
    pub async fn remove_token(&self, token: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM call_breakdown WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tokens WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_token_row(&self, token: &str) -> anyhow::Result<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token, description, call_count, call_count_limit FROM tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Details for the management surface, with the endpoint breakdown folded in.
    pub async fn get_token(&self, token: &str) -> anyhow::Result<Option<TokenDetails>> {
        let Some(row) = self.get_token_row(token).await? else {
            return Ok(None);
        };

        let breakdown = sqlx::query_as::<_, (String, i64)>(
            "SELECT endpoint, call_count FROM call_breakdown WHERE token = ? ORDER BY endpoint",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TokenDetails {
            description: row.description,
            call_count: row.call_count.unwrap_or(0),
            call_count_limit: row.call_count_limit,
            call_count_breakdown: breakdown.into_iter().collect(),
        }))
    }

    /// Persist count=0 for a token whose count is still NULL.
    pub async fn init_call_count(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE tokens SET call_count = 0 WHERE token = ? AND call_count IS NULL")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Add `units` to the token's count, and to the (token, endpoint)
    /// breakdown row when an endpoint is given, in one transaction. The count
    /// update is a single relational expression, not read-modify-write, so
    /// concurrent callers (and other processes) cannot lose updates.
    pub async fn increment_call_count(
        &self,
        token: &str,
        units: i64,
        endpoint: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE tokens SET call_count = COALESCE(call_count, 0) + ? WHERE token = ?")
            .bind(units)
            .bind(token)
            .execute(&mut *tx)
            .await?;

        if let Some(endpoint) = endpoint {
            sqlx::query(
                "INSERT INTO call_breakdown (token, endpoint, call_count) VALUES (?, ?, ?) \
                 ON CONFLICT(token, endpoint) \
                 DO UPDATE SET call_count = call_count + excluded.call_count",
            )
            .bind(token)
            .bind(endpoint)
            .bind(units)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_tokens(&self) -> anyhow::Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>("SELECT token FROM tokens ORDER BY token")
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    // -- Admin Token Operations --

    pub async fn upsert_admin_token(&self, token: &str, description: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO admin_tokens (token, description) VALUES (?, ?) \
             ON CONFLICT(token) DO UPDATE SET description = excluded.description",
        )
        .bind(token)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_admin_token(&self, token: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM admin_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn admin_token_exists(&self, token: &str) -> anyhow::Result<bool> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM admin_tokens WHERE token = ?")
                .bind(token)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn list_admin_tokens(&self) -> anyhow::Result<Vec<String>> {
        let tokens =
            sqlx::query_scalar::<_, String>("SELECT token FROM admin_tokens ORDER BY token")
                .fetch_all(&self.pool)
                .await?;
        Ok(tokens)
    }
}
