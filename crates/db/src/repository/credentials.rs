//! Credential repository — name/value secrets scoped per user.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::CredentialRow, DbError};

/// Look up a credential's value by user-friendly name, scoped to a user.
/// Returns `Ok(None)` when no such credential exists.
pub async fn get_credential_value(
    pool: &PgPool,
    name: &str,
    user_id: &str,
) -> Result<Option<String>, DbError> {
    let value: Option<(String,)> =
        sqlx::query_as(r#"SELECT value FROM credentials WHERE name = $1 AND user_id = $2"#)
            .bind(name)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(value.map(|(v,)| v))
}

/// Insert or replace a credential for a user.
pub async fn upsert_credential(
    pool: &PgPool,
    user_id: &str,
    name: &str,
    value: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        INSERT INTO credentials (id, user_id, name, value, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, name)
        DO UPDATE SET value = EXCLUDED.value
        RETURNING id, user_id, name, value, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(name)
    .bind(value)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// List a user's credentials (values included; callers decide redaction).
pub async fn list_credentials(pool: &PgPool, user_id: &str) -> Result<Vec<CredentialRow>, DbError> {
    let rows = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, user_id, name, value, created_at
        FROM credentials WHERE user_id = $1 ORDER BY name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete a credential by name. `DbError::NotFound` if nothing matched.
pub async fn delete_credential(pool: &PgPool, user_id: &str, name: &str) -> Result<(), DbError> {
    let result = sqlx::query(r#"DELETE FROM credentials WHERE user_id = $1 AND name = $2"#)
        .bind(user_id)
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
