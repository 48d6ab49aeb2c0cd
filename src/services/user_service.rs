use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::users::{UpdateUserRequest, UserList},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::auth_service::hash_password,
};

pub async fn get_me(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let me = fetch_user(pool, user.user_id).await?;
    Ok(ApiResponse::success("OK", me, None))
}

pub async fn update_me(
    pool: &DbPool,
    user: &AuthUser,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = fetch_user(pool, user.user_id).await?;

    if let Some(email) = payload.email.as_ref().filter(|e| **e != existing.email) {
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = $1 AND id <> $2")
                .bind(email.as_str())
                .bind(user.user_id)
                .fetch_optional(pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest("Email already registered".into()));
        }
    }

    if let Some(username) = payload
        .username
        .as_ref()
        .filter(|u| **u != existing.username)
    {
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1 AND id <> $2")
                .bind(username.as_str())
                .bind(user.user_id)
                .fetch_optional(pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest("Username already taken".into()));
        }
    }

    // Only supplied fields change; the rest keep their stored values.
    let email = payload.email.unwrap_or(existing.email);
    let username = payload.username.unwrap_or(existing.username);
    let full_name = payload.full_name.or(existing.full_name);
    let phone = payload.phone.or(existing.phone);
    let address = payload.address.or(existing.address);
    let password_hash = match payload.password {
        Some(password) => hash_password(&password)?,
        None => existing.password_hash,
    };

    let updated: User = sqlx::query_as(
        r#"
        UPDATE users
        SET email = $2, username = $3, full_name = $4, phone = $5, address = $6, password_hash = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.user_id)
    .bind(email)
    .bind(username)
    .bind(full_name)
    .bind(phone)
    .bind(address)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_update",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.user_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Updated", updated, None))
}

pub async fn list_users(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let items = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(pool: &DbPool, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let found = fetch_user(pool, id).await?;
    Ok(ApiResponse::success("User", found, None))
}

pub async fn delete_user(pool: &DbPool, user: &AuthUser, id: Uuid) -> AppResult<()> {
    ensure_admin(user)?;
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(())
}

async fn fetch_user(pool: &DbPool, id: Uuid) -> AppResult<User> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    user.ok_or(AppError::NotFound)
}
