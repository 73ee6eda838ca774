// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        ConfirmResetRequest, LoginRequest, PasswordResetRequest, RegisterRequest, Role,
        TokenResponse, User, VerifyResetCodeRequest,
    },
    utils::{
        codes::{reset_code, reset_token, unix_now},
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
        mail::Mailer,
    },
};

pub(crate) const USER_COLUMNS: &str = "id, username, email, password, role, name, surname, bio, \
     profile_picture, certification, recipe_count, created_at";

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username or e-mail taken")
    )
)]
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let certification = payload
        .certification
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    if payload.role == Role::Dietitian {
        let link = certification.ok_or_else(|| {
            AppError::BadRequest("Dietitians must provide a certification link".to_string())
        })?;
        if url::Url::parse(link).is_err() {
            return Err(AppError::BadRequest("Certification must be a URL".to_string()));
        }
    }

    let hashed_password = hash_password(&payload.password)?;
    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, email, password, role, certification, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&payload.username)
    .bind(&email)
    .bind(&hashed_password)
    .bind(payload.role)
    .bind(certification)
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username or email already registered".to_string())
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    tracing::info!(user_id = user.id, role = ?user.role, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Key the lockout counts against: the account when the identifier resolves
/// to one, so username and e-mail share a budget.
fn attempt_key(user: Option<&User>, identifier: &str) -> String {
    match user {
        Some(user) => format!("user:{}", user.id),
        None => format!("name:{}", identifier),
    }
}

/// Failed logins for `account` inside the lockout window.
async fn recent_failures(pool: &SqlitePool, account: &str, config: &Config) -> Result<i64, AppError> {
    let since = unix_now() - config.login_lockout_seconds;
    let failures = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_attempts WHERE account = $1 AND succeeded = 0 AND attempted_at > $2",
    )
    .bind(account)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(failures)
}

async fn record_attempt(
    pool: &SqlitePool,
    account: &str,
    succeeded: bool,
    config: &Config,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    // Rows outside the window no longer count for anyone.
    sqlx::query("DELETE FROM login_attempts WHERE attempted_at <= $1")
        .bind(unix_now() - config.login_lockout_seconds)
        .execute(&mut *tx)
        .await?;

    if succeeded {
        sqlx::query("DELETE FROM login_attempts WHERE account = $1")
            .bind(account)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("INSERT INTO login_attempts (account, succeeded, attempted_at) VALUES ($1, $2, $3)")
        .bind(account)
        .bind(succeeded)
        .bind(unix_now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Authenticates a user and returns a JWT token.
///
/// Accepts a username or e-mail. After too many failures inside the lockout
/// window the account answers 429 until the window has passed.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed token", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let identifier = payload.username.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(username) = $1 OR email = $1"
    ))
    .bind(&identifier)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let account = attempt_key(user.as_ref(), &identifier);

    if recent_failures(&pool, &account, &config).await? >= config.login_max_attempts {
        tracing::warn!(%account, "Login refused, too many failed attempts");
        return Err(AppError::TooManyRequests(
            "Too many failed login attempts. Try again later.".to_string(),
        ));
    }

    let user = match user {
        Some(user) if verify_password(&payload.password, &user.password)? => user,
        _ => {
            record_attempt(&pool, &account, false, &config).await?;
            return Err(AppError::AuthError("Invalid username or password".to_string()));
        }
    };

    record_attempt(&pool, &account, true, &config).await?;

    let token = sign_jwt(
        user.id,
        &user.username,
        user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(TokenResponse {
        token,
        token_type: "Bearer".to_string(),
        user_id: user.id,
        username: user.username,
        role: user.role,
    }))
}

/// Starts a password reset by mailing a six-digit code.
///
/// Answers the same way whether or not the address is registered.
pub async fn request_password_reset(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    State(mailer): State<Arc<dyn Mailer>>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

    if let Some(user_id) = user_id {
        let code = reset_code();
        let mut tx = pool.begin().await?;

        // A fresh code invalidates the previous ones.
        sqlx::query("UPDATE password_reset_codes SET used = 1 WHERE user_id = $1 AND used = 0")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO password_reset_codes (user_id, code, expires_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(&code)
            .bind(unix_now() + config.reset_code_ttl_seconds)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let minutes = config.reset_code_ttl_seconds / 60;
        let sent = mailer
            .send(
                &email,
                "Fithub password reset code",
                &format!(
                    "Your Fithub password reset code is {code}.\n\n\
                     It expires in {minutes} minutes. If you did not ask for it, ignore this mail."
                ),
            )
            .await;

        // The answer must not reveal whether the address is registered.
        match sent {
            Ok(()) => tracing::info!(user_id, "Password reset code issued"),
            Err(e) => tracing::error!(user_id, "Failed to send password reset code: {:?}", e),
        }
    }

    Ok(Json(json!({
        "message": "If the address is registered, a reset code has been sent."
    })))
}

/// Trades a valid reset code for a single-use reset token.
pub async fn verify_reset_code(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<VerifyResetCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();
    let now = unix_now();

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT c.id, c.user_id
        FROM password_reset_codes c
        JOIN users u ON u.id = c.user_id
        WHERE u.email = $1 AND c.code = $2 AND c.used = 0 AND c.expires_at > $3
        ORDER BY c.id DESC
        LIMIT 1
        "#,
    )
    .bind(&email)
    .bind(&payload.code)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((code_id, user_id)) = row else {
        // Wrong guesses count against the live code; too many burn it.
        sqlx::query(
            r#"
            UPDATE password_reset_codes
            SET attempts = attempts + 1,
                used = CASE WHEN attempts + 1 >= $3 THEN 1 ELSE used END
            WHERE used = 0 AND expires_at > $2
              AND user_id = (SELECT id FROM users WHERE email = $1)
            "#,
        )
        .bind(&email)
        .bind(now)
        .bind(config.login_max_attempts)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        return Err(AppError::BadRequest("Invalid or expired reset code".to_string()));
    };

    sqlx::query("UPDATE password_reset_codes SET used = 1 WHERE id = $1")
        .bind(code_id)
        .execute(&mut *tx)
        .await?;

    let token = reset_token();
    sqlx::query("INSERT INTO password_reset_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&token)
        .bind(now + config.reset_token_ttl_seconds)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "reset_token": token,
        "expires_in": config.reset_token_ttl_seconds
    })))
}

/// Sets a new password using a reset token. The token is consumed.
pub async fn confirm_password_reset(
    State(pool): State<SqlitePool>,
    Json(payload): Json<ConfirmResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let hashed_password = hash_password(&payload.new_password)?;

    let mut tx = pool.begin().await?;

    // Consuming the token first takes the write lock for the whole exchange.
    let user_id = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE password_reset_tokens SET used = 1
        WHERE token = $1 AND used = 0 AND expires_at > $2
        RETURNING user_id
        "#,
    )
    .bind(&payload.token)
    .bind(unix_now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(&hashed_password)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    // Lift any lockout left over from the forgotten password.
    sqlx::query("DELETE FROM login_attempts WHERE account = $1")
        .bind(format!("user:{}", user_id))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id, "Password reset completed");

    Ok(Json(json!({ "message": "Password has been reset." })))
}
