// src/models/user.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Account type. Dietitians may additionally submit health ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    User,
    Dietitian,
    Admin,
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub role: Role,

    pub name: Option<String>,
    pub surname: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub certification: Option<String>,

    /// Live recipes owned by this user.
    pub recipe_count: i64,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Public view of a user with follow statistics.
#[derive(Debug, Serialize, FromRow)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub recipe_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The caller's own profile, which additionally shows the e-mail address.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: ProfileResponse,
    pub email: String,
}

/// Short user reference used in follower lists.
#[derive(Debug, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub profile_picture: Option<String>,
}

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static username pattern"));

fn validate_username(username: &str) -> Result<(), validator::ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(validator::ValidationError::new("invalid_username_characters"));
    }
    Ok(())
}

fn validate_signup_role(role: &Role) -> Result<(), validator::ValidationError> {
    if *role == Role::Admin {
        return Err(validator::ValidationError::new("admin_signup_not_allowed"));
    }
    Ok(())
}

fn default_role() -> Role {
    Role::User
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(
        length(
            min = 3,
            max = 30,
            message = "Username length must be between 3 and 30 characters."
        ),
        custom(function = validate_username)
    )]
    pub username: String,

    #[validate(email(message = "A valid email address is required."))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,

    /// 'user' (default) or 'dietitian'.
    #[serde(default = "default_role")]
    #[validate(custom(function = validate_signup_role))]
    pub role: Role,

    /// Link to a certificate. Required when signing up as a dietitian.
    #[validate(length(max = 500))]
    pub certification: Option<String>,
}

/// DTO for user login. `username` also accepts the e-mail address.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

/// DTO for editing one's own profile. Absent fields stay untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 50))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub surname: Option<String>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    #[validate(length(max = 500), url)]
    pub profile_picture: Option<String>,
}

/// DTO for an admin changing someone's account type.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Step 1 of password reset.
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

/// Step 2: trade the mailed code for a reset token.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyResetCodeRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub code: String,
}

/// Step 3: set the new password.
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmResetRequest {
    #[validate(length(min = 1, max = 128))]
    pub token: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, role: Role) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: "cook@example.com".to_string(),
            password: "password123".to_string(),
            role,
            certification: None,
        }
    }

    #[test]
    fn username_rejects_punctuation() {
        assert!(register("good_name1", Role::User).validate().is_ok());
        assert!(register("bad name!", Role::User).validate().is_err());
    }

    #[test]
    fn nobody_signs_up_as_admin() {
        assert!(register("sneaky", Role::Admin).validate().is_err());
        assert!(register("dietitian1", Role::Dietitian).validate().is_ok());
    }

    #[test]
    fn role_serializes_in_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Dietitian).unwrap(), "\"dietitian\"");
    }
}
