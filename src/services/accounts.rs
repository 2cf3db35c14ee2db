//! Registration, login and user lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{AuthToken, NewUser, User};
use crate::store::Store;

const TOKEN_KEY_LEN: usize = 40;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has between 1 and 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[serde(default)]
    #[validate(length(min = 8, max = 128, message = "Ensure this field has between 8 and 128 characters."))]
    pub password: String,

    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
}

impl RegisterRequest {
    fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self
            .email
            .take()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
    }
}

#[allow(clippy::ptr_arg)]
fn validate_username(username: &String) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if username.chars().all(allowed) {
        Ok(())
    } else {
        Err(ValidationError::new("username").with_message(Cow::Borrowed(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            date_joined: user.date_joined,
        }
    }
}

/// 40 lowercase hex characters of v4 randomness.
pub fn generate_token_key() -> String {
    let mut key = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    key.truncate(TOKEN_KEY_LEN);
    key
}

async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    // bcrypt is deliberately slow; keep it off the async workers
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn check_password(user: User, password: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || user.verify_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn issue_token(store: &dyn Store, user_id: i64) -> AppResult<AuthToken> {
    Ok(store.get_or_create_token(user_id, &generate_token_key()).await?)
}

pub async fn register(
    store: &dyn Store,
    config: &Config,
    mut req: RegisterRequest,
) -> AppResult<RegisterResponse> {
    req.normalize();
    req.validate()?;

    let password_hash = hash_password(req.password, config.auth.bcrypt_cost).await?;
    let user = store
        .create_user(NewUser {
            username: req.username,
            email: req.email.unwrap_or_default(),
            first_name: req.first_name.unwrap_or_default(),
            last_name: req.last_name.unwrap_or_default(),
            password_hash,
            is_staff: false,
        })
        .await
        .map_err(|e| match e {
            crate::error::StoreError::Duplicate { .. } => {
                AppError::invalid_field("username", "A user with that username already exists.")
            }
            other => other.into(),
        })?;

    let token = issue_token(store, user.id).await?;
    info!("registered user {} ({})", user.username, user.id);
    Ok(RegisterResponse { token: token.key })
}

pub async fn login(store: &dyn Store, req: LoginRequest) -> AppResult<LoginResponse> {
    // Same answer for unknown users, inactive users and wrong passwords
    let invalid = || AppError::Unauthorized("Invalid Credentials".to_string());

    let (username, password) = match (req.username, req.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => return Err(invalid()),
    };

    let user = store
        .find_user_by_username(&username)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let user_id = user.id;
    if !check_password(user, password).await? {
        return Err(invalid());
    }

    let token = issue_token(store, user_id).await?;
    info!("user {} logged in", user_id);
    Ok(LoginResponse {
        token: token.key,
        user_id,
    })
}

pub async fn user_detail(store: &dyn Store, requester: &AuthUser, user_id: i64) -> AppResult<UserProfile> {
    if requester.user_id != user_id && !requester.is_staff {
        return Err(AppError::Forbidden(
            "You are not authorized to view this user's details.".to_string(),
        ));
    }

    store
        .find_user(user_id)
        .await?
        .map(UserProfile::from)
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
}

/// Creates the configured staff account if it is missing.
pub async fn bootstrap_admin(store: &dyn Store, config: &Config) -> AppResult<()> {
    let (username, password) = match (&config.admin.username, &config.admin.password) {
        (Some(u), Some(p)) => (u.clone(), p.clone()),
        (Some(_), None) | (None, Some(_)) => {
            warn!("ADMIN_USERNAME and ADMIN_PASSWORD must both be set; skipping admin bootstrap");
            return Ok(());
        }
        (None, None) => return Ok(()),
    };

    if store.find_user_by_username(&username).await?.is_some() {
        return Ok(());
    }

    let password_hash = hash_password(password, config.auth.bcrypt_cost).await?;
    let admin = store
        .create_user(NewUser {
            username,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash,
            is_staff: true,
        })
        .await?;
    info!("created staff user {} ({})", admin.username, admin.id);
    Ok(())
}
