use crate::achievements;
use crate::client::StoreClient;
use crate::errors::{AppError, StoreError};
use crate::models::{Avatar, RegisterRequest, UserRecord, UserSummary};
use crate::session::{Session, SessionStore};
use crate::storage::Collection;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use tracing::{info, warn};

pub const MIN_NICKNAME_CHARS: usize = 3;
pub const MAX_NICKNAME_CHARS: usize = 20;
pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid nickname or password")]
    InvalidCredentials,
    #[error("failed to hash password: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(_) => AppError::bad_request(err.to_string()),
            AccountError::InvalidCredentials => AppError::unauthorized(err.to_string()),
            AccountError::Hashing(_) => AppError::internal(err),
            AccountError::Store(err) => err.into(),
        }
    }
}

/// Returns the stored form of the nickname: trimmed and lowercased.
pub fn validate_registration(nickname: &str, password: &str) -> Result<String, AccountError> {
    let nickname = nickname.trim().to_lowercase();
    let length = nickname.chars().count();
    if length < MIN_NICKNAME_CHARS {
        return Err(AccountError::Validation(format!(
            "nickname must have at least {MIN_NICKNAME_CHARS} characters"
        )));
    }
    if length > MAX_NICKNAME_CHARS {
        return Err(AccountError::Validation(format!(
            "nickname must not exceed {MAX_NICKNAME_CHARS} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AccountError::Validation(format!(
            "password must have at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(nickname)
}

/// Argon2id PHC string for the password.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AccountError::Hashing(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("stored password hash is unreadable: {err}");
            false
        }
    }
}

pub async fn register(
    client: &StoreClient,
    request: RegisterRequest,
) -> Result<UserSummary, AccountError> {
    let nickname = validate_registration(&request.nickname, &request.password)?;
    let password_hash = hash_password(&request.password)?;

    let _guard = client.write().await;
    if client.user_by_nickname(&nickname).await?.is_some() {
        return Err(AccountError::Validation(
            "nickname is already taken".to_string(),
        ));
    }

    let user = client
        .insert_user(&UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            nickname,
            password_hash,
            avatar: Avatar::normalize(&request.avatar),
            created_at: Utc::now(),
            selected_badge: None,
            weekly_badges: Vec::new(),
            unlocked_achievements: Vec::new(),
            habits: Vec::new(),
            reports: Vec::new(),
        })
        .await?;
    info!("registered user {}", user.nickname);

    Ok(UserSummary {
        id: user.id,
        nickname: user.nickname,
        avatar: user.avatar,
    })
}

/// Verifies the credentials and opens a session. Returns the session token.
pub async fn login(
    client: &StoreClient,
    sessions: &SessionStore,
    nickname: &str,
    password: &str,
) -> Result<(String, Session), AccountError> {
    let Some(user) = client.user_by_nickname(nickname).await? else {
        return Err(AccountError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash) {
        return Err(AccountError::InvalidCredentials);
    }

    let token = uuid::Uuid::new_v4().to_string();
    let session = Session::from_user(&user);
    sessions.save(&token, session.clone()).await?;
    info!("user {} logged in", user.nickname);
    Ok((token, session))
}

pub async fn logout(sessions: &SessionStore, token: &str) -> Result<bool, StoreError> {
    sessions.remove(token).await
}

/// Sets or clears the badge shown next to the user's posts. Only catalogue
/// achievements the user has unlocked can be selected.
pub async fn select_badge(
    client: &StoreClient,
    sessions: &SessionStore,
    token: &str,
    user_id: &str,
    badge_id: Option<String>,
) -> Result<Session, AccountError> {
    let user = client
        .user(user_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: Collection::Users.name(),
            id: user_id.to_string(),
        })?;

    if let Some(id) = &badge_id {
        if achievements::badge(id).is_none() {
            return Err(AccountError::Validation(format!("unknown badge {id}")));
        }
        if !user.unlocked_achievements.iter().any(|unlocked| unlocked == id) {
            return Err(AccountError::Validation(format!(
                "badge {id} has not been unlocked"
            )));
        }
    }

    client
        .save_field(Collection::Users, user_id, "selected_badge", &badge_id)
        .await?;
    let refreshed = sessions
        .update(token, |session| session.selected_badge = badge_id.clone())
        .await?;
    Ok(refreshed.unwrap_or_else(|| {
        let mut session = Session::from_user(&user);
        session.selected_badge = badge_id;
        session
    }))
}
