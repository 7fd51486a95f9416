use crate::errors::StoreError;
use crate::models::{Avatar, UserRecord};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::error;

/// Logged-in user's view of their own identity and badge state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub nickname: String,
    pub avatar: Avatar,
    #[serde(default)]
    pub selected_badge: Option<String>,
    #[serde(default)]
    pub weekly_badges: Vec<u32>,
    #[serde(default)]
    pub unlocked_achievements: Vec<String>,
}

impl Session {
    pub fn from_user(user: &UserRecord) -> Self {
        Self {
            user_id: user.id.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            selected_badge: user.selected_badge.clone(),
            weekly_badges: user.weekly_badges.clone(),
            unlocked_achievements: user.unlocked_achievements.clone(),
        }
    }
}

/// Token-keyed session blobs persisted as one JSON document. Not
/// transactional and not meant to be shared between processes.
pub struct SessionStore {
    path: Option<PathBuf>,
    sessions: Mutex<BTreeMap<String, Session>>,
}

impl SessionStore {
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let sessions = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                error!("failed to parse session file: {err}");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                error!("failed to read session file: {err}");
                BTreeMap::new()
            }
        };
        Ok(Self {
            path: Some(path),
            sessions: Mutex::new(sessions),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().await.get(token).cloned()
    }

    pub async fn save(&self, token: &str, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(token.to_string(), session);
        self.persist(&sessions).await
    }

    /// Applies `update` to the session if it exists and saves it.
    pub async fn update(
        &self,
        token: &str,
        update: impl FnOnce(&mut Session),
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(token) else {
            return Ok(None);
        };
        update(session);
        let updated = session.clone();
        self.persist(&sessions).await?;
        Ok(Some(updated))
    }

    /// Applies `update` to every open session of `user_id`. Returns how many
    /// sessions changed.
    pub async fn update_user(
        &self,
        user_id: &str,
        update: impl Fn(&mut Session),
    ) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let mut touched = 0;
        for session in sessions.values_mut().filter(|s| s.user_id == user_id) {
            update(session);
            touched += 1;
        }
        if touched > 0 {
            self.persist(&sessions).await?;
        }
        Ok(touched)
    }

    pub async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(token).is_some();
        if removed {
            self.persist(&sessions).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, sessions: &BTreeMap<String, Session>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(sessions)?;
        fs::write(path, payload).await?;
        Ok(())
    }
}
