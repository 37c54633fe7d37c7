use crate::api::models::UserProfile;
use crate::error::AuthError;
use crate::identity::ParticipantId;
use crate::storage::MessageStore;
use chrono::Utc;
use std::fs;
use std::path::Path;

/// Who is signed in, and under which application namespace.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: ParticipantId,
    pub app_id: String,
}

impl Session {
    /// Uses `configured_id` when given; otherwise signs in anonymously with an
    /// id generated on first run and kept in `identity_file`.
    pub async fn sign_in(
        configured_id: Option<&str>,
        identity_file: &Path,
        app_id: &str,
        store: &dyn MessageStore,
    ) -> Result<Self, AuthError> {
        let user_id = match configured_id {
            Some(raw) => ParticipantId::parse(raw).ok_or_else(|| AuthError::InvalidId(raw.to_string()))?,
            None => anonymous_id(identity_file)?,
        };
        log::info!("signed in as {}", user_id);

        let profile = UserProfile {
            display_name: display_name(&user_id),
            user_id: user_id.clone(),
            last_active: Utc::now(),
        };
        store.touch_user(&profile).await?;

        Ok(Self { user_id, app_id: app_id.to_string() })
    }
}

pub fn display_name(id: &ParticipantId) -> String {
    let short: String = id.as_str().chars().take(6).collect();
    format!("User {}", short)
}

fn anonymous_id(path: &Path) -> Result<ParticipantId, AuthError> {
    let identity_err = |e: std::io::Error| AuthError::Identity {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    match fs::read_to_string(path) {
        Ok(text) => ParticipantId::parse(&text).ok_or(AuthError::InvalidId(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let fresh = uuid::Uuid::new_v4().simple().to_string();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(identity_err)?;
            }
            fs::write(path, &fresh).map_err(identity_err)?;
            log::info!("created anonymous identity in {}", path.display());
            ParticipantId::parse(&fresh).ok_or(AuthError::InvalidId(fresh))
        }
        Err(e) => Err(identity_err(e)),
    }
}
