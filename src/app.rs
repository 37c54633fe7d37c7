use crate::api::client::GeminiClient;
use crate::audio::CommandSink;
use crate::controller::ConversationController;
use crate::error::{ConfigError, StartupError};
use crate::rewrite::DraftRewriter;
use crate::session::Session;
use crate::speech::SpeechSynthesizer;
use crate::storage::SqliteStore;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const API_KEY_ENV: &str = "GEMINI_API_KEY";
const CONFIG_PATH_ENV: &str = "MESSENGER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_id: String,
    pub api_key: String,
    pub api_base_url: String,
    pub text_model: String,
    pub speech_model: String,
    pub voice: String,
    pub request_timeout_secs: u64,
    /// How often the store file is checked for messages written by the
    /// other participant's client.
    pub poll_interval_ms: u64,
    /// Fixed participant id; when unset an anonymous id is generated once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Player command; the WAV file path is appended as the last argument.
    pub player: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: "messenger-app-v1".into(),
            api_key: String::new(),
            api_base_url: "https://generativelanguage.googleapis.com".into(),
            text_model: "gemini-2.5-flash-preview-09-2025".into(),
            speech_model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Puck".into(),
            request_timeout_secs: 60,
            poll_interval_ms: 250,
            user_id: None,
            store_path: None,
            player: vec!["aplay".into(), "-q".into()],
        }
    }
}

impl Config {
    // TOML is the primary format. A legacy JSON file is read when no TOML exists
    // and converted to TOML on the spot.
    fn toml_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(p));
        }
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("duo-chat.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        Some(project_dirs()?.config_dir().join("config.json"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let toml_path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        let mut config = Self::load_from(&toml_path, Self::legacy_json_path().as_deref())?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.api_key = key;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(toml_path: &Path, legacy_json: Option<&Path>) -> Result<Self, ConfigError> {
        if toml_path.exists() {
            let text = fs::read_to_string(toml_path).map_err(|e| ConfigError::Read {
                path: toml_path.display().to_string(),
                reason: e.to_string(),
            })?;
            return toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: toml_path.display().to_string(),
                reason: e.to_string(),
            });
        }

        if let Some(legacy) = legacy_json.filter(|p| p.exists()) {
            let bytes = fs::read(legacy).map_err(|e| ConfigError::Read {
                path: legacy.display().to_string(),
                reason: e.to_string(),
            })?;
            let config: Self = serde_json::from_slice(&bytes).map_err(|e| ConfigError::Parse {
                path: legacy.display().to_string(),
                reason: e.to_string(),
            })?;
            if let Err(e) = config.save(toml_path) {
                log::warn!("could not migrate {} to TOML: {}", legacy.display(), e);
            }
            return Ok(config);
        }

        log::info!("no config at {}, using defaults", toml_path.display());
        Ok(Self::default())
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        fs::write(path, toml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if key.contains("YOUR_") {
            return Err(ConfigError::Invalid { field: "api_key", value: "placeholder value".into() });
        }
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Missing("app_id"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid { field: "request_timeout_secs", value: "0".into() });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid { field: "poll_interval_ms", value: "0".into() });
        }
        if self.player.is_empty() {
            return Err(ConfigError::Missing("player"));
        }
        Ok(())
    }

    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()?.join("messages.sqlite")),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "example", "DuoChat")
}

fn data_dir() -> Result<PathBuf, ConfigError> {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .ok_or(ConfigError::NoConfigDir)
}

/// Wires the store, session and remote clients into a controller.
pub async fn build(config: &Config) -> Result<ConversationController, StartupError> {
    let store = Arc::new(SqliteStore::open(&config.store_path()?, &config.app_id)?);
    let _watcher = store.spawn_watcher(Duration::from_millis(config.poll_interval_ms));
    let identity_file = data_dir()?.join("identity");
    let session = Session::sign_in(config.user_id.as_deref(), &identity_file, &config.app_id, &*store).await?;

    let backend = Arc::new(GeminiClient::new(
        &config.api_base_url,
        &config.api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let rewriter = DraftRewriter::new(backend.clone(), config.text_model.clone());
    let synthesizer = SpeechSynthesizer::new(backend, config.speech_model.clone(), config.voice.clone());

    let (program, args) = config.player.split_first().ok_or(ConfigError::Missing("player"))?;
    let sink = Arc::new(CommandSink::new(program.clone(), args.to_vec()));

    Ok(ConversationController::new(session, store, rewriter, synthesizer, sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key(key: &str) -> Config {
        Config { api_key: key.into(), ..Config::default() }
    }

    #[test]
    fn validation() {
        assert!(matches!(Config::default().validate(), Err(ConfigError::Missing("api_key"))));
        assert!(matches!(with_key("YOUR_KEY").validate(), Err(ConfigError::Invalid { field: "api_key", .. })));
        assert!(with_key("abc").validate().is_ok());

        let mut c = with_key("abc");
        c.request_timeout_secs = 0;
        assert!(c.validate().is_err());
        let mut c = with_key("abc");
        c.poll_interval_ms = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { field: "poll_interval_ms", .. })));
        let mut c = with_key("abc");
        c.player.clear();
        assert!(matches!(c.validate(), Err(ConfigError::Missing("player"))));
    }

    #[test]
    fn toml_round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("duo-chat.toml");
        let mut c = with_key("abc");
        c.user_id = Some("alice".into());
        c.save(&path).unwrap();
        assert_eq!(Config::load_from(&path, None).unwrap(), c);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duo-chat.toml");
        fs::write(&path, "api_key = \"k\"\nvoice = \"Kore\"\n").unwrap();
        let c = Config::load_from(&path, None).unwrap();
        assert_eq!(c.voice, "Kore");
        assert_eq!(c.app_id, Config::default().app_id);
    }

    #[test]
    fn legacy_json_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("duo-chat.toml");
        let json_path = dir.path().join("config.json");
        fs::write(&json_path, r#"{"api_key":"from-json","app_id":"legacy"}"#).unwrap();

        let c = Config::load_from(&toml_path, Some(&json_path)).unwrap();
        assert_eq!(c.api_key, "from-json");
        assert!(toml_path.exists());
        assert_eq!(Config::load_from(&toml_path, None).unwrap().app_id, "legacy");
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duo-chat.toml");
        fs::write(&path, "api_key = [").unwrap();
        assert!(matches!(Config::load_from(&path, None), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = Config::load_from(&dir.path().join("absent.toml"), None).unwrap();
        assert_eq!(c, Config::default());
    }
}
