use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::RequestError;

/// Base endpoint baked in at build time; `MESSENGER_API_BASE` at compile
/// time replaces the local development default.
pub const DEFAULT_API_BASE: &str = match option_env!("MESSENGER_API_BASE") {
    Some(value) => value,
    None => "http://127.0.0.1:8000",
};

pub const DEFAULT_CONVERSATION_POLL: Duration = Duration::from_millis(2500);
pub const DEFAULT_MESSAGE_POLL: Duration = Duration::from_millis(1200);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const SETTINGS_FILE_NAME: &str = "messenger.toml";
pub const SESSION_FILE_NAME: &str = "session.json";
const APP_DIR_NAME: &str = "friendly_messenger";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base: String,
    pub conversation_poll_interval: Duration,
    pub message_poll_interval: Duration,
    pub request_timeout: Duration,
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            conversation_poll_interval: DEFAULT_CONVERSATION_POLL,
            message_poll_interval: DEFAULT_MESSAGE_POLL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            data_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base: Option<String>,
    conversation_poll_ms: Option<u64>,
    message_poll_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    data_dir: Option<PathBuf>,
}

impl ClientSettings {
    /// Directory holding the persisted session; falls back to the platform
    /// local data dir, then the working directory.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|base| base.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR_NAME}")))
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir().join(SESSION_FILE_NAME)
    }
}

/// Defaults, then `messenger.toml` in the working directory, then the
/// process environment.
pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    merge_settings_file(&mut settings, Path::new(SETTINGS_FILE_NAME));
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

pub fn merge_settings_file(settings: &mut ClientSettings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    let file_cfg = match toml::from_str::<FileSettings>(&raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable settings file: {err}");
            return;
        }
    };

    if let Some(v) = file_cfg.api_base {
        settings.api_base = v;
    }
    if let Some(v) = file_cfg.conversation_poll_ms {
        settings.conversation_poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.message_poll_ms {
        settings.message_poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.data_dir {
        settings.data_dir = Some(v);
    }
}

pub fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("MESSENGER_API_BASE") {
        settings.api_base = v;
    }
    if let Some(v) = non_empty("APP__API_BASE") {
        settings.api_base = v;
    }

    let millis = |name: &str| non_empty(name).and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(v) = millis("APP__CONVERSATION_POLL_MS") {
        settings.conversation_poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = millis("APP__MESSAGE_POLL_MS") {
        settings.message_poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = millis("APP__REQUEST_TIMEOUT_MS") {
        settings.request_timeout = Duration::from_millis(v);
    }

    if let Some(v) = non_empty("APP__DATA_DIR") {
        settings.data_dir = Some(PathBuf::from(v));
    }
}

/// Validates an API base and returns it without a trailing slash, ready for
/// `format!("{base}{path}")`.
pub fn normalize_api_base(raw: &str) -> Result<String, RequestError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| RequestError::InvalidBaseUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RequestError::InvalidBaseUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_poll_cadence() {
        let settings = ClientSettings::default();
        assert_eq!(settings.conversation_poll_interval, Duration::from_millis(2500));
        assert_eq!(settings.message_poll_interval, Duration::from_millis(1200));
    }

    #[test]
    fn file_values_are_merged_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            "api_base = \"http://chat.local:9000\"\nmessage_poll_ms = 500\n",
        )
        .expect("write settings");

        let mut settings = ClientSettings::default();
        merge_settings_file(&mut settings, &path);

        assert_eq!(settings.api_base, "http://chat.local:9000");
        assert_eq!(settings.message_poll_interval, Duration::from_millis(500));
        assert_eq!(settings.conversation_poll_interval, DEFAULT_CONVERSATION_POLL);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "api_base = [").expect("write settings");

        let mut settings = ClientSettings::default();
        merge_settings_file(&mut settings, &path);
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn app_prefixed_env_wins_and_blank_values_are_skipped() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MESSENGER_API_BASE", "http://first:8000"),
            ("APP__API_BASE", "http://second:8000"),
            ("APP__MESSAGE_POLL_MS", "not-a-number"),
            ("APP__DATA_DIR", "  "),
        ]);
        let mut settings = ClientSettings::default();
        apply_env_overrides(&mut settings, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.api_base, "http://second:8000");
        assert_eq!(settings.message_poll_interval, DEFAULT_MESSAGE_POLL);
        assert_eq!(settings.data_dir, None);
    }

    #[test]
    fn normalizes_and_validates_api_base() {
        assert_eq!(
            normalize_api_base(" http://192.168.1.62:8000/ ").expect("valid"),
            "http://192.168.1.62:8000"
        );
        assert!(matches!(
            normalize_api_base("ftp://example.com"),
            Err(RequestError::InvalidBaseUrl { .. })
        ));
        assert!(normalize_api_base("not a url").is_err());
    }

    #[test]
    fn session_file_lives_under_data_dir() {
        let settings = ClientSettings {
            data_dir: Some(PathBuf::from("/tmp/messenger-test")),
            ..ClientSettings::default()
        };
        assert_eq!(
            settings.session_path(),
            PathBuf::from("/tmp/messenger-test").join(SESSION_FILE_NAME)
        );
    }
}
