//! TOML configuration file loading
//!
//! Supports `~/.config/keypad-assistant/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KeypadConfigFile {
    /// Assistant server settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Session timing settings
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech output settings
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Assistant server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL, e.g. `http://192.168.1.20:8080`
    pub url: Option<String>,

    /// Content type sent with recordings
    pub audio_content_type: Option<String>,

    pub menu_connect_secs: Option<u64>,
    pub menu_read_secs: Option<u64>,
    pub dialogue_connect_secs: Option<u64>,
    pub dialogue_read_secs: Option<u64>,
    pub audio_connect_secs: Option<u64>,
    pub audio_read_secs: Option<u64>,
}

/// Session timing configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Recording ceiling in seconds
    pub max_recording_secs: Option<u64>,

    /// Pause after an action/chat failure before returning to the menu
    pub failure_pause_ms: Option<u64>,

    /// Pause after a failed add-more transcription before returning to confirm
    pub transcribe_failure_pause_ms: Option<u64>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Speak replies at startup
    pub enabled: Option<bool>,

    /// External text-to-speech program (e.g. `espeak`, `say`)
    pub command: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `KeypadConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> KeypadConfigFile {
    config_file_path().map_or_else(KeypadConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or unparsable files yield defaults.
pub fn load_config_from(path: &Path) -> KeypadConfigFile {
    if !path.exists() {
        return KeypadConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                KeypadConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KeypadConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/keypad-assistant/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("keypad-assistant").join("config.toml"))
}
