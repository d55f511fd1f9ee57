//! Configuration management for the keypad assistant
//!
//! Layered: built-in defaults, then the TOML file, then environment
//! variables. Command-line flags are applied last by the binary.

pub mod file;

use std::time::Duration;

use crate::{Error, Result};

pub use file::{KeypadConfigFile, config_file_path, load_config_file, load_config_from};

/// Default assistant server
const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Recordings produced by the bundled microphone recorder
const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/wav";

/// Hard ceiling on a single recording
const DEFAULT_MAX_RECORDING: Duration = Duration::from_secs(30);

/// Time an action/chat error stays on screen before the menu returns
const DEFAULT_FAILURE_PAUSE: Duration = Duration::from_secs(3);

/// Time an add-more transcription error stays on screen
const DEFAULT_TRANSCRIBE_FAILURE_PAUSE: Duration = Duration::from_secs(2);

/// Keypad assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Assistant server connection
    pub server: ServerConfig,

    /// Session timing
    pub session: SessionConfig,

    /// Speech output
    pub speech: SpeechConfig,
}

/// Connect and read deadlines for one call class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeouts {
    #[must_use]
    pub const fn new(connect_secs: u64, read_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            read: Duration::from_secs(read_secs),
        }
    }
}

/// Assistant server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL the four endpoints hang off
    pub base_url: String,

    /// `GET /menu`
    pub menu_timeouts: Timeouts,

    /// `POST /action` and `POST /chat`
    pub dialogue_timeouts: Timeouts,

    /// `POST /audio`
    pub audio_timeouts: Timeouts,

    /// Content type header sent with recordings
    pub audio_content_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            menu_timeouts: Timeouts::new(5, 5),
            dialogue_timeouts: Timeouts::new(5, 120),
            audio_timeouts: Timeouts::new(10, 60),
            audio_content_type: DEFAULT_AUDIO_CONTENT_TYPE.to_string(),
        }
    }
}

/// Session timing configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Recording ceiling; reaching it stops and transcribes
    pub max_recording: Duration,

    /// Pause before returning to the menu after an action/chat failure
    pub failure_pause: Duration,

    /// Pause before returning to confirm after a failed add-more transcription
    pub transcribe_failure_pause: Duration,

    /// Initial state of the speech toggle
    pub tts_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_recording: DEFAULT_MAX_RECORDING,
            failure_pause: DEFAULT_FAILURE_PAUSE,
            transcribe_failure_pause: DEFAULT_TRANSCRIBE_FAILURE_PAUSE,
            tts_enabled: true,
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Default)]
pub struct SpeechConfig {
    /// External text-to-speech program; `None` picks a platform default
    pub command: Option<String>,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(load_config_file());
        config.apply_env_with(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in a config file
    pub fn apply_file(&mut self, file: KeypadConfigFile) {
        let server = file.server;
        if let Some(url) = server.url {
            self.server.base_url = url;
        }
        if let Some(content_type) = server.audio_content_type {
            self.server.audio_content_type = content_type;
        }
        overlay_timeouts(
            &mut self.server.menu_timeouts,
            server.menu_connect_secs,
            server.menu_read_secs,
        );
        overlay_timeouts(
            &mut self.server.dialogue_timeouts,
            server.dialogue_connect_secs,
            server.dialogue_read_secs,
        );
        overlay_timeouts(
            &mut self.server.audio_timeouts,
            server.audio_connect_secs,
            server.audio_read_secs,
        );

        let session = file.session;
        if let Some(secs) = session.max_recording_secs {
            self.session.max_recording = Duration::from_secs(secs);
        }
        if let Some(ms) = session.failure_pause_ms {
            self.session.failure_pause = Duration::from_millis(ms);
        }
        if let Some(ms) = session.transcribe_failure_pause_ms {
            self.session.transcribe_failure_pause = Duration::from_millis(ms);
        }

        if let Some(enabled) = file.speech.enabled {
            self.session.tts_enabled = enabled;
        }
        if file.speech.command.is_some() {
            self.speech.command = file.speech.command;
        }
    }

    /// Overlay `KEYPAD_*` environment variables read through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("KEYPAD_SERVER_URL") {
            self.server.base_url = url;
        }
        if let Some(content_type) = lookup("KEYPAD_AUDIO_CONTENT_TYPE") {
            self.server.audio_content_type = content_type;
        }
        if let Some(secs) = lookup("KEYPAD_MAX_RECORDING_SECS").and_then(|s| s.parse().ok()) {
            self.session.max_recording = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("KEYPAD_TTS") {
            self.session.tts_enabled = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(command) = lookup("KEYPAD_SPEECH_COMMAND") {
            self.speech.command = Some(command);
        }
    }

    /// Check invariants the rest of the client relies on
    ///
    /// # Errors
    ///
    /// Returns error if the server URL is empty or the recording ceiling is zero
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(Error::Config("server URL must not be empty".to_string()));
        }
        if self.session.max_recording.is_zero() {
            return Err(Error::Config(
                "max recording duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn overlay_timeouts(timeouts: &mut Timeouts, connect: Option<u64>, read: Option<u64>) {
    if let Some(secs) = connect {
        timeouts.connect = Duration::from_secs(secs);
    }
    if let Some(secs) = read {
        timeouts.read = Duration::from_secs(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.menu_timeouts, Timeouts::new(5, 5));
        assert_eq!(config.server.dialogue_timeouts, Timeouts::new(5, 120));
        assert_eq!(config.server.audio_timeouts, Timeouts::new(10, 60));
        assert_eq!(config.session.max_recording, Duration::from_secs(30));
        assert!(config.session.tts_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_then_env_overlay() {
        let file: KeypadConfigFile = toml::from_str(
            "[server]\nurl = \"http://file:1\"\ndialogue_read_secs = 30\n\n[session]\nmax_recording_secs = 10\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file);
        assert_eq!(config.server.base_url, "http://file:1");
        assert_eq!(config.server.dialogue_timeouts, Timeouts::new(5, 30));
        assert_eq!(config.session.max_recording, Duration::from_secs(10));

        config.apply_env_with(|name| match name {
            "KEYPAD_SERVER_URL" => Some("http://env:2".to_string()),
            "KEYPAD_TTS" => Some("false".to_string()),
            _ => None,
        });
        assert_eq!(config.server.base_url, "http://env:2");
        assert!(!config.session.tts_enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.base_url = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.max_recording = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
