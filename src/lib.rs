//! Keypad Assistant - keypad-driven voice assistant client
//!
//! This library provides the core of a small-screen assistant client:
//! - A numbered action menu fetched from the assistant server
//! - Push-to-talk recording, transcription, and add-more dictation
//! - Replies with dynamic `[n]` follow-up options and spoken output
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        Keypad (stdin)  │  Ctrl-C  │  Timers          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events
//! ┌────────────────────▼────────────────────────────────┐
//! │   Runtime  ──▶  Session (state machine)             │
//! │   Menu  │  Reply parser  │  Transcript  │  Options  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ commands
//! ┌────────────────────▼────────────────────────────────┐
//! │  RemoteClient (HTTP) │ AudioRecorder │ OutputSink   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod keypad;
pub mod menu;
pub mod output;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod transcript;
pub mod voice;

pub use client::{Failure, FailureKind, HttpRemoteClient, Outcome, RemoteClient};
pub use config::Config;
pub use error::{Error, Result};
pub use keypad::{Digit, Key};
pub use menu::{ActionKind, MenuDescriptor, MenuItem, MenuRegistry};
pub use output::{CommandSpeaker, OutputSink, TerminalSink, View};
pub use parser::{DynamicOption, DynamicOptions, ParsedReply, parse_reply};
pub use runtime::{EventSender, Runtime};
pub use session::{Command, Event, Session, SessionState};
pub use transcript::TranscriptBuffer;
pub use voice::{AudioRecorder, CaptureHandle, MicrophoneRecorder};
