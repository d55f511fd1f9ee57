//! Session state machine
//!
//! [`Session`] owns every piece of mutable client state. It consumes
//! [`Event`]s (key presses and completions of background work) and answers
//! with [`Command`]s for the runtime to carry out. It never performs I/O
//! itself, so every transition is sequential and can be tested in isolation.
//!
//! ```text
//!  Menu ──instant──────────────────────────────┐
//!   │                                          ▼
//!   └─voice─▶ VoicePrompt ─1─▶ Recording ─1─▶ Sending ─reply─▶ Response
//!                 ▲                            ▲  │              │
//!                 │        Confirm ◀─transcript┘  │              │
//!                 │         │  ▲                  │              │
//!                 │         2  └── RecordingAppend│              │
//!                 │         └──────▶──────────────┘              │
//!                 └──────────────────────5───────────────────────┘
//! ```

use std::time::Duration;

use crate::client::{Failure, Outcome};
use crate::config::SessionConfig;
use crate::keypad::{Digit, Key};
use crate::menu::{ActionKind, MenuDescriptor, MenuRegistry};
use crate::output::View;
use crate::parser::{DynamicOptions, parse_reply};
use crate::transcript::TranscriptBuffer;

const MENU_HINT: &str = "Press 1-9";
const MENU_RETRY_HINT: &str = "Press 1-9  #=Retry";
const SPEAK_HINT: &str = "Press 1 to speak";
const CONFIRM_HINT: &str = "1=Send  2=Add  3=Redo  0=Cancel";
const DEVICE_ERROR: &str = "Mic Error!";

/// Characters of an option shown while its follow-up is in flight
const FOLLOW_UP_LABEL_CHARS: usize = 20;

/// Where the session is in the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Numbered action catalog
    Menu,
    /// Waiting for the user to start speaking
    VoicePrompt,
    /// Fresh recording in progress
    Recording,
    /// Recording that will extend the current transcript
    RecordingAppend,
    /// Transcript ready to send, extend, or redo
    Confirm,
    /// A network call is outstanding, or an error is on screen
    Sending,
    /// Reply with its follow-up options
    Response,
}

/// Whether a recording replaces or extends the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    Fresh,
    Append,
}

/// Generation number of a recording
///
/// Timers and device callbacks carry the id of the recording they belong to,
/// so a late event for an earlier recording cannot stop a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(u64);

/// Action selected and waiting for its network call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingAction {
    /// Menu item the call belongs to, if any
    pub action_key: Option<Digit>,
    /// Continuing a reply rather than starting from the menu
    pub is_follow_up: bool,
}

/// A reply-producing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `POST /action`
    Execute {
        key: Digit,
        voice_input: Option<String>,
    },
    /// `POST /chat`
    Chat { text: String },
}

/// Operation that ended in a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Action or chat call; can be sent again as-is
    Request(Request),
    /// Upload of a recording; the audio is gone afterwards
    Transcription(RecordingMode),
    /// Starting the recording device
    Recording(RecordingMode),
}

/// Most recent failure, kept so the UI can offer a retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOperation {
    pub operation: Operation,
    pub failure: Failure,
}

impl FailedOperation {
    /// The request to resend, if the operation can be retried
    #[must_use]
    pub const fn retry_request(&self) -> Option<&Request> {
        match &self.operation {
            Operation::Request(request) => Some(request),
            Operation::Transcription(_) | Operation::Recording(_) => None,
        }
    }
}

/// Safe state to return to once an error has been read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Menu,
    Confirm,
}

/// Input to the state machine
#[derive(Debug)]
pub enum Event {
    /// Decoded keypad press
    Key(Key),
    /// `fetch_menu` finished
    MenuLoaded(Outcome<MenuDescriptor>),
    /// `execute_action` or `chat` finished
    ReplyReceived(Outcome<String>),
    /// `transcribe` finished
    Transcribed(Outcome<String>),
    /// The recording device refused to start
    CaptureFailed {
        recording: RecordingId,
        failure: Failure,
    },
    /// A recording hit its length ceiling
    RecordingLimitReached(RecordingId),
    /// The error pause is over
    Recover(Recovery),
    /// The client is shutting down
    Shutdown,
}

/// Work for the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Call `fetch_menu`, answer with [`Event::MenuLoaded`]
    FetchMenu,
    /// Issue the request, answer with [`Event::ReplyReceived`]
    Send(Request),
    /// Start the recorder and arm the ceiling timer
    StartRecording {
        recording: RecordingId,
        limit: Duration,
    },
    /// Stop the recorder; when `transcribe` is set, upload the audio and
    /// answer with [`Event::Transcribed`]
    StopRecording {
        recording: RecordingId,
        transcribe: bool,
    },
    /// Replace the screen
    Render(View),
    /// Speak, replacing any current speech
    Speak(String),
    StopSpeaking,
    /// Deliver [`Event::Recover`] after `after`
    ScheduleRecovery { after: Duration, recovery: Recovery },
    /// Leave the client
    Exit,
}

/// Call the session is waiting on while in [`SessionState::Sending`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum InFlight {
    Reply(Request),
    Transcription(RecordingMode),
    Recovery(Recovery),
}

/// The single mutable aggregate of a running client
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    menu: MenuRegistry,
    options: DynamicOptions,
    transcript: TranscriptBuffer,
    pending: Option<PendingAction>,
    tts_enabled: bool,
    config: SessionConfig,
    in_flight: Option<InFlight>,
    recording: Option<(RecordingId, RecordingMode)>,
    next_recording: u64,
    voice_prompt: Option<String>,
    last_reply: String,
    last_failure: Option<FailedOperation>,
    status: String,
}

impl Session {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: SessionState::Menu,
            menu: MenuRegistry::default(),
            options: DynamicOptions::default(),
            transcript: TranscriptBuffer::new(),
            pending: None,
            tts_enabled: config.tts_enabled,
            config,
            in_flight: None,
            recording: None,
            next_recording: 0,
            voice_prompt: None,
            last_reply: String::new(),
            last_failure: None,
            status: "Loading...".to_string(),
        }
    }

    /// Commands that bootstrap the session: show a placeholder, fetch the menu
    #[must_use]
    pub fn start(&self) -> Vec<Command> {
        vec![Command::Render(self.view()), Command::FetchMenu]
    }

    /// Feed one event through the machine
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut out = Vec::new();
        match event {
            Event::Key(key) => self.on_key(key, &mut out),
            Event::MenuLoaded(outcome) => self.on_menu_loaded(outcome, &mut out),
            Event::ReplyReceived(outcome) => self.on_reply(outcome, &mut out),
            Event::Transcribed(outcome) => self.on_transcribed(outcome, &mut out),
            Event::CaptureFailed { recording, failure } => {
                self.on_capture_failed(recording, failure, &mut out);
            }
            Event::RecordingLimitReached(recording) => self.on_recording_limit(recording, &mut out),
            Event::Recover(recovery) => self.on_recover(recovery, &mut out),
            Event::Shutdown => {
                self.cancel_recording(&mut out);
                out.push(Command::StopSpeaking);
                out.push(Command::Exit);
            }
        }
        out
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn menu(&self) -> &MenuRegistry {
        &self.menu
    }

    #[must_use]
    pub const fn options(&self) -> &DynamicOptions {
        &self.options
    }

    #[must_use]
    pub fn transcript(&self) -> &str {
        self.transcript.as_str()
    }

    #[must_use]
    pub const fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    #[must_use]
    pub const fn tts_enabled(&self) -> bool {
        self.tts_enabled
    }

    #[must_use]
    pub const fn last_failure(&self) -> Option<&FailedOperation> {
        self.last_failure.as_ref()
    }

    /// Current screen contents
    #[must_use]
    pub fn view(&self) -> View {
        let transcript = (!self.transcript.is_empty()).then(|| self.transcript.as_str().to_string());

        match self.state {
            SessionState::Menu => View {
                title: true,
                menu: self.menu.is_loaded().then(|| self.menu.render()),
                status: self.status.clone(),
                ..View::default()
            },
            SessionState::Response => View {
                title: false,
                status: self.status.clone(),
                body: Some(self.last_reply.clone()),
                options: (!self.options.is_empty()).then(|| self.options.render()),
                ..View::default()
            },
            SessionState::VoicePrompt
            | SessionState::Recording
            | SessionState::RecordingAppend
            | SessionState::Confirm
            | SessionState::Sending => View {
                title: true,
                status: self.status.clone(),
                transcript,
                ..View::default()
            },
        }
    }

    fn render(&self, out: &mut Vec<Command>) {
        out.push(Command::Render(self.view()));
    }

    /// Change state, dropping options whenever the reply is left behind
    fn set_state(&mut self, next: SessionState) {
        if next != SessionState::Response {
            self.options.clear();
        }
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, "state change");
        }
        self.state = next;
    }

    fn on_key(&mut self, key: Key, out: &mut Vec<Command>) {
        tracing::trace!(key = %key, state = ?self.state, "key");
        match self.state {
            SessionState::Menu => self.on_menu_key(key, out),
            SessionState::VoicePrompt => match key {
                Key::Digit(d) if d.value() == 1 => self.start_recording(RecordingMode::Fresh, out),
                k if k.is_back() => self.return_to_menu(out),
                _ => {}
            },
            SessionState::Recording => match key {
                Key::Digit(d) if d.value() == 1 => self.stop_and_transcribe(out),
                k if k.is_back() => {
                    self.cancel_recording(out);
                    self.return_to_menu(out);
                }
                _ => {}
            },
            SessionState::RecordingAppend => match key {
                Key::Digit(d) if d.value() == 1 => self.stop_and_transcribe(out),
                k if k.is_back() => {
                    self.cancel_recording(out);
                    self.enter_confirm(out);
                }
                _ => {}
            },
            SessionState::Confirm => self.on_confirm_key(key, out),
            SessionState::Sending => {
                tracing::debug!(key = %key, "ignoring key while busy");
            }
            SessionState::Response => self.on_response_key(key, out),
        }
    }

    fn on_menu_key(&mut self, key: Key, out: &mut Vec<Command>) {
        match key {
            k if k.is_back() => {
                out.push(Command::StopSpeaking);
                out.push(Command::Exit);
            }
            Key::Pound => {
                let Some(request) = self
                    .last_failure
                    .as_ref()
                    .and_then(FailedOperation::retry_request)
                    .cloned()
                else {
                    return;
                };
                tracing::info!(?request, "retrying failed request");
                let label = self.request_label(&request);
                self.dispatch(request, &label, out);
            }
            Key::Digit(digit) => {
                let Some(item) = self.menu.get(digit) else {
                    tracing::debug!(key = %digit, "no menu item on key");
                    return;
                };

                self.pending = Some(PendingAction {
                    action_key: Some(digit),
                    is_follow_up: false,
                });

                match item.kind {
                    ActionKind::Instant => {
                        let label = item.label.clone();
                        self.dispatch(
                            Request::Execute {
                                key: digit,
                                voice_input: None,
                            },
                            &label,
                            out,
                        );
                    }
                    ActionKind::VoicePrompted => {
                        self.voice_prompt = item.prompt.clone();
                        self.enter_voice_prompt(out);
                    }
                }
            }
            Key::Star | Key::Back => {}
        }
    }

    fn on_confirm_key(&mut self, key: Key, out: &mut Vec<Command>) {
        match key {
            k if k.is_back() => {
                self.transcript.clear();
                self.return_to_menu(out);
            }
            Key::Digit(d) if d.value() == 1 => {
                if self.transcript.is_empty() {
                    tracing::debug!("nothing to send");
                    return;
                }
                let text = self.transcript.take();
                let action_key = self
                    .pending
                    .and_then(|p| p.action_key)
                    .filter(|k| self.menu.get(*k).is_some());

                let request = match action_key {
                    Some(key) => Request::Execute {
                        key,
                        voice_input: Some(text),
                    },
                    None => Request::Chat { text },
                };
                let label = self.request_label(&request);
                self.dispatch(request, &label, out);
            }
            Key::Digit(d) if d.value() == 2 => self.start_recording(RecordingMode::Append, out),
            Key::Digit(d) if d.value() == 3 => {
                self.transcript.clear();
                self.start_recording(RecordingMode::Fresh, out);
            }
            _ => {}
        }
    }

    fn on_response_key(&mut self, key: Key, out: &mut Vec<Command>) {
        if key.is_back() {
            if let Some(option) = self.options.back_option() {
                tracing::debug!(text = %option.text, "back option selected");
            }
            self.return_to_menu(out);
            return;
        }

        if let Some(option) = key.as_digit().and_then(|d| self.options.get(d)) {
            let text = option.text.clone();
            out.push(Command::StopSpeaking);
            self.pending = Some(PendingAction {
                action_key: None,
                is_follow_up: true,
            });
            let label = follow_up_label(&text);
            self.dispatch(Request::Chat { text }, &label, out);
            return;
        }

        match key {
            Key::Digit(d) if d.value() == 5 => {
                out.push(Command::StopSpeaking);
                self.pending = Some(PendingAction {
                    action_key: None,
                    is_follow_up: true,
                });
                self.voice_prompt = None;
                self.enter_voice_prompt(out);
            }
            Key::Star => {
                self.tts_enabled = !self.tts_enabled;
                out.push(Command::StopSpeaking);
                let word = if self.tts_enabled { "TTS ON" } else { "TTS OFF" };
                self.status = format!("{word}  {}", self.response_status());
                self.render(out);
            }
            Key::Pound => {
                if self.last_reply.is_empty() {
                    return;
                }
                self.tts_enabled = true;
                self.status = self.response_status();
                self.render(out);
                out.push(Command::Speak(self.last_reply.clone()));
            }
            _ => {}
        }
    }

    /// Consume the pending action and put `request` on the wire
    fn dispatch(&mut self, request: Request, label: &str, out: &mut Vec<Command>) {
        let pending = self.pending.take();
        tracing::debug!(?request, ?pending, "dispatching request");

        self.last_failure = None;
        self.voice_prompt = None;
        self.in_flight = Some(InFlight::Reply(request.clone()));
        self.set_state(SessionState::Sending);
        self.status = format!("⏳ {label}");
        self.render(out);
        out.push(Command::Send(request));
    }

    fn request_label(&self, request: &Request) -> String {
        match request {
            Request::Execute { key, .. } => self
                .menu
                .get(*key)
                .map_or_else(|| "Working...".to_string(), |item| item.label.clone()),
            Request::Chat { .. } => "Thinking...".to_string(),
        }
    }

    fn start_recording(&mut self, mode: RecordingMode, out: &mut Vec<Command>) {
        if self.recording.is_some() {
            tracing::warn!("recording already active");
            return;
        }

        self.next_recording += 1;
        let recording = RecordingId(self.next_recording);
        self.recording = Some((recording, mode));

        let (state, status) = match mode {
            RecordingMode::Fresh => {
                self.transcript.clear();
                (SessionState::Recording, "🎤 Recording... (1=stop)")
            }
            RecordingMode::Append => (SessionState::RecordingAppend, "🎤 Adding... (1=stop)"),
        };
        self.set_state(state);
        self.status = status.to_string();

        out.push(Command::StartRecording {
            recording,
            limit: self.config.max_recording,
        });
        self.render(out);
    }

    fn stop_and_transcribe(&mut self, out: &mut Vec<Command>) {
        let Some((recording, mode)) = self.recording.take() else {
            return;
        };

        self.in_flight = Some(InFlight::Transcription(mode));
        self.set_state(SessionState::Sending);
        self.status = "🔄 Transcribing...".to_string();
        out.push(Command::StopRecording {
            recording,
            transcribe: true,
        });
        self.render(out);
    }

    fn cancel_recording(&mut self, out: &mut Vec<Command>) {
        if let Some((recording, _)) = self.recording.take() {
            out.push(Command::StopRecording {
                recording,
                transcribe: false,
            });
        }
    }

    fn enter_voice_prompt(&mut self, out: &mut Vec<Command>) {
        self.set_state(SessionState::VoicePrompt);
        self.status = match &self.voice_prompt {
            Some(prompt) => format!("{prompt}\n\n{SPEAK_HINT}"),
            None => SPEAK_HINT.to_string(),
        };
        self.render(out);
    }

    fn enter_confirm(&mut self, out: &mut Vec<Command>) {
        self.set_state(SessionState::Confirm);
        self.status = CONFIRM_HINT.to_string();
        self.render(out);
    }

    fn return_to_menu(&mut self, out: &mut Vec<Command>) {
        out.push(Command::StopSpeaking);
        self.transcript.clear();
        self.pending = None;
        self.voice_prompt = None;
        self.set_state(SessionState::Menu);
        self.status = self.menu_status();
        self.render(out);
    }

    fn menu_status(&self) -> String {
        let retryable = self
            .last_failure
            .as_ref()
            .is_some_and(|f| f.retry_request().is_some());
        if retryable { MENU_RETRY_HINT } else { MENU_HINT }.to_string()
    }

    fn response_status(&self) -> String {
        let icon = if self.tts_enabled { "🔊" } else { "🔇" };
        format!("{icon} 0=Menu 5=Voice *=TTS")
    }

    /// Show an error, then return to `recovery` after `pause`
    fn fail(
        &mut self,
        operation: Operation,
        failure: Failure,
        recovery: Recovery,
        pause: Duration,
        out: &mut Vec<Command>,
    ) {
        tracing::warn!(?operation, reason = %failure.reason, kind = ?failure.kind, "operation failed");
        self.status = failure.reason.clone();
        self.last_failure = Some(FailedOperation { operation, failure });
        self.in_flight = Some(InFlight::Recovery(recovery));
        self.set_state(SessionState::Sending);
        self.render(out);
        out.push(Command::ScheduleRecovery {
            after: pause,
            recovery,
        });
    }

    fn on_menu_loaded(&mut self, outcome: Outcome<MenuDescriptor>, out: &mut Vec<Command>) {
        if self.menu.is_loaded() {
            tracing::debug!("menu already loaded, ignoring");
            return;
        }

        self.menu = match outcome {
            Ok(descriptor) => MenuRegistry::from_descriptor(descriptor),
            Err(failure) => {
                tracing::debug!(reason = %failure, "menu unavailable, using default menu");
                MenuRegistry::fallback()
            }
        };
        tracing::info!(items = self.menu.len(), source = ?self.menu.source(), "menu ready");

        if self.state == SessionState::Menu {
            self.status = self.menu_status();
            self.render(out);
        }
    }

    fn on_reply(&mut self, outcome: Outcome<String>, out: &mut Vec<Command>) {
        let Some(InFlight::Reply(request)) = self.in_flight.take_if(|f| matches!(f, InFlight::Reply(_)))
        else {
            tracing::warn!("reply arrived with no request in flight");
            return;
        };

        match outcome {
            Ok(raw) => {
                let parsed = parse_reply(&raw);
                tracing::info!(
                    body_len = parsed.body.len(),
                    options = parsed.options.len(),
                    "reply received"
                );

                self.pending = None;
                self.voice_prompt = None;
                self.transcript.clear();
                self.last_reply = parsed.body;
                self.set_state(SessionState::Response);
                self.options = parsed.options;
                self.status = self.response_status();
                self.render(out);

                if self.tts_enabled && !self.last_reply.is_empty() {
                    out.push(Command::Speak(self.last_reply.clone()));
                }
            }
            Err(failure) => {
                let pause = self.config.failure_pause;
                self.fail(Operation::Request(request), failure, Recovery::Menu, pause, out);
            }
        }
    }

    fn on_transcribed(&mut self, outcome: Outcome<String>, out: &mut Vec<Command>) {
        let Some(InFlight::Transcription(mode)) =
            self.in_flight.take_if(|f| matches!(f, InFlight::Transcription(_)))
        else {
            tracing::warn!("transcript arrived with no transcription in flight");
            return;
        };

        match outcome {
            Ok(text) => {
                match mode {
                    RecordingMode::Fresh => self.transcript.replace(&text),
                    RecordingMode::Append => self.transcript.append(&text),
                }
                self.enter_confirm(out);
            }
            Err(failure) => {
                let (recovery, pause) = match mode {
                    RecordingMode::Fresh => (Recovery::Menu, self.config.failure_pause),
                    RecordingMode::Append => {
                        (Recovery::Confirm, self.config.transcribe_failure_pause)
                    }
                };
                self.fail(Operation::Transcription(mode), failure, recovery, pause, out);
            }
        }
    }

    fn on_capture_failed(&mut self, recording: RecordingId, failure: Failure, out: &mut Vec<Command>) {
        let Some((_, mode)) = self.recording.take_if(|(id, _)| *id == recording) else {
            tracing::debug!(?recording, "capture failure for stale recording");
            return;
        };

        match mode {
            RecordingMode::Fresh => {
                let failure = Failure::new(failure.kind, DEVICE_ERROR);
                let pause = self.config.failure_pause;
                self.fail(Operation::Recording(mode), failure, Recovery::Menu, pause, out);
            }
            RecordingMode::Append => {
                tracing::warn!(reason = %failure.reason, "append recording failed to start");
                self.last_failure = Some(FailedOperation {
                    operation: Operation::Recording(mode),
                    failure,
                });
                self.enter_confirm(out);
            }
        }
    }

    fn on_recording_limit(&mut self, recording: RecordingId, out: &mut Vec<Command>) {
        let current = self.recording.is_some_and(|(id, _)| id == recording);
        let recording_state = matches!(
            self.state,
            SessionState::Recording | SessionState::RecordingAppend
        );

        if current && recording_state {
            tracing::info!(?recording, "recording ceiling reached");
            self.stop_and_transcribe(out);
        } else {
            tracing::debug!(?recording, "ignoring stale recording timer");
        }
    }

    fn on_recover(&mut self, recovery: Recovery, out: &mut Vec<Command>) {
        if self.in_flight != Some(InFlight::Recovery(recovery)) {
            tracing::debug!(?recovery, "ignoring stale recovery");
            return;
        }
        self.in_flight = None;

        match recovery {
            Recovery::Menu => self.return_to_menu(out),
            Recovery::Confirm => self.enter_confirm(out),
        }
    }
}

fn follow_up_label(text: &str) -> String {
    let short: String = text.chars().take(FOLLOW_UP_LABEL_CHARS).collect();
    format!("{short}...")
}
