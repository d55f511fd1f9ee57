//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keypad_assistant::client::{Failure, Outcome, RemoteClient};
use keypad_assistant::config::SessionConfig;
use keypad_assistant::keypad::{Digit, Key};
use keypad_assistant::menu::MenuDescriptor;
use keypad_assistant::output::{OutputSink, View};
use keypad_assistant::session::{Event, Session};
use keypad_assistant::voice::{AudioRecorder, CaptureHandle};
use keypad_assistant::{EventSender, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Calls observed by [`MockClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchMenu,
    Execute { key: u8, voice_input: Option<String> },
    Transcribe { bytes: usize },
    Chat { text: String },
}

/// Scripted remote client
///
/// Replies and transcripts are served in order; once a queue is empty the
/// client answers with a fixed default.
pub struct MockClient {
    menu: Mutex<Option<Outcome<MenuDescriptor>>>,
    replies: Mutex<VecDeque<Outcome<String>>>,
    transcripts: Mutex<VecDeque<Outcome<String>>>,
    reply_delay: Duration,
    calls: Mutex<Vec<Call>>,
}

impl MockClient {
    /// Client whose menu fetch times out
    pub fn offline_menu() -> Self {
        Self {
            menu: Mutex::new(Some(Err(Failure::network("Timed out")))),
            replies: Mutex::new(VecDeque::new()),
            transcripts: Mutex::new(VecDeque::new()),
            reply_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_menu_json(self, json: &str) -> Self {
        let descriptor = serde_json::from_str(json).expect("valid menu json");
        *self.menu.lock().unwrap() = Some(Ok(descriptor));
        self
    }

    pub fn reply(self, outcome: Outcome<String>) -> Self {
        self.replies.lock().unwrap().push_back(outcome);
        self
    }

    pub fn transcript(self, outcome: Outcome<String>) -> Self {
        self.transcripts.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn next_reply(&self) -> Outcome<String> {
        if !self.reply_delay.is_zero() {
            tokio::time::sleep(self.reply_delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

#[async_trait]
impl RemoteClient for MockClient {
    async fn fetch_menu(&self) -> Outcome<MenuDescriptor> {
        self.record(Call::FetchMenu);
        self.menu
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Failure::network("Timed out")))
    }

    async fn execute_action(&self, key: Digit, voice_input: Option<&str>) -> Outcome<String> {
        self.record(Call::Execute {
            key: key.value(),
            voice_input: voice_input.map(ToString::to_string),
        });
        self.next_reply().await
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Outcome<String> {
        self.record(Call::Transcribe { bytes: audio.len() });
        if audio.is_empty() {
            return Err(Failure::precondition("No audio"));
        }
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    async fn chat(&self, text: &str) -> Outcome<String> {
        self.record(Call::Chat {
            text: text.to_string(),
        });
        self.next_reply().await
    }
}

/// Recorder activity observed by [`MockRecorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCall {
    Start,
    Stop,
}

/// Recorder that returns fixed bytes, or refuses to start
pub struct MockRecorder {
    audio: Vec<u8>,
    fail_start: bool,
    active: Option<u64>,
    next_id: u64,
    log: Arc<Mutex<Vec<RecorderCall>>>,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self {
            audio: b"RIFF-fake-audio".to_vec(),
            fail_start: false,
            active: None,
            next_id: 0,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> Arc<Mutex<Vec<RecorderCall>>> {
        Arc::clone(&self.log)
    }
}

impl AudioRecorder for MockRecorder {
    fn start_capture(&mut self) -> keypad_assistant::Result<CaptureHandle> {
        if self.fail_start {
            return Err(keypad_assistant::Error::Device(
                "no input device available".to_string(),
            ));
        }
        assert!(self.active.is_none(), "two recordings at once");
        self.next_id += 1;
        self.active = Some(self.next_id);
        self.log.lock().unwrap().push(RecorderCall::Start);
        Ok(CaptureHandle::new(self.next_id))
    }

    fn stop_capture(&mut self, handle: CaptureHandle) -> keypad_assistant::Result<Vec<u8>> {
        assert_eq!(self.active.take(), Some(handle.id()), "stale capture handle");
        self.log.lock().unwrap().push(RecorderCall::Stop);
        Ok(self.audio.clone())
    }
}

/// Output observed by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Render(View),
    Speak(String),
    StopSpeaking,
}

/// Sink that forwards everything to a channel
pub struct ChannelSink(mpsc::UnboundedSender<Output>);

impl OutputSink for ChannelSink {
    fn render(&mut self, view: &View) {
        let _ = self.0.send(Output::Render(view.clone()));
    }

    fn speak(&mut self, text: &str) {
        let _ = self.0.send(Output::Speak(text.to_string()));
    }

    fn stop_speaking(&mut self) {
        let _ = self.0.send(Output::StopSpeaking);
    }
}

/// A runtime running on a background task, plus handles to poke at it
pub struct Harness {
    pub client: Arc<MockClient>,
    pub recorder: Arc<Mutex<Vec<RecorderCall>>>,
    pub events: EventSender,
    pub output: mpsc::UnboundedReceiver<Output>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(client: MockClient, recorder: MockRecorder) -> Self {
        Self::start_with(client, recorder, SessionConfig::default())
    }

    pub fn start_with(client: MockClient, recorder: MockRecorder, config: SessionConfig) -> Self {
        let client = Arc::new(client);
        let (tx, output) = mpsc::unbounded_channel();
        let log = recorder.log();

        let runtime = Runtime::new(
            Session::new(config),
            Arc::clone(&client),
            recorder,
            ChannelSink(tx),
        );
        let events = runtime.sender();
        let task = tokio::spawn(runtime.run());

        Self {
            client,
            recorder: log,
            events,
            output,
            task,
        }
    }

    pub fn press(&self, c: char) {
        let key = Key::from_char(c).expect("valid key");
        self.events.send(Event::Key(key)).expect("runtime running");
    }

    /// Next output matching `pred`, skipping everything before it
    pub async fn wait_for(&mut self, pred: impl Fn(&Output) -> bool) -> Output {
        let deadline = Duration::from_secs(120);
        loop {
            let next = tokio::time::timeout(deadline, self.output.recv())
                .await
                .expect("timed out waiting for output")
                .expect("runtime stopped");
            if pred(&next) {
                return next;
            }
        }
    }

    /// Next rendered view whose status contains `needle`
    pub async fn wait_for_status(&mut self, needle: &str) -> View {
        match self
            .wait_for(|o| matches!(o, Output::Render(v) if v.status.contains(needle)))
            .await
        {
            Output::Render(view) => view,
            _ => unreachable!(),
        }
    }

    pub async fn wait_for_speech(&mut self) -> String {
        match self.wait_for(|o| matches!(o, Output::Speak(_))).await {
            Output::Speak(text) => text,
            _ => unreachable!(),
        }
    }

    /// Let spawned tasks run until nothing is ready
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    pub fn recorder_calls(&self) -> Vec<RecorderCall> {
        self.recorder.lock().unwrap().clone()
    }
}
