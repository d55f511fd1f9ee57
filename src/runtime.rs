//! Event loop that connects the session to the outside world
//!
//! The [`Runtime`] is the only consumer of the session event queue. Network
//! calls and timers run as spawned tasks and report back by posting events,
//! so the session sees one event at a time and never blocks.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{Failure, RemoteClient};
use crate::keypad::Key;
use crate::output::OutputSink;
use crate::session::{Command, Event, RecordingId, Request, Session};
use crate::voice::{AudioRecorder, CaptureHandle};

/// Handle for posting events into a running [`Runtime`]
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Drives a [`Session`] with a remote client, a recorder, and an output sink
pub struct Runtime<C, R, S> {
    session: Session,
    client: Arc<C>,
    recorder: R,
    sink: S,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<Event>,
    active: Option<(RecordingId, CaptureHandle)>,
    limit_timer: Option<JoinHandle<()>>,
}

impl<C, R, S> Runtime<C, R, S>
where
    C: RemoteClient + 'static,
    R: AudioRecorder,
    S: OutputSink,
{
    #[must_use]
    pub fn new(session: Session, client: Arc<C>, recorder: R, sink: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session,
            client,
            recorder,
            sink,
            events_tx,
            events_rx,
            active: None,
            limit_timer: None,
        }
    }

    /// Sender for keypad input and shutdown requests
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Run until the session asks to exit or every event sender is gone
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) {
        tracing::info!("session started");

        let commands = self.session.start();
        let mut running = self.execute_all(commands);

        while running {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            let commands = self.session.handle(event);
            running = self.execute_all(commands);
        }

        self.shutdown();
        tracing::info!("session ended");
    }

    /// Execute commands in order; `false` once an exit is requested
    fn execute_all(&mut self, commands: Vec<Command>) -> bool {
        for command in commands {
            if !self.execute(command) {
                return false;
            }
        }
        true
    }

    fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::FetchMenu => {
                let client = Arc::clone(&self.client);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = client.fetch_menu().await;
                    post(&tx, Event::MenuLoaded(outcome));
                });
            }
            Command::Send(request) => {
                let client = Arc::clone(&self.client);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = match request {
                        Request::Execute { key, voice_input } => {
                            client.execute_action(key, voice_input.as_deref()).await
                        }
                        Request::Chat { text } => client.chat(&text).await,
                    };
                    post(&tx, Event::ReplyReceived(outcome));
                });
            }
            Command::StartRecording { recording, limit } => {
                self.start_recording(recording, limit);
            }
            Command::StopRecording {
                recording,
                transcribe,
            } => self.stop_recording(recording, transcribe),
            Command::Render(view) => self.sink.render(&view),
            Command::Speak(text) => self.sink.speak(&text),
            Command::StopSpeaking => self.sink.stop_speaking(),
            Command::ScheduleRecovery { after, recovery } => {
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    post(&tx, Event::Recover(recovery));
                });
            }
            Command::Exit => return false,
        }
        true
    }

    fn start_recording(&mut self, recording: RecordingId, limit: std::time::Duration) {
        match self.recorder.start_capture() {
            Ok(handle) => {
                tracing::debug!(?recording, limit_secs = limit.as_secs(), "recording");
                self.active = Some((recording, handle));

                let tx = self.events_tx.clone();
                self.limit_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    post(&tx, Event::RecordingLimitReached(recording));
                }));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start recording");
                post(
                    &self.events_tx,
                    Event::CaptureFailed {
                        recording,
                        failure: Failure::from(e),
                    },
                );
            }
        }
    }

    fn stop_recording(&mut self, recording: RecordingId, transcribe: bool) {
        if let Some(timer) = self.limit_timer.take() {
            timer.abort();
        }

        let audio = match self.active.take() {
            Some((id, handle)) if id == recording => {
                self.recorder.stop_capture(handle).map_err(Failure::from)
            }
            other => {
                self.active = other;
                Err(Failure::device("Recording not active"))
            }
        };

        if !transcribe {
            if let Err(failure) = audio {
                tracing::debug!(reason = %failure, "discarded recording");
            }
            return;
        }

        let client = Arc::clone(&self.client);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = match audio {
                Ok(bytes) => client.transcribe(bytes).await,
                Err(failure) => Err(failure),
            };
            post(&tx, Event::Transcribed(outcome));
        });
    }

    /// Release the recorder and silence output
    fn shutdown(&mut self) {
        if let Some(timer) = self.limit_timer.take() {
            timer.abort();
        }
        if let Some((_, handle)) = self.active.take() {
            if let Err(e) = self.recorder.stop_capture(handle) {
                tracing::debug!(error = %e, "recorder already stopped");
            }
        }
        self.sink.stop_speaking();
    }
}

fn post(tx: &EventSender, event: Event) {
    if tx.send(event).is_err() {
        tracing::debug!("session ended, dropping event");
    }
}

/// Read keypad lines from `reader` and post them as key events
///
/// End of input posts [`Event::Shutdown`].
pub fn spawn_keypad<Rd>(reader: Rd, tx: EventSender) -> JoinHandle<()>
where
    Rd: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    for key in Key::decode_line(&line) {
                        post(&tx, Event::Key(key));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "keypad input error");
                    break;
                }
            }
        }
        tracing::debug!("keypad input closed");
        post(&tx, Event::Shutdown);
    })
}

/// Post [`Event::Shutdown`] on Ctrl-C
pub fn spawn_interrupt_handler(tx: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            post(&tx, Event::Shutdown);
        }
    })
}
