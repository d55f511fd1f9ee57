//! Display and speech output
//!
//! The session describes what should be on screen as a [`View`] and what
//! should be said as plain text; an [`OutputSink`] does the rest.

use std::io::Write;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;

/// Everything the screen shows at one moment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    /// Show the title banner
    pub title: bool,
    /// Rendered menu, when the menu is visible
    pub menu: Option<String>,
    /// One-line status or key hints
    pub status: String,
    /// What the user said so far
    pub transcript: Option<String>,
    /// Reply prose
    pub body: Option<String>,
    /// Rendered follow-up options
    pub options: Option<String>,
}

/// Screen and speaker of the client
///
/// Speech is fire-and-replace: a new `speak` halts whatever is playing.
pub trait OutputSink {
    /// Replace the screen contents
    fn render(&mut self, view: &View);

    /// Start speaking `text`, cutting off any current speech
    fn speak(&mut self, text: &str);

    /// Halt speech, if any
    fn stop_speaking(&mut self);
}

static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").expect("valid regex"));

static TABLE_RULES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[\]|\-]{2,}").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Flatten reply text for a speech engine
///
/// Line breaks become sentence pauses and table rules are dropped.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    let text = NEWLINES.replace_all(text, ". ");
    let text = TABLE_RULES.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Speaks through an external text-to-speech program
pub struct CommandSpeaker {
    program: String,
    current: Option<tokio::process::Child>,
}

impl CommandSpeaker {
    /// Speaker using `program`, or `say`/`espeak` depending on platform
    #[must_use]
    pub fn new(program: Option<String>) -> Self {
        let program = program.unwrap_or_else(|| {
            if cfg!(target_os = "macos") { "say" } else { "espeak" }.to_string()
        });
        tracing::debug!(program = %program, "speech output initialized");
        Self {
            program,
            current: None,
        }
    }

    /// Start speaking, replacing any current utterance
    ///
    /// Must be called from within a Tokio runtime.
    pub fn speak(&mut self, text: &str) {
        self.stop();

        let text = clean_for_speech(text);
        if text.is_empty() {
            return;
        }

        match tokio::process::Command::new(&self.program)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                tracing::debug!(chars = text.len(), "speaking");
                self.current = Some(child);
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "failed to start speech");
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut child) = self.current.take() {
            if let Err(e) = child.start_kill() {
                tracing::trace!(error = %e, "speech already finished");
            }
        }
    }
}

/// Renders views as plain text and optionally speaks
pub struct TerminalSink<W: Write> {
    out: W,
    speaker: Option<CommandSpeaker>,
}

impl<W: Write> TerminalSink<W> {
    #[must_use]
    pub const fn new(out: W, speaker: Option<CommandSpeaker>) -> Self {
        Self { out, speaker }
    }

    fn write_view(&mut self, view: &View) -> std::io::Result<()> {
        writeln!(self.out, "────────────────────────────────")?;
        if view.title {
            writeln!(self.out, "🤖 Assistant")?;
        }
        if let Some(menu) = &view.menu {
            writeln!(self.out, "{menu}")?;
        }
        if !view.status.is_empty() {
            writeln!(self.out, "» {}", view.status)?;
        }
        if let Some(transcript) = &view.transcript {
            writeln!(self.out, "You: {transcript}")?;
        }
        if let Some(body) = &view.body {
            writeln!(self.out, "\n{body}")?;
        }
        if let Some(options) = &view.options {
            writeln!(self.out, "\n{options}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> OutputSink for TerminalSink<W> {
    fn render(&mut self, view: &View) {
        if let Err(e) = self.write_view(view) {
            tracing::warn!(error = %e, "failed to render view");
        }
    }

    fn speak(&mut self, text: &str) {
        if let Some(speaker) = self.speaker.as_mut() {
            speaker.speak(text);
        }
    }

    fn stop_speaking(&mut self) {
        if let Some(speaker) = self.speaker.as_mut() {
            speaker.stop();
        }
    }
}
