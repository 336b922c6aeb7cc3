//! Text-to-speech for the fetched condition summary.
//!
//! Speech is synchronous and best-effort: the caller waits for playback to
//! finish, and any failure is reported, never propagated.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("Nothing to speak")]
    EmptyText,

    #[error("Failed to start speech command {command:?}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Failed to send text to speech command {command:?}: {reason}")]
    Input { command: String, reason: String },

    #[error("Speech command {command:?} exited with {status}")]
    Failed { command: String, status: String },
}

/// Outcome of a speech attempt, as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpeechStatus {
    Spoken,
    /// Speech switched off by configuration.
    Disabled,
    Failed { message: String },
}

pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, returning when playback is done.
    fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// `false` when speech is switched off; callers then skip `speak`.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Speak through `synth`, folding every outcome into a status.
pub fn speak_reported(synth: &dyn SpeechSynthesizer, text: &str) -> SpeechStatus {
    if !synth.is_enabled() {
        return SpeechStatus::Disabled;
    }
    match synth.speak(text) {
        Ok(()) => SpeechStatus::Spoken,
        Err(e) => {
            tracing::warn!(error = %e, "Speech synthesis failed");
            SpeechStatus::Failed {
                message: e.to_string(),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Command engine
// ═══════════════════════════════════════════════════════════

/// Speaks through an external program reading the text from stdin
/// (`espeak-ng --stdin`, `say`, ...). The text is never an argument, so a
/// summary starting with `-` cannot turn into an option.
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechEngine {
    /// Parse a command line like `espeak-ng --stdin -s 150`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl SpeechSynthesizer for CommandSpeechEngine {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let spawn_error = |e: std::io::Error| SpeechError::Spawn {
            command: self.program.clone(),
            reason: e.to_string(),
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading closes the pipe; its exit
            // status decides the outcome.
            match writeln!(stdin, "{text}") {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SpeechError::Input {
                        command: self.program.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let status = child.wait().map_err(spawn_error)?;

        if !status.success() {
            return Err(SpeechError::Failed {
                command: self.program.clone(),
                status: status.to_string(),
            });
        }
        tracing::debug!(program = %self.program, chars = text.len(), "Speech played");
        Ok(())
    }
}

/// Speech switched off by configuration.
pub struct DisabledSpeech;

impl SpeechSynthesizer for DisabledSpeech {
    fn speak(&self, _text: &str) -> Result<(), SpeechError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// ═══════════════════════════════════════════════════════════
// Recording double
// ═══════════════════════════════════════════════════════════

/// Records spoken texts instead of playing them (tests).
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    failure: Option<SpeechError>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call records the text, then fails with `error`.
    pub fn failing(error: SpeechError) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SpeechSynthesizer for RecordingSpeech {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line() {
        let engine = CommandSpeechEngine::from_command_line("espeak-ng --stdin -s 150").unwrap();
        assert_eq!(engine.program(), "espeak-ng");
        assert_eq!(engine.args, vec!["--stdin", "-s", "150"]);
        assert!(CommandSpeechEngine::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_is_spoken() {
        let engine = CommandSpeechEngine::from_command_line("cat").unwrap();
        assert_eq!(speak_reported(&engine, "hello"), SpeechStatus::Spoken);
    }

    #[cfg(unix)]
    #[test]
    fn dash_leading_text_goes_through_stdin() {
        // grep succeeds only if "-v" arrives as an input line; as an extra
        // argument it would invert the match over empty input and fail.
        let engine = CommandSpeechEngine::from_command_line("grep -q -e -v").unwrap();
        assert_eq!(speak_reported(&engine, "-v"), SpeechStatus::Spoken);
    }

    #[cfg(unix)]
    #[test]
    fn program_ignoring_stdin_still_reports_status() {
        let engine = CommandSpeechEngine::from_command_line("true").unwrap();
        assert_eq!(engine.speak(&"long text ".repeat(20_000)), Ok(()));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let engine = CommandSpeechEngine::from_command_line("false").unwrap();
        assert!(matches!(
            engine.speak("hello"),
            Err(SpeechError::Failed { .. })
        ));
    }

    #[test]
    fn missing_program_is_reported_not_raised() {
        let engine =
            CommandSpeechEngine::from_command_line("brainscan-no-such-tts-binary").unwrap();
        match speak_reported(&engine, "hello") {
            SpeechStatus::Failed { message } => assert!(message.contains("Failed to start")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn empty_text_is_rejected() {
        let engine = CommandSpeechEngine::from_command_line("true").unwrap();
        assert_eq!(engine.speak("  "), Err(SpeechError::EmptyText));
    }

    #[test]
    fn disabled_speech_is_reported_as_disabled() {
        let status = speak_reported(&DisabledSpeech, "hello");
        assert_eq!(status, SpeechStatus::Disabled);
        assert_eq!(serde_json::to_value(&status).unwrap()["status"], "disabled");
        assert_eq!(
            serde_json::to_value(SpeechStatus::Spoken).unwrap()["status"],
            "spoken"
        );
    }

    #[test]
    fn recording_speech_keeps_texts() {
        let speech = RecordingSpeech::new();
        speak_reported(&speech, "first");
        speak_reported(&speech, "second");
        assert_eq!(speech.spoken(), vec!["first", "second"]);

        let failing = RecordingSpeech::failing(SpeechError::EmptyText);
        assert!(matches!(
            speak_reported(&failing, "x"),
            SpeechStatus::Failed { .. }
        ));
        assert_eq!(failing.spoken(), vec!["x"]);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(SpeechStatus::Failed {
            message: "no audio".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "no audio");
    }
}
