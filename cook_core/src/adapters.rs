//! Collaborators backed by external programs.
//!
//! Translation and speech engines are configured as argv templates in
//! `[voice]`. Without a command, translation reports itself unavailable and
//! narration falls back to the source text.

use crate::config::VoiceConfig;
use crate::services::{SpeechEvent, SpeechNotifier, Speaker, Translator, Utterance};
use crate::TranslationError;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Translator used when no translation command is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTranslator;

impl Translator for NoTranslator {
    fn translate(&self, _text: &str, target_language: &str) -> Result<String, TranslationError> {
        Err(TranslationError::Unavailable(format!(
            "no translator configured for {}",
            target_language
        )))
    }
}

/// Replace `{name}` placeholders in every argument
fn expand(argv: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{}}}", name), value)
            })
        })
        .collect()
}

/// Runs a command with the text on stdin and reads the translation from stdout
///
/// `{lang}` in the argv is replaced with the target language name. A command
/// that outlives the timeout is killed and the translation fails.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandTranslator {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            timeout: DEFAULT_TRANSLATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Drain a child pipe on its own thread so a chatty child never blocks
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl Translator for CommandTranslator {
    fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
        let argv = expand(&self.argv, &[("lang", target_language)]);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TranslationError::Unavailable("empty translate command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranslationError::Unavailable(format!("{}: {}", program, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TranslationError::Failed(e.to_string()));
            }
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!("{} did not answer within {:?}", program, self.timeout);
                    return Err(TranslationError::Failed(format!(
                        "{} timed out after {:?}",
                        program, self.timeout
                    )));
                }
                Ok(None) => thread::sleep(CHILD_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(TranslationError::Failed(e.to_string()));
                }
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(TranslationError::Failed(format!(
                "{} exited with {}: {}",
                program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let translated = String::from_utf8_lossy(&stdout).trim().to_string();
        tracing::debug!("Translated {} chars to {}", text.len(), target_language);
        Ok(translated)
    }
}

/// The utterance currently being spoken
struct Playback {
    child: Arc<Mutex<Child>>,
    cancelled: Arc<AtomicBool>,
}

/// Speaks through an external program, one process per utterance
///
/// `{tag}` and `{text}` in the argv are replaced with the speech tag and the
/// text. A watcher thread reports when the process ends. Cancelling kills and
/// reaps the process before returning, so two utterances never overlap.
pub struct CommandSpeaker {
    argv: Vec<String>,
    current: Option<Playback>,
}

impl CommandSpeaker {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            current: None,
        }
    }
}

fn watch_speech(child: Arc<Mutex<Child>>, cancelled: Arc<AtomicBool>, notifier: SpeechNotifier) {
    loop {
        let polled = {
            let Ok(mut child) = child.lock() else { return };
            // Checked under the lock: once cancel holds it, the exit is not ours to report
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            child.try_wait()
        };
        match polled {
            Ok(Some(status)) if status.success() => {
                notifier.notify(SpeechEvent::Ended);
                return;
            }
            Ok(Some(status)) => {
                notifier.notify(SpeechEvent::Failed(format!("speech exited with {}", status)));
                return;
            }
            Ok(None) => thread::sleep(CHILD_POLL_INTERVAL),
            Err(e) => {
                notifier.notify(SpeechEvent::Failed(e.to_string()));
                return;
            }
        }
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&mut self, utterance: &Utterance, notifier: SpeechNotifier) {
        self.cancel();

        let argv = expand(
            &self.argv,
            &[("tag", &utterance.speech_tag), ("text", &utterance.text)],
        );
        let Some((program, args)) = argv.split_first() else {
            notifier.notify(SpeechEvent::Failed("empty speak command".into()));
            return;
        };

        let child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => Arc::new(Mutex::new(child)),
            Err(e) => {
                tracing::warn!("Failed to start speech command {}: {}", program, e);
                notifier.notify(SpeechEvent::Failed(e.to_string()));
                return;
            }
        };

        notifier.notify(SpeechEvent::Started);

        let cancelled = Arc::new(AtomicBool::new(false));
        self.current = Some(Playback {
            child: Arc::clone(&child),
            cancelled: Arc::clone(&cancelled),
        });
        let spawned = thread::Builder::new()
            .name("speech-watch".into())
            .spawn(move || watch_speech(child, cancelled, notifier));
        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn speech watcher: {}", e);
        }
    }

    fn cancel(&mut self) {
        let Some(playback) = self.current.take() else {
            return;
        };
        playback.cancelled.store(true, Ordering::SeqCst);
        match playback.child.lock() {
            Ok(mut child) => {
                if let Ok(None) = child.try_wait() {
                    let _ = child.kill();
                }
                let _ = child.wait();
            }
            Err(_) => tracing::warn!("Speech process lock poisoned, cannot stop it"),
        };
    }
}

impl Drop for CommandSpeaker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Translator configured in `[voice]`, if any
pub fn translator_from_config(voice: &VoiceConfig) -> Arc<dyn Translator> {
    match &voice.translate_command {
        Some(argv) if !argv.is_empty() => Arc::new(
            CommandTranslator::new(argv.clone())
                .with_timeout(Duration::from_secs(voice.translate_timeout_secs.max(1))),
        ),
        _ => Arc::new(NoTranslator),
    }
}

/// Speaker configured in `[voice]`, if any
pub fn speaker_from_config(voice: &VoiceConfig) -> Option<CommandSpeaker> {
    voice
        .speak_command
        .as_ref()
        .filter(|argv| !argv.is_empty())
        .map(|argv| CommandSpeaker::new(argv.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerEvent;
    use crate::NarrationTicket;
    use std::path::Path;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_placeholders() {
        let expanded = expand(
            &argv(&["say", "--voice={tag}", "{text}"]),
            &[("tag", "hi-IN"), ("text", "namaste")],
        );
        assert_eq!(expanded, argv(&["say", "--voice=hi-IN", "namaste"]));
    }

    #[test]
    fn test_no_translator_is_unavailable() {
        let result = NoTranslator.translate("Boil water.", "Hindi");
        assert!(matches!(result, Err(TranslationError::Unavailable(_))));
    }

    #[test]
    fn test_from_config_without_commands() {
        let voice = VoiceConfig::default();
        assert!(speaker_from_config(&voice).is_none());
        assert!(translator_from_config(&voice).translate("x", "Kannada").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_translator_uses_stdout() {
        let translator = CommandTranslator::new(argv(&["sh", "-c", "tr a-z A-Z"]));
        assert_eq!(translator.translate("boil\n", "Hindi").unwrap(), "BOIL");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_translator_failure() {
        let translator = CommandTranslator::new(argv(&["sh", "-c", "exit 3"]));
        assert!(matches!(
            translator.translate("boil", "Hindi"),
            Err(TranslationError::Failed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_translator_times_out() {
        let translator = CommandTranslator::new(argv(&["sh", "-c", "sleep 5"]))
            .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let result = translator.translate("boil", "Hindi");

        assert!(matches!(result, Err(TranslationError::Failed(ref msg)) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_missing_translate_program() {
        let translator = CommandTranslator::new(argv(&["cookalong-no-such-program"]));
        assert!(matches!(
            translator.translate("boil", "Hindi"),
            Err(TranslationError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_speaker_reports_lifecycle() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut speaker = CommandSpeaker::new(argv(&["true"]));
        let utterance = Utterance {
            ticket: NarrationTicket(4),
            text: "Boil water.".into(),
            speech_tag: "en-US".into(),
        };

        speaker.speak(&utterance, SpeechNotifier::new(NarrationTicket(4), tx));

        let events: Vec<SpeechEvent> = (0..2)
            .map(|_| match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                RunnerEvent::Speech { ticket, event } => {
                    assert_eq!(ticket, NarrationTicket(4));
                    event
                }
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(events, vec![SpeechEvent::Started, SpeechEvent::Ended]);
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_without_ended_event() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut speaker = CommandSpeaker::new(argv(&["sleep", "5"]));
        let utterance = Utterance {
            ticket: NarrationTicket(1),
            text: String::new(),
            speech_tag: "en-US".into(),
        };

        speaker.speak(&utterance, SpeechNotifier::new(NarrationTicket(1), tx));
        speaker.cancel();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            RunnerEvent::Speech {
                event: SpeechEvent::Started,
                ..
            }
        ));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_utterance_stops_the_first_process() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut speaker = CommandSpeaker::new(argv(&["sleep", "5"]));
        let utterance = Utterance {
            ticket: NarrationTicket(1),
            text: String::new(),
            speech_tag: "en-US".into(),
        };

        speaker.speak(&utterance, SpeechNotifier::new(NarrationTicket(1), tx.clone()));
        let first = Arc::clone(&speaker.current.as_ref().unwrap().child);
        let first_pid = first.lock().unwrap().id();

        speaker.speak(&utterance, SpeechNotifier::new(NarrationTicket(2), tx));

        // Reaped before speak returned, so the status is already known
        assert!(first.lock().unwrap().try_wait().unwrap().is_some());
        if cfg!(target_os = "linux") {
            assert!(!Path::new(&format!("/proc/{}", first_pid)).exists());
        }

        let second = Arc::clone(&speaker.current.as_ref().unwrap().child);
        assert!(second.lock().unwrap().try_wait().unwrap().is_none());

        speaker.cancel();
        assert!(second.lock().unwrap().try_wait().unwrap().is_some());

        let started: Vec<NarrationTicket> = rx
            .try_iter()
            .filter_map(|event| match event {
                RunnerEvent::Speech {
                    ticket,
                    event: SpeechEvent::Started,
                } => Some(ticket),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![NarrationTicket(1), NarrationTicket(2)]);
    }
}
