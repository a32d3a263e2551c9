//! End-to-end worker scenarios with in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use jarvis::agent::AgentClient;
use jarvis::command::CommandKeywords;
use jarvis::config::RepliesConfig;
use jarvis::error::{AgentError, AssistantError, Result};
use jarvis::pipeline::inbox::{self, ShutdownListener};
use jarvis::pipeline::messages::{AudioPayload, ChannelRef, MessageContent, MessageSource};
use jarvis::pipeline::router::{ChatSender, Display, ErrorChime, Speaker};
use jarvis::pipeline::{AssistantMessage, Router, Worker, WorkerExit};
use jarvis::stt::Transcriber;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

struct FakeAgent {
    log: Log,
    outcome: fn(&str) -> std::result::Result<String, AgentError>,
}

impl AgentClient for FakeAgent {
    fn ask(&mut self, message: &str) -> std::result::Result<String, AgentError> {
        push(&self.log, format!("ask:{message}"));
        (self.outcome)(message)
    }

    fn reset_session(&mut self) {
        push(&self.log, "reset_session".to_owned());
    }
}

struct FakeTranscriber {
    log: Log,
    text: &'static str,
}

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, _audio: &AudioPayload) -> Result<String> {
        push(&self.log, "transcribe".to_owned());
        Ok(self.text.to_owned())
    }
}

struct FakeDisplay(Log);

impl Display for FakeDisplay {
    fn user_input(&self, source: MessageSource, text: &str) {
        push(&self.0, format!("input:{source}:{text}"));
    }
    fn reply(&self, source: MessageSource, text: &str) {
        push(&self.0, format!("display:{source}:{text}"));
    }
    fn notice(&self, text: &str) {
        push(&self.0, format!("notice:{text}"));
    }
}

struct FakeSpeaker(Log);

impl Speaker for FakeSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        push(&self.0, format!("speak:{text}"));
        Ok(())
    }
}

struct FakeChat(Log);

impl ChatSender for FakeChat {
    fn send(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        push(&self.0, format!("chat:{}:{text}", channel.room_id));
        Ok(())
    }
}

struct BrokenChat;

impl ChatSender for BrokenChat {
    fn send(&self, _channel: &ChannelRef, _text: &str) -> Result<()> {
        Err(AssistantError::Delivery("homeserver unreachable".to_owned()))
    }
}

struct FakeChime(Log);

impl ErrorChime for FakeChime {
    fn chime(&self) {
        push(&self.0, "chime".to_owned());
    }
}

fn echo(message: &str) -> std::result::Result<String, AgentError> {
    Ok(format!("reply to {message}"))
}

fn worker(log: &Log, outcome: fn(&str) -> std::result::Result<String, AgentError>) -> Worker {
    let router = Router::new(Arc::new(FakeDisplay(log.clone())))
        .with_speaker(Box::new(FakeSpeaker(log.clone())))
        .with_chat(Box::new(FakeChat(log.clone())))
        .with_chime(Box::new(FakeChime(log.clone())));
    Worker::new(
        Box::new(FakeAgent {
            log: log.clone(),
            outcome,
        }),
        router,
        CommandKeywords::default(),
        RepliesConfig::default(),
    )
}

fn room() -> ChannelRef {
    ChannelRef {
        room_id: "!room:example.org".to_owned(),
        sender: "@alice:example.org".to_owned(),
        event_id: "$event".to_owned(),
    }
}

fn drain(mut worker: Worker, messages: Vec<AssistantMessage>) -> WorkerExit {
    let (tx, inbox) = inbox::channel();
    for message in messages {
        tx.send(message).unwrap();
    }
    drop(tx);
    worker.run(&inbox, &ShutdownListener::never())
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn spoken_cancel_is_acknowledged_by_voice_only() {
    let log = Log::default();
    let worker = worker(&log, echo).with_transcriber(Box::new(FakeTranscriber {
        log: log.clone(),
        text: "Stopp",
    }));
    let exit = drain(
        worker,
        vec![AssistantMessage::voice(AudioPayload::pcm16(vec![0; 3200], 16_000, 1))],
    );
    assert_eq!(exit, WorkerExit::Disconnected);

    let entries = entries(&log);
    let cancelled = RepliesConfig::default().cancelled;
    assert_eq!(
        entries,
        vec![
            "transcribe".to_owned(),
            "input:voice:Stopp".to_owned(),
            format!("display:voice:{cancelled}"),
            format!("speak:{cancelled}"),
        ]
    );
    assert!(!entries.iter().any(|e| e.starts_with("ask:") || e.starts_with("chat:")));
}

#[test]
fn chat_reset_resets_session_and_replies_to_room() {
    let log = Log::default();
    let exit = drain(
        worker(&log, echo),
        vec![AssistantMessage::chat(MessageContent::Text("Reset".to_owned()), room())],
    );
    assert_eq!(exit, WorkerExit::Disconnected);

    let entries = entries(&log);
    let reset = RepliesConfig::default().reset;
    assert!(entries.contains(&"reset_session".to_owned()));
    assert!(entries.contains(&format!("display:chat:{reset}")));
    assert!(entries.contains(&format!("chat:!room:example.org:{reset}")));
    assert!(!entries.iter().any(|e| e.starts_with("ask:") || e.starts_with("speak:")));
}

#[test]
fn keyboard_message_completes_before_voice_transcription_starts() {
    let log = Log::default();
    let worker = worker(&log, echo).with_transcriber(Box::new(FakeTranscriber {
        log: log.clone(),
        text: "what time is it",
    }));
    drain(
        worker,
        vec![
            AssistantMessage::keyboard("hello"),
            AssistantMessage::voice(AudioPayload::pcm16(vec![0; 3200], 16_000, 1)),
        ],
    );

    let entries = entries(&log);
    let position = |needle: &str| entries.iter().position(|e| e == needle).unwrap();
    let keyboard_reply = position("display:keyboard:reply to hello");
    assert!(position("ask:hello") < keyboard_reply);
    assert!(keyboard_reply < position("transcribe"));
    assert!(position("transcribe") < position("ask:what time is it"));
    assert!(entries.contains(&"speak:reply to what time is it".to_owned()));
}

#[test]
fn timeout_yields_timeout_reply_and_loop_continues() {
    let log = Log::default();
    let exit = drain(
        worker(&log, |message| {
            if message == "slow" {
                Err(AgentError::Timeout(Duration::from_secs(120)))
            } else {
                echo(message)
            }
        }),
        vec![
            AssistantMessage::keyboard("slow"),
            AssistantMessage::keyboard("fast"),
        ],
    );
    assert_eq!(exit, WorkerExit::Disconnected);

    let entries = entries(&log);
    let replies = RepliesConfig::default();
    assert!(entries.contains(&format!("display:keyboard:{}", replies.timeout)));
    assert!(!entries.contains(&format!("display:keyboard:{}", replies.failure)));
    assert!(entries.contains(&"display:keyboard:reply to fast".to_owned()));
}

#[test]
fn agent_failure_yields_failure_reply() {
    let log = Log::default();
    drain(
        worker(&log, |_| Err(AgentError::EmptyOutput)),
        vec![AssistantMessage::keyboard("hi")],
    );
    let failure = RepliesConfig::default().failure;
    assert!(entries(&log).contains(&format!("display:keyboard:{failure}")));
}

#[test]
fn cancelled_call_produces_no_reply() {
    let log = Log::default();
    drain(
        worker(&log, |_| Err(AgentError::Cancelled)),
        vec![AssistantMessage::keyboard("long question")],
    );
    let entries = entries(&log);
    assert!(entries.contains(&"ask:long question".to_owned()));
    assert!(!entries.iter().any(|e| e.starts_with("display:")));
}

#[test]
fn restart_is_acknowledged_before_exit() {
    let log = Log::default();
    let exit = drain(
        worker(&log, echo),
        vec![
            AssistantMessage::keyboard("neustart"),
            AssistantMessage::keyboard("never processed"),
        ],
    );
    assert_eq!(exit, WorkerExit::Restart);
    let entries = entries(&log);
    let restart = RepliesConfig::default().restart;
    assert_eq!(entries.last().unwrap(), &format!("display:keyboard:{restart}"));
    assert!(!entries.iter().any(|e| e.contains("never processed")));
}

#[test]
fn chat_audio_transcript_is_quoted_back() {
    let log = Log::default();
    let worker = worker(&log, echo).with_transcriber(Box::new(FakeTranscriber {
        log: log.clone(),
        text: "Wie wird das Wetter?",
    }));
    drain(
        worker,
        vec![AssistantMessage::chat(
            MessageContent::Audio(AudioPayload::encoded(vec![1, 2, 3], "note.ogg")),
            room(),
        )],
    );
    let entries = entries(&log);
    let prefix = RepliesConfig::default().transcript_prefix;
    let quote = format!("chat:!room:example.org:{prefix}Wie wird das Wetter?");
    let reply = "chat:!room:example.org:reply to Wie wird das Wetter?".to_owned();
    let position = |needle: &String| entries.iter().position(|e| e == needle).unwrap();
    assert!(position(&quote) < position(&reply));
}

#[test]
fn audio_without_transcriber_is_reported() {
    let log = Log::default();
    drain(
        worker(&log, echo),
        vec![AssistantMessage::voice(AudioPayload::pcm16(vec![0; 3200], 16_000, 1))],
    );
    let failed = RepliesConfig::default().transcription_failed;
    let entries = entries(&log);
    assert!(entries.contains(&format!("speak:{failed}")));
    assert!(!entries.iter().any(|e| e.starts_with("ask:")));
}

#[test]
fn chat_delivery_failure_is_shown_and_worker_continues() {
    let log = Log::default();
    let router = Router::new(Arc::new(FakeDisplay(log.clone())))
        .with_chat(Box::new(BrokenChat))
        .with_chime(Box::new(FakeChime(log.clone())));
    let worker = Worker::new(
        Box::new(FakeAgent {
            log: log.clone(),
            outcome: echo,
        }),
        router,
        CommandKeywords::default(),
        RepliesConfig::default(),
    );
    let exit = drain(
        worker,
        vec![
            AssistantMessage::chat(MessageContent::Text("first".to_owned()), room()),
            AssistantMessage::keyboard("second"),
        ],
    );
    assert_eq!(exit, WorkerExit::Disconnected);
    let entries = entries(&log);
    assert!(entries.contains(&"display:chat:reply to first".to_owned()));
    assert!(entries.iter().any(|e| e.starts_with("notice:") && e.contains("homeserver unreachable")));
    assert!(entries.contains(&"display:keyboard:reply to second".to_owned()));
}

#[test]
fn whitespace_only_input_is_dropped_silently() {
    let log = Log::default();
    drain(worker(&log, echo), vec![AssistantMessage::keyboard("  \n ")]);
    assert!(entries(&log).is_empty());
}

struct PanickingSpeaker;

impl Speaker for PanickingSpeaker {
    fn speak(&self, _text: &str) -> Result<()> {
        panic!("audio device vanished");
    }
}

#[test]
fn panicking_speaker_does_not_stop_the_loop() {
    let log = Log::default();
    let router = Router::new(Arc::new(FakeDisplay(log.clone())))
        .with_speaker(Box::new(PanickingSpeaker))
        .with_chime(Box::new(FakeChime(log.clone())));
    let worker = Worker::new(
        Box::new(FakeAgent {
            log: log.clone(),
            outcome: echo,
        }),
        router,
        CommandKeywords::default(),
        RepliesConfig::default(),
    )
    .with_transcriber(Box::new(FakeTranscriber {
        log: log.clone(),
        text: "hallo",
    }));

    let exit = drain(
        worker,
        vec![
            AssistantMessage::voice(AudioPayload::pcm16(vec![0; 3200], 16_000, 1)),
            AssistantMessage::keyboard("next"),
        ],
    );
    assert_eq!(exit, WorkerExit::Disconnected);

    let entries = entries(&log);
    let failure = RepliesConfig::default().failure;
    let position = |needle: &str| entries.iter().position(|e| e == needle).unwrap();
    assert!(position("display:voice:reply to hallo") < position(&format!("display:voice:{failure}")));
    assert!(position(&format!("display:voice:{failure}")) < position("chime"));
    assert!(position("chime") < position("ask:next"));
    assert!(entries.contains(&"display:keyboard:reply to next".to_owned()));
}
