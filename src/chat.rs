// Conversation loop shared by the web UI and the terminal chat.
//
// A `Session` owns exactly one transcript. Submitting is split into
// `begin_submit` / `finish_submit` so the remote call can run without holding
// the session, while the `Submitting` state stays visible to callers.

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::constants;
use crate::llm_interaction::{CompletionClient, CompletionError};
use crate::transcript::{Transcript, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Idle,
    AwaitingInput,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRejected {
    #[error("input is empty")]
    EmptyInput,
    #[error("a request is already in progress")]
    Busy,
}

/// Composes the coach prompt. The user text is embedded verbatim.
pub fn build_prompt(user_msg: &str) -> String {
    format!("{}{}", constants::PROMPT_PREFIX, user_msg)
}

/// Formats a completion failure as the coach's reply.
pub fn error_reply(err: &CompletionError) -> String {
    format!("Error: {}", err)
}

/// A submission that left the session and is waiting for its completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    id: u64,
    user_text: String,
    prompt: String,
}

impl PendingSubmission {
    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[derive(Debug, Default)]
pub struct Session {
    transcript: Transcript,
    input: String,
    topic: Option<String>,
    in_flight: Option<u64>,
    // Request abandoned by a reset that has not come back yet.
    draining: Option<u64>,
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with `topic` already selected and pre-filled.
    pub fn with_topic(topic: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.select_topic(topic);
        session
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn turns(&self) -> &[Turn] {
        self.transcript.all()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn state(&self) -> ChatState {
        if self.in_flight.is_some() {
            ChatState::Submitting
        } else if self.input.is_empty() {
            ChatState::Idle
        } else {
            ChatState::AwaitingInput
        }
    }

    /// Pre-fills the input with the topic. Never touches the transcript.
    pub fn select_topic(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        self.input = topic.clone();
        self.topic = Some(topic);
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn begin_submit(&mut self) -> Result<PendingSubmission, SubmitRejected> {
        if self.in_flight.is_some() || self.draining.is_some() {
            return Err(SubmitRejected::Busy);
        }
        if self.input.is_empty() {
            return Err(SubmitRejected::EmptyInput);
        }

        self.next_id += 1;
        self.in_flight = Some(self.next_id);
        debug!(submission = self.next_id, "Submission started");
        Ok(PendingSubmission {
            id: self.next_id,
            user_text: self.input.clone(),
            prompt: build_prompt(&self.input),
        })
    }

    /// Records the outcome of `pending` as a User turn followed by a Coach turn.
    ///
    /// Returns `false` and appends nothing when the session was reset while
    /// the request was outstanding. The session accepts a new submission
    /// only once that abandoned request has been finished here.
    pub fn finish_submit(
        &mut self,
        pending: PendingSubmission,
        result: Result<String, CompletionError>,
    ) -> bool {
        if self.draining == Some(pending.id) {
            self.draining = None;
        }
        if self.in_flight != Some(pending.id) {
            info!(submission = pending.id, "Dropping completion for a reset session");
            return false;
        }
        self.in_flight = None;

        let reply = match result {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Completion failed");
                error_reply(&e)
            }
        };

        self.transcript.append(Turn::user(pending.user_text));
        self.transcript.append(Turn::coach(reply));
        true
    }

    /// Runs one full round trip against `client`.
    pub async fn submit(&mut self, client: &dyn CompletionClient) -> Result<(), SubmitRejected> {
        let pending = self.begin_submit()?;
        let result = client.complete(pending.prompt()).await;
        self.finish_submit(pending, result);
        Ok(())
    }

    /// Empties the transcript and discards pending input, from any state.
    ///
    /// An outstanding request keeps running; until it is finished, submits
    /// are answered with `Busy`.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.input.clear();
        if let Some(id) = self.in_flight.take() {
            self.draining = Some(id);
        }
    }
}

const CHAT_HELP: &str = "Type a question and press Enter. An empty line submits the current input.\n\
Commands: /topics, /topic <number or name>, /reset, /quit";

/// Line-based chat over arbitrary async I/O.
pub async fn run_chat_loop<R, W>(
    session: &mut Session,
    client: &dyn CompletionClient,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    writer.write_all(format!("{}\n{}\n", constants::PAGE_TITLE, CHAT_HELP).as_bytes()).await?;
    if !session.input().is_empty() {
        writer.write_all(format!("Current input: {}\n", session.input()).as_bytes()).await?;
    }
    writer.flush().await?;

    while let Some(line) = lines.next_line().await.context("Failed to read chat input")? {
        let line = line.trim_end_matches('\r');
        let output = match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                "Chat reset.\n".to_string()
            }
            "/topics" => constants::TOPICS
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{:>2}. {}\n", i + 1, t))
                .collect(),
            cmd if cmd == "/topic" || cmd.starts_with("/topic ") => match resolve_topic(cmd["/topic".len()..].trim()) {
                Some(topic) => {
                    session.select_topic(topic);
                    format!("Input set to: {}\n", topic)
                }
                None => "Unknown topic. Use /topics to list them.\n".to_string(),
            },
            _ => {
                if !line.is_empty() {
                    session.set_input(line);
                }
                if !session.input().is_empty() {
                    writer.write_all("Thinking…\n".as_bytes()).await?;
                    writer.flush().await?;
                }
                match session.submit(client).await {
                    Ok(()) => session
                        .turns()
                        .last()
                        .map(|t| format!("{}: {}\n", t.speaker(), t.text()))
                        .unwrap_or_default(),
                    Err(reason) => format!("Nothing to send ({}).\n", reason),
                }
            }
        };
        writer.write_all(output.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn resolve_topic(arg: &str) -> Option<&'static str> {
    if let Ok(n) = arg.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| constants::TOPICS.get(i)).copied();
    }
    constants::TOPICS
        .iter()
        .find(|t| t.eq_ignore_ascii_case(arg))
        .copied()
}

/// Interactive chat on stdin/stdout.
pub async fn run_terminal_chat(client: &dyn CompletionClient) -> Result<()> {
    info!(model = client.model(), "Starting terminal chat session...");
    let mut session = Session::with_topic(constants::default_topic());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_chat_loop(&mut session, client, stdin, tokio::io::stdout()).await
}
