// WebSocket messages exchanged with the browser UI.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatState, PendingSubmission, Session, SubmitRejected};
use crate::transcript::Turn;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SelectTopic { topic: String },
    SetInput { text: String },
    /// `text`, when present, replaces the pending input before submitting.
    Submit {
        #[serde(default)]
        text: Option<String>,
    },
    Reset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent<'a> {
    /// Full view of the session; the UI re-renders from it.
    Snapshot {
        state: ChatState,
        input: &'a str,
        topic: Option<&'a str>,
        turns: &'a [Turn],
    },
    Rejected { reason: SubmitRejected },
    Error { message: String },
}

impl<'a> ServerEvent<'a> {
    pub fn snapshot(session: &'a Session) -> Self {
        ServerEvent::Snapshot {
            state: session.state(),
            input: session.input(),
            topic: session.topic(),
            turns: session.turns(),
        }
    }
}

pub fn parse_client_event(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// What the connection has to do after an event was applied to its session.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Send a fresh snapshot.
    Render,
    /// Nothing to send; the browser already shows the change.
    Quiet,
    /// Start the remote call, then send a snapshot showing `Submitting`.
    Dispatch(PendingSubmission),
    Rejected(SubmitRejected),
}

pub fn apply_client_event(session: &mut Session, event: ClientEvent) -> Outcome {
    match event {
        ClientEvent::SelectTopic { topic } => {
            session.select_topic(topic);
            Outcome::Render
        }
        ClientEvent::SetInput { text } => {
            session.set_input(text);
            Outcome::Quiet
        }
        ClientEvent::Submit { text } => {
            if let Some(text) = text {
                session.set_input(text);
            }
            match session.begin_submit() {
                Ok(pending) => Outcome::Dispatch(pending),
                Err(reason) => Outcome::Rejected(reason),
            }
        }
        ClientEvent::Reset => {
            session.reset();
            Outcome::Render
        }
    }
}
