pub mod chat;
pub mod constants;
pub mod events;
pub mod llm_interaction;
pub mod transcript;
pub mod web_server;

pub use chat::{ChatState, Session, SubmitRejected};
pub use llm_interaction::{CompletionClient, CompletionError, GeminiClient};
pub use transcript::{Speaker, Transcript, Turn};
