use async_trait::async_trait;
use finance_coach::chat::build_prompt;
use finance_coach::{ChatState, CompletionClient, CompletionError, Session, Speaker, SubmitRejected, Turn};
use std::sync::Mutex;

/// Replies with a fixed text (or fails) and records every prompt it sees.
struct ScriptedClient {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Some(text) => Ok(text.trim().to_string()),
            None => Err(CompletionError::Api {
                status: 429,
                message: "quota exceeded".to_string(),
            }),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn test_submit_appends_user_then_coach() {
    let client = ScriptedClient::replying("  Start with an emergency fund...\n");
    let mut session = Session::new();
    session.set_input("How do I save for retirement?");

    session.submit(&client).await.unwrap();

    let turns = session.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], Turn::user("How do I save for retirement?"));
    assert_eq!(turns[1], Turn::coach("Start with an emergency fund..."));
    assert_eq!(
        client.prompts(),
        vec![build_prompt("How do I save for retirement?")]
    );
}

#[tokio::test]
async fn test_every_submit_adds_exactly_two_turns() {
    let client = ScriptedClient::replying("Keep a budget.");
    let mut session = Session::new();

    for (i, question) in ["Budget Planning", "a", "  ", "Crédit 💳 <script>"].iter().enumerate() {
        session.set_input(*question);
        session.submit(&client).await.unwrap();
        assert_eq!(session.turns().len(), (i + 1) * 2);

        let last_two = &session.turns()[session.turns().len() - 2..];
        assert_eq!(last_two[0].speaker(), Speaker::User);
        assert_eq!(last_two[0].text(), *question);
        assert_eq!(last_two[1].speaker(), Speaker::Coach);
    }
}

#[tokio::test]
async fn test_empty_submit_leaves_transcript_unchanged() {
    let client = ScriptedClient::replying("unused");
    let mut session = Session::new();
    session.set_input("Expense Tracking");
    session.submit(&client).await.unwrap();

    session.set_input("");
    assert_eq!(session.submit(&client).await, Err(SubmitRejected::EmptyInput));
    assert_eq!(session.turns().len(), 2);
    assert_eq!(client.prompts().len(), 1);
}

#[tokio::test]
async fn test_failure_becomes_error_turn() {
    let client = ScriptedClient::failing();
    let mut session = Session::new();
    session.set_input("tax tips");

    session.submit(&client).await.unwrap();

    let turns = session.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], Turn::user("tax tips"));
    assert_eq!(turns[1].speaker(), Speaker::Coach);
    assert!(turns[1].text().starts_with("Error: "));
    assert!(turns[1].text().contains("quota exceeded"));
    assert_eq!(session.state(), ChatState::AwaitingInput);
}

#[tokio::test]
async fn test_reset_empties_regardless_of_size() {
    let client = ScriptedClient::replying("ok");
    let mut session = Session::new();

    session.reset();
    assert!(session.transcript().is_empty());

    for _ in 0..5 {
        session.set_input("Savings Strategy");
        session.submit(&client).await.unwrap();
    }
    assert_eq!(session.turns().len(), 10);

    session.reset();
    assert!(session.transcript().is_empty());
    assert_eq!(session.input(), "");
    assert_eq!(session.state(), ChatState::Idle);
}

#[tokio::test]
async fn test_select_topic_prefills_until_submit() {
    let client = ScriptedClient::replying("Snowball or avalanche.");
    let mut session = Session::new();

    session.select_topic("Debt Repayment");
    assert_eq!(session.input(), "Debt Repayment");
    assert!(session.transcript().is_empty());
    assert!(client.prompts().is_empty());

    session.submit(&client).await.unwrap();
    assert_eq!(session.turns()[0], Turn::user("Debt Repayment"));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let client = ScriptedClient::replying("Diversify.");
    let mut alice = Session::new();
    let mut bob = Session::new();

    alice.set_input("Investment Options");
    bob.set_input("Investment Options");
    alice.submit(&client).await.unwrap();

    assert_eq!(alice.turns().len(), 2);
    assert!(bob.transcript().is_empty());

    bob.submit(&client).await.unwrap();
    alice.reset();
    assert!(alice.transcript().is_empty());
    assert_eq!(bob.turns().len(), 2);
}

#[tokio::test]
async fn test_late_completion_after_reset_is_dropped() {
    let client = ScriptedClient::replying("Pay your card in full.");
    let mut session = Session::with_topic("Credit Score");

    let pending = session.begin_submit().unwrap();
    assert_eq!(session.state(), ChatState::Submitting);
    let result = client.complete(pending.prompt()).await;

    session.reset();
    assert!(!session.finish_submit(pending, result));
    assert!(session.transcript().is_empty());

    // The session is usable again afterwards.
    session.select_topic("Credit Score");
    session.submit(&client).await.unwrap();
    assert_eq!(session.turns().len(), 2);
}
