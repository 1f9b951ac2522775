use async_trait::async_trait;
use finance_coach::chat::run_chat_loop;
use finance_coach::{CompletionClient, CompletionError, Session, Turn};

struct EchoClient;

#[async_trait]
impl CompletionClient for EchoClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let topic = prompt.rsplit(": ").next().unwrap_or_default();
        Ok(format!("  Advice about {}  ", topic).trim().to_string())
    }

    fn model(&self) -> &str {
        "echo"
    }
}

async fn run(session: &mut Session, input: &str) -> String {
    let mut output = Vec::new();
    run_chat_loop(session, &EchoClient, input.as_bytes(), &mut output)
        .await
        .unwrap();
    String::from_utf8(output).unwrap()
}

#[tokio::test]
async fn test_question_line_is_submitted() {
    let mut session = Session::new();
    let output = run(&mut session, "How do I save for retirement?\n").await;

    assert!(output.contains("Coach: Advice about How do I save for retirement?"));
    assert_eq!(
        session.turns(),
        &[
            Turn::user("How do I save for retirement?"),
            Turn::coach("Advice about How do I save for retirement?")
        ]
    );
}

#[tokio::test]
async fn test_empty_line_submits_selected_topic() {
    let mut session = Session::with_topic("Budget Planning");
    let output = run(&mut session, "/topic Emergency Fund\n\n").await;

    assert!(output.contains("Input set to: Emergency Fund"));
    assert_eq!(session.turns()[0], Turn::user("Emergency Fund"));
    assert_eq!(session.turns().len(), 2);
}

#[tokio::test]
async fn test_reset_and_quit() {
    let mut session = Session::new();
    let output = run(&mut session, "Credit Score\n/reset\n/quit\nRetirement Planning\n").await;

    assert!(output.contains("Chat reset."));
    // Nothing after /quit is processed.
    assert!(!output.contains("Retirement Planning"));
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_unknown_topic() {
    let mut session = Session::new();
    let output = run(&mut session, "/topic Crypto\n").await;
    assert!(output.contains("Unknown topic"));
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_topic_prefix_in_free_text_is_a_question() {
    let mut session = Session::new();
    let output = run(&mut session, "/topical budget\n").await;

    assert!(!output.contains("Unknown topic"));
    assert_eq!(session.turns()[0], Turn::user("/topical budget"));
    assert_eq!(session.turns().len(), 2);
}
