use super::*;

#[test]
fn records_turns_in_order() {
    let mut conversation = Conversation::new();
    assert!(conversation.is_empty());

    conversation.push_user("Do brokers need to register?");
    conversation.push_assistant("Yes, under section 4 of the Act.");

    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.messages()[0].role, Role::User);
    assert_eq!(conversation.messages()[1].role, Role::Assistant);
    assert!(conversation.messages()[0].timestamp <= conversation.messages()[1].timestamp);
}

#[test]
fn history_lines_carry_speaker_and_time() {
    let mut conversation = Conversation::new();
    let question = conversation.push_user("What is a trust account?").clone();
    conversation.push_assistant("An account held for clients.");

    let history = conversation.render_history();
    let lines: Vec<&str> = history.lines().collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        format!(
            "[{}] You: What is a trust account?",
            question.timestamp.format("%H:%M:%S")
        )
    );
    assert!(lines[1].ends_with("] Chatbot: An account held for clients."));
}

#[test]
fn empty_history_renders_nothing() {
    assert_eq!(Conversation::new().render_history(), "");
}

#[test]
fn discards_only_unanswered_questions() {
    let mut conversation = Conversation::new();
    conversation.push_user("first");
    conversation.push_assistant("answer");
    assert_eq!(conversation.discard_unanswered(), None);

    conversation.push_user("stale question");
    let dropped = conversation.discard_unanswered().expect("user message dropped");
    assert_eq!(dropped.content, "stale question");
    assert_eq!(conversation.len(), 2);
}

#[test]
fn messages_serialize_with_timestamps() {
    let message = Message::new(Role::Assistant, "hello");
    let json = serde_json::to_string(&message).expect("serializes");
    assert!(json.contains("\"role\":\"assistant\""));
    assert!(json.contains("\"timestamp\""));

    let parsed: Message = serde_json::from_str(&json).expect("parses");
    assert_eq!(parsed, message);
}
