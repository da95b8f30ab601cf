use super::*;
use crate::embeddings::Embedder;
use crate::store::{ChunkId, KnowledgeBase};
use crate::RagError;
use std::sync::Mutex;

struct FixedEmbedder(Vec<f32>);

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Replies with a canned answer and remembers the prompts it saw
struct RecordingGenerator {
    reply: String,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("lock is not poisoned").clone()
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.seen
            .lock()
            .expect("lock is not poisoned")
            .push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(RagError::Remote("HTTP 503".to_string()))
    }
}

fn retriever(entries: &[(&str, [f32; 2])], query: [f32; 2]) -> Retriever {
    let mut kb = KnowledgeBase::new(2).expect("should create knowledge base");
    for (text, vector) in entries {
        kb.insert(*text, vector).expect("should insert chunk");
    }
    Retriever::new(Arc::new(FixedEmbedder(query.to_vec())), Arc::new(kb))
}

#[test]
fn prompt_is_a_single_user_message() {
    let messages = build_grounded_prompt(["first chunk", "second chunk"], "What is required?");

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    let content = &messages[0].content;
    assert!(content.contains("using only the provided context"));
    assert!(content.contains("**Act names, section numbers, and subsections**"));
    assert!(content.contains(NO_REFERENCE_FALLBACK));
    assert!(content.contains("Context:\nfirst chunk\n\nsecond chunk\n\n"));
    assert!(content.contains("Question: What is required?"));
    assert!(content.ends_with("Answer clearly, with references:"));
}

#[test]
fn context_is_ordered_most_similar_first() {
    let generator = RecordingGenerator::new("ok");
    let answerer = Answerer::new(
        retriever(
            &[("far chunk", [10.0, 10.0]), ("near chunk", [1.0, 0.0])],
            [1.0, 0.0],
        ),
        Arc::clone(&generator) as Arc<dyn Generator>,
        2,
    );

    answerer.answer("question").expect("answer succeeds");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    let content = &prompts[0][0].content;
    let near = content.find("near chunk").expect("near chunk in prompt");
    let far = content.find("far chunk").expect("far chunk in prompt");
    assert!(near < far);
}

#[test]
fn fallback_reply_is_returned_verbatim() {
    let generator = RecordingGenerator::new(&format!("  {}\n", NO_REFERENCE_FALLBACK));
    let answerer = Answerer::new(
        retriever(
            &[("Brokers should be polite to clients.", [0.0, 1.0])],
            [0.0, 1.0],
        ),
        generator,
        3,
    );

    let grounded = answerer.ask("Which section covers politeness?").expect("ask succeeds");

    assert_eq!(grounded.answer, NO_REFERENCE_FALLBACK);
    assert!(grounded.is_fallback());
    assert!(grounded.citations.is_empty());
    assert_eq!(grounded.sources.len(), 1);
}

#[test]
fn ask_reports_sources_and_citations() {
    let generator = RecordingGenerator::new("Under section 4 of the Condominium Act, 1998 ...");
    let answerer = Answerer::new(
        retriever(
            &[
                ("Section 4 of the Condominium Act, 1998 sets out disclosure.", [1.0, 0.0]),
                ("Unrelated text about parking.", [0.0, 5.0]),
            ],
            [1.0, 0.0],
        ),
        generator,
        1,
    );

    let grounded = answerer.ask("Disclosure?").expect("ask succeeds");

    assert_eq!(grounded.sources.len(), 1);
    assert_eq!(grounded.sources[0].id, ChunkId(0));
    assert!(!grounded.is_fallback());
    assert_eq!(grounded.citations.len(), 2);
    assert_eq!(grounded.citations[0].to_string(), "Condominium Act, 1998");
    assert_eq!(grounded.citations[1].to_string(), "s. 4");
}

#[test]
fn generation_failure_is_surfaced() {
    let answerer = Answerer::new(
        retriever(&[("text", [0.0, 0.0])], [0.0, 0.0]),
        Arc::new(FailingGenerator),
        3,
    );

    let err = answerer.answer("anything").expect_err("generator fails");
    assert!(err.is_retryable());
}

#[test]
fn empty_query_never_reaches_generator() {
    let generator = RecordingGenerator::new("unused");
    let answerer = Answerer::new(
        retriever(&[("text", [0.0, 0.0])], [0.0, 0.0]),
        Arc::clone(&generator) as Arc<dyn Generator>,
        3,
    );

    let result = answerer.answer("  ");
    assert!(matches!(result, Err(RagError::EmptyInput(_))));
    assert!(generator.prompts().is_empty());
}

#[test]
fn chat_message_serializes_lowercase_role() {
    let json = serde_json::to_string(&ChatMessage::user("hi")).expect("serializes");
    assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
}
