// Grounded answer generation
// Builds the single-message prompt from retrieved context and calls the generator

#[cfg(test)]
mod tests;

use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;
use crate::citations::{Citation, extract_all};
use crate::retrieval::Retriever;
use crate::store::ScoredChunk;

/// Reply the model is told to give when the context names no Act or section
pub const NO_REFERENCE_FALLBACK: &str = "No specific section or Act was found for this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Produces a completion for a list of chat messages
pub trait Generator: Send + Sync {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

impl<T: Generator + ?Sized> Generator for Arc<T> {
    #[inline]
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        (**self).generate(messages)
    }
}

/// Build the one user message sent for a question.
///
/// `context` is ordered most similar first and joined with blank lines.
#[inline]
pub fn build_grounded_prompt<'a, I>(context: I, question: &str) -> Vec<ChatMessage>
where
    I: IntoIterator<Item = &'a str>,
{
    let context = context.into_iter().join("\n\n");
    let content = format!(
        "You are a legal assistant specialized in Ontario real estate law.\n\n\
         Answer the user's question using only the provided context.\n\
         Always include the **Act names, section numbers, and subsections** exactly as they appear in the context.\n\
         If the context does not contain such references, say: \"{}\"\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer clearly, with references:",
        NO_REFERENCE_FALLBACK, context, question
    );
    vec![ChatMessage::user(content)]
}

/// An answer together with the chunks it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedAnswer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    /// References found in the sources, in order of first appearance
    pub citations: Vec<Citation>,
}

impl GroundedAnswer {
    /// Whether the model replied with the no-reference fallback
    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.answer.contains(NO_REFERENCE_FALLBACK)
    }
}

/// Retrieves context for a question and asks the generator once.
///
/// Holds no conversation state; every call is independent.
#[derive(Clone)]
pub struct Answerer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl Answerer {
    #[inline]
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    #[inline]
    pub const fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn answer(&self, query: &str) -> Result<String> {
        self.ask(query).map(|grounded| grounded.answer)
    }

    #[inline]
    pub fn ask(&self, query: &str) -> Result<GroundedAnswer> {
        let sources = self.retriever.retrieve_scored(query, self.top_k)?;
        debug!(
            "Answering with {} context chunks: {:?}",
            sources.len(),
            sources.iter().map(|s| s.id).collect::<Vec<_>>()
        );

        let messages = build_grounded_prompt(sources.iter().map(|s| s.text.as_str()), query);
        let answer = self.generator.generate(&messages)?.trim().to_string();
        let citations = extract_all(sources.iter().map(|s| s.text.as_str()));

        info!(
            "Answered question using {} chunks and {} citations",
            sources.len(),
            citations.len()
        );
        Ok(GroundedAnswer {
            answer,
            sources,
            citations,
        })
    }
}
