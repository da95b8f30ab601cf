use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::answer::{Answerer, GroundedAnswer};
use crate::chunking::read_chunks;
use crate::config::Config;
use crate::conversation::Conversation;
use crate::embeddings::Embedder;
use crate::indexer::{Indexer, IndexingStats, chunk_source_file, indexer_lock_held};
use crate::remote::RemoteClient;
use crate::retrieval::Retriever;
use crate::store::{KnowledgeBase, KnowledgeBasePaths};

/// Split a plain-text statute into chunks and write `chunks.jsonl`
#[inline]
pub fn chunk_document(config_dir: &Path, source: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let data_dir = config.data_path();

    let chunks = chunk_source_file(source, &data_dir, &config.chunking)
        .with_context(|| format!("Failed to chunk {}", source.display()))?;

    println!(
        "✅ Wrote {} chunks to {}",
        chunks.len(),
        style(KnowledgeBasePaths::new(&data_dir).chunks.display()).cyan()
    );
    println!(
        "   {} words per chunk, {} shared with the next",
        config.chunking.max_length, config.chunking.overlap
    );
    println!("Use 'statute-rag index' to embed them.");

    Ok(())
}

/// Embed the chunks (optionally re-chunking `source` first) and save the knowledge base
#[inline]
pub async fn build_index(config_dir: &Path, source: Option<&Path>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let client = RemoteClient::new(&config).context("Failed to create model service client")?;

    if let Err(e) = client.ping() {
        warn!("Model service is not responding: {}", e);
        println!(
            "{}",
            style(format!(
                "⚠️  Model service at {} is not responding; failed chunks will be reported",
                client.base_url()
            ))
            .yellow()
        );
    }

    let indexer = Indexer::from_config(Arc::new(client), &config)?;
    let stats = match source {
        Some(source) => indexer.index_source(source).await,
        None => indexer.index_existing_chunks().await,
    }
    .context("Indexing failed")?;

    print_stats(&stats, indexer.data_dir());
    Ok(())
}

fn print_stats(stats: &IndexingStats, data_dir: &Path) {
    println!("✅ Knowledge base saved to {}", style(data_dir.display()).cyan());
    println!("   📄 Chunks: {}", stats.chunks);
    println!("   🧮 Embedded: {}", stats.embedded);
    if stats.substituted.is_empty() {
        println!("   ⏱  Duration: {:.1?}", stats.duration);
        return;
    }

    println!(
        "   {} {} chunks stored as zero vectors: {:?}",
        style("⚠️").yellow(),
        stats.substituted.len(),
        stats.substituted
    );
    println!("   ⏱  Duration: {:.1?}", stats.duration);
    println!("Those chunks can never be retrieved. Re-run 'statute-rag index' once the service is healthy.");
}

/// Build the query-time services over the saved knowledge base
fn load_answerer(config: &Config, top_k: Option<usize>) -> Result<Answerer> {
    let mut generation = config.generation.clone();
    if let Some(top_k) = top_k {
        generation.set_top_k(top_k).context("Invalid top-k")?;
    }
    let top_k = generation.top_k;

    let client = Arc::new(
        RemoteClient::new(config).context("Failed to create model service client")?,
    );
    let knowledge_base = KnowledgeBase::load(config.data_path()).with_context(|| {
        format!(
            "Failed to load the knowledge base from {}; run 'statute-rag index' first",
            config.data_path().display()
        )
    })?;

    let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
    let retriever = Retriever::new(embedder, Arc::new(knowledge_base));
    Ok(Answerer::new(retriever, client, top_k))
}

/// Answer one question and print it, optionally with the chunks it used
#[inline]
pub async fn ask_question(
    config_dir: &Path,
    question: String,
    top_k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let answerer = load_answerer(&config, top_k)?;

    let grounded = tokio::task::spawn_blocking(move || answerer.ask(&question))
        .await
        .context("Answer task panicked")?
        .context("Failed to answer question")?;

    println!("{}", grounded.answer);
    if show_context {
        print_context(&grounded);
    }

    Ok(())
}

fn print_context(grounded: &GroundedAnswer) {
    println!();
    println!("{}", style("Sources:").bold().yellow());
    for source in &grounded.sources {
        println!(
            "  {} (distance {:.4})",
            style(source.id).cyan(),
            source.distance
        );
        println!("    {}", style(preview(&source.text)).dim());
    }

    if !grounded.citations.is_empty() {
        println!();
        println!("{}", style("References in sources:").bold().yellow());
        for citation in &grounded.citations {
            println!("  • {}", citation);
        }
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_WORDS: usize = 40;
    let mut words = text.split_whitespace();
    let head: Vec<&str> = words.by_ref().take(PREVIEW_WORDS).collect();
    if words.next().is_some() {
        format!("{} ...", head.join(" "))
    } else {
        head.join(" ")
    }
}

enum ChatEvent {
    Line(Option<String>),
    Answered(std::result::Result<crate::Result<GroundedAnswer>, JoinError>),
}

/// Interactive question loop over stdin
#[inline]
pub async fn run_chat(config_dir: &Path, top_k: Option<usize>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let answerer = load_answerer(&config, top_k)?;

    println!("{}", style("⚖️  Statute assistant").bold().cyan());
    println!("Ask a question, 'history' to review the conversation, 'exit' to leave.");
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation = Conversation::new();
    let mut pending: Option<JoinHandle<crate::Result<GroundedAnswer>>> = None;

    loop {
        let event = match pending.as_mut() {
            Some(handle) => tokio::select! {
                joined = handle => ChatEvent::Answered(joined),
                line = lines.next_line() => ChatEvent::Line(line?),
            },
            None => ChatEvent::Line(lines.next_line().await?),
        };

        match event {
            ChatEvent::Answered(joined) => {
                pending = None;
                match joined {
                    Ok(Ok(grounded)) => {
                        println!("{} {}", style("Chatbot:").bold().green(), grounded.answer);
                        conversation.push_assistant(grounded.answer);
                    }
                    Ok(Err(e)) => {
                        conversation.discard_unanswered();
                        println!("{} {}", style("Error:").bold().red(), e);
                    }
                    Err(e) => {
                        conversation.discard_unanswered();
                        println!("{} answer task failed: {}", style("Error:").bold().red(), e);
                    }
                }
                prompt()?;
            }
            ChatEvent::Line(None) => break,
            ChatEvent::Line(Some(line)) => {
                let input = ChatInput::classify(&line);
                if input.abandons_pending() {
                    abandon(&mut pending, &mut conversation);
                }

                match input {
                    ChatInput::Empty => {}
                    ChatInput::History => {
                        if conversation.is_empty() {
                            println!("{}", style("No messages yet.").dim());
                        } else {
                            println!("{}", conversation.render_history());
                        }
                    }
                    ChatInput::Exit => break,
                    ChatInput::Question(question) => {
                        conversation.push_user(question);
                        let answerer = answerer.clone();
                        let question = question.to_string();
                        pending = Some(tokio::task::spawn_blocking(move || {
                            answerer.ask(&question)
                        }));
                        continue;
                    }
                }

                if pending.is_none() {
                    prompt()?;
                }
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}

/// What a line typed into the chat loop asks for
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Empty,
    Exit,
    History,
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn classify(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Self::Empty
        } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else if line.eq_ignore_ascii_case("history") {
            Self::History
        } else {
            Self::Question(line)
        }
    }

    /// Whether this input drops a question that is still being answered
    const fn abandons_pending(&self) -> bool {
        matches!(self, Self::Exit | Self::Question(_))
    }
}

fn abandon(
    pending: &mut Option<JoinHandle<crate::Result<GroundedAnswer>>>,
    conversation: &mut Conversation,
) {
    if let Some(stale) = pending.take() {
        stale.abort();
        conversation.discard_unanswered();
        info!("Abandoned the previous question");
    }
}

fn prompt() -> Result<()> {
    print!("{} ", style("You:").bold());
    std::io::stdout().flush().context("Failed to flush stdout")
}

/// Show the data directory, its files and the indexer lock
#[inline]
pub fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let data_dir = config.data_path();
    let paths = KnowledgeBasePaths::new(&data_dir);

    println!("{}", style("📊 Statute RAG Status").bold().cyan());
    println!();
    println!("Config file: {}", style(config.config_file_path().display()).dim());
    println!("Data directory: {}", style(data_dir.display()).cyan());
    println!();

    println!("📄 Chunk file:");
    if paths.chunks.exists() {
        match read_chunks(&paths.chunks) {
            Ok(chunks) => println!("   ✅ {} chunks in {}", chunks.len(), paths.chunks.display()),
            Err(e) => println!("   ❌ {} is unreadable: {}", paths.chunks.display(), e),
        }
    } else {
        println!("   📭 Not written yet. Use 'statute-rag chunk <SOURCE>'");
    }

    println!();
    println!("🧮 Knowledge base:");
    for file in [&paths.chunk_texts, &paths.index] {
        let marker = if file.exists() { "✅" } else { "❌" };
        println!("   {} {}", marker, file.display());
    }
    if paths.chunk_texts.exists() && paths.index.exists() {
        match KnowledgeBase::load(&data_dir) {
            Ok(kb) => {
                println!("   Rows: {}", kb.len());
                println!("   Dimension: {}", kb.dimension());
                if kb.dimension() != config.embedding.dimension {
                    println!(
                        "   {} configured embedding dimension is {}; re-run 'statute-rag index'",
                        style("⚠️").yellow(),
                        config.embedding.dimension
                    );
                }
            }
            Err(e) => println!("   ❌ Failed to load: {}", e),
        }
    }

    println!();
    if indexer_lock_held(&data_dir) {
        println!("🔄 An indexer is currently running in this data directory");
    } else {
        println!("💤 No indexer is running");
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'statute-rag index --source <FILE>' to (re)build the knowledge base");
    println!("   • Use 'statute-rag ask \"<QUESTION>\"' for a single answer");
    println!("   • Use 'statute-rag chat' for an interactive session");

    Ok(())
}
