use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use statute_rag::commands::{ask_question, build_index, chunk_document, run_chat, show_status};
use statute_rag::config::{
    GenerationConfig, get_config_dir, run_interactive_config, show_config,
};

#[derive(Parser)]
#[command(name = "statute-rag")]
#[command(about = "Retrieval-augmented question answering over statutory text")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.statute-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model service, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Split a plain-text statute into overlapping chunks
    Chunk {
        /// Path to the UTF-8 source document
        source: PathBuf,
    },
    /// Embed the chunks and save the knowledge base
    Index {
        /// Re-chunk this document first instead of using the existing chunk file
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Number of chunks retrieved as context (1-50)
        #[arg(short = 'k', long = "top-k", value_parser = parse_top_k)]
        top_k: Option<usize>,
        /// Print the retrieved chunks and the references they contain
        #[arg(long)]
        show_context: bool,
    },
    /// Start an interactive question loop
    Chat {
        /// Number of chunks retrieved as context (1-50)
        #[arg(short = 'k', long = "top-k", value_parser = parse_top_k)]
        top_k: Option<usize>,
    },
    /// Show the data directory and knowledge base state
    Status,
}

fn parse_top_k(value: &str) -> Result<usize, String> {
    let top_k = value.parse::<usize>().map_err(|e| e.to_string())?;
    GenerationConfig::default()
        .set_top_k(top_k)
        .map_err(|e| e.to_string())?;
    Ok(top_k)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to locate configuration directory")?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chunk { source } => {
            chunk_document(&config_dir, &source)?;
        }
        Commands::Index { source } => {
            build_index(&config_dir, source.as_deref()).await?;
        }
        Commands::Ask {
            question,
            top_k,
            show_context,
        } => {
            ask_question(&config_dir, question, top_k, show_context).await?;
        }
        Commands::Chat { top_k } => {
            run_chat(&config_dir, top_k).await?;
        }
        Commands::Status => {
            show_status(&config_dir)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["statute-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn chunk_command_with_source() {
        let cli = Cli::try_parse_from(["statute-rag", "chunk", "statute.txt"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chunk { source } = parsed.command {
                assert_eq!(source, PathBuf::from("statute.txt"));
            } else {
                panic!("expected chunk command");
            }
        }
    }

    #[test]
    fn chunk_command_requires_source() {
        let cli = Cli::try_parse_from(["statute-rag", "chunk"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn index_command_source_is_optional() {
        let cli = Cli::try_parse_from(["statute-rag", "index"]);
        if let Ok(Cli {
            command: Commands::Index { source },
            ..
        }) = cli
        {
            assert_eq!(source, None);
        } else {
            panic!("expected index command");
        }

        let cli = Cli::try_parse_from(["statute-rag", "index", "--source", "reba.txt"]);
        if let Ok(Cli {
            command: Commands::Index { source },
            ..
        }) = cli
        {
            assert_eq!(source, Some(PathBuf::from("reba.txt")));
        } else {
            panic!("expected index command");
        }
    }

    #[test]
    fn ask_command_with_options() {
        let cli = Cli::try_parse_from([
            "statute-rag",
            "ask",
            "Who must register to trade in real estate?",
            "-k",
            "5",
            "--show-context",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                question,
                top_k,
                show_context,
            } = parsed.command
            {
                assert_eq!(question, "Who must register to trade in real estate?");
                assert_eq!(top_k, Some(5));
                assert!(show_context);
            } else {
                panic!("expected ask command");
            }
        }
    }

    #[test]
    fn ask_command_rejects_non_numeric_k() {
        let cli = Cli::try_parse_from(["statute-rag", "ask", "question", "-k", "three"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn top_k_outside_range_is_rejected() {
        for k in ["0", "51"] {
            let cli = Cli::try_parse_from(["statute-rag", "ask", "question", "-k", k]);
            assert!(cli.is_err());

            if let Err(err) = cli {
                assert_eq!(err.kind(), ErrorKind::ValueValidation);
            }
        }

        let cli = Cli::try_parse_from(["statute-rag", "chat", "--top-k", "50"]);
        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat { top_k: Some(50) }));
        } else {
            panic!("expected chat command");
        }
        assert!(Cli::try_parse_from(["statute-rag", "chat", "-k", "0"]).is_err());
    }

    #[test]
    fn chat_command_defaults() {
        let cli = Cli::try_parse_from(["statute-rag", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat { top_k: None }));
        }
    }

    #[test]
    fn global_config_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["statute-rag", "status", "--config-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/rag")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["statute-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["statute-rag", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["statute-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
