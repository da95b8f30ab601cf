#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};

use super::{ApiFlavor, Config, ConfigError, EmbeddingConfig, GenerationConfig, ServiceConfig};
use crate::chunking::ChunkingConfig;
use crate::embeddings::FailurePolicy;
use crate::remote::RemoteClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Statute RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Model Service").bold().yellow());
    eprintln!("Configure the service used for embeddings and answers.");
    eprintln!();
    configure_service(&mut config.service)?;

    eprintln!();
    eprintln!("{}", style("Embedding").bold().yellow());
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Answer Generation").bold().yellow());
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    configure_chunking(&mut config.chunking)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_service_connection(&config) {
        eprintln!("{}", style("✓ Model service connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the model service or its models").yellow()
        );
        eprintln!("You can continue, but make sure the service is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("{}", describe_config(&config));
    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Human-readable summary of every setting; API keys are only reported as set
fn describe_config(config: &Config) -> String {
    let service_url = match config.service_url() {
        Ok(url) => style(url.to_string()).cyan().to_string(),
        Err(e) => format!("{} ({})", style("Invalid").red(), e),
    };
    let api_key = if config.service.resolved_api_key().is_some() {
        style("set").green()
    } else {
        style("not set").dim()
    };

    let lines = [
        style("Model Service:").bold().yellow().to_string(),
        format!("  Flavor: {}", style(config.service.flavor).cyan()),
        format!("  URL: {}", service_url),
        format!("  API key: {}", api_key),
        format!("  Timeout: {}s", style(config.service.timeout_secs).cyan()),
        format!(
            "  Retry attempts: {}",
            style(config.service.retry_attempts).cyan()
        ),
        String::new(),
        style("Embedding:").bold().yellow().to_string(),
        format!("  Model: {}", style(&config.embedding.model).cyan()),
        format!("  Dimension: {}", style(config.embedding.dimension).cyan()),
        format!(
            "  Failure policy: {}",
            style(config.embedding.failure_policy).cyan()
        ),
        format!(
            "  Pacing: {}ms every {} items",
            style(config.embedding.pause_ms).cyan(),
            style(config.embedding.pause_every).cyan()
        ),
        format!("  Concurrency: {}", style(config.embedding.concurrency).cyan()),
        String::new(),
        style("Generation:").bold().yellow().to_string(),
        format!("  Model: {}", style(&config.generation.model).cyan()),
        format!("  Top k: {}", style(config.generation.top_k).cyan()),
        String::new(),
        style("Chunking:").bold().yellow().to_string(),
        format!(
            "  Max length: {} words",
            style(config.chunking.max_length).cyan()
        ),
        format!("  Overlap: {} words", style(config.chunking.overlap).cyan()),
        String::new(),
        format!(
            "Data directory: {}",
            style(config.data_path().display()).cyan()
        ),
    ];
    lines.join("\n")
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    let exists = config_dir.join(super::CONFIG_FILE).exists();
    Config::load(config_dir).map_or_else(
        |e| {
            eprintln!(
                "{} ({:#})",
                style("Existing configuration is invalid. Using defaults.").yellow(),
                e
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            if exists {
                eprintln!("{}", style("Found existing configuration.").green());
            } else {
                eprintln!(
                    "{}",
                    style("No existing configuration found. Using defaults.").yellow()
                );
            }
            Ok(config)
        },
    )
}

fn configure_service(service: &mut ServiceConfig) -> Result<()> {
    let flavors = [ApiFlavor::Ollama, ApiFlavor::OpenAi];
    let flavor_index = Select::new()
        .with_prompt("Service API")
        .default(flavors.iter().position(|&f| f == service.flavor).unwrap_or(0))
        .items(&["Ollama (/api/embed, /api/chat)", "OpenAI-compatible (/v1/...)"])
        .interact()?;
    let flavor = flavors[flavor_index];

    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == service.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Service protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Service host")
        .default(service.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ServiceConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ServiceConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Service port")
        .default(service.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    if flavor == ApiFlavor::OpenAi {
        eprintln!(
            "The {} environment variable takes precedence over a stored key.",
            style(super::API_KEY_ENV).cyan()
        );
        let key = Password::new()
            .with_prompt("API key (leave empty to keep the current one)")
            .allow_empty_password(true)
            .interact()?;
        if !key.trim().is_empty() {
            service.api_key = Some(key.trim().to_string());
        }
    }

    let timeout_secs: u64 = Input::new()
        .with_prompt("Request timeout (seconds)")
        .default(service.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    let retry_attempts: u32 = Input::new()
        .with_prompt("Attempts per request")
        .default(service.retry_attempts)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=10).contains(input) {
                Ok(())
            } else {
                Err("Attempts must be between 1 and 10")
            }
        })
        .interact_text()?;

    service.flavor = flavor;
    service.set_protocol(protocol)?;
    service.set_host(host)?;
    service.set_port(port)?;
    service.timeout_secs = timeout_secs;
    service.retry_attempts = retry_attempts;
    service.validate()?;

    Ok(())
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: usize = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 8192")
            }
        })
        .interact_text()?;

    let policies = [FailurePolicy::ZeroVector, FailurePolicy::Strict];
    let policy_index = Select::new()
        .with_prompt("When an embedding fails")
        .default(
            policies
                .iter()
                .position(|&p| p == embedding.failure_policy)
                .unwrap_or(0),
        )
        .items(&[
            "Store a zero vector and continue",
            "Stop and report the failed chunks",
        ])
        .interact()?;

    let concurrency: usize = Input::new()
        .with_prompt("Embedding requests in flight")
        .default(embedding.concurrency)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=64).contains(input) {
                Ok(())
            } else {
                Err("Concurrency must be between 1 and 64")
            }
        })
        .interact_text()?;

    embedding.set_model(model)?;
    embedding.set_dimension(dimension)?;
    embedding.failure_policy = policies[policy_index];
    embedding.concurrency = concurrency;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Chat model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(generation.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Top k must be between 1 and 50")
            }
        })
        .interact_text()?;

    generation.set_model(model)?;
    generation.set_top_k(top_k)?;

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let max_length: usize = Input::new()
        .with_prompt("Words per chunk")
        .default(chunking.max_length)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunks must hold at least one word")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let overlap: usize = Input::new()
        .with_prompt("Words shared by neighbouring chunks")
        .default(chunking.overlap.min(max_length.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), String> {
            if *input < max_length {
                Ok(())
            } else {
                Err(format!("Overlap must be less than {}", max_length))
            }
        })
        .interact_text()?;

    *chunking = ChunkingConfig {
        max_length,
        overlap,
    };
    chunking.validate()?;

    Ok(())
}

/// Whether the service answers and serves both configured models
fn test_service_connection(config: &Config) -> bool {
    RemoteClient::new(config)
        .map(|client| client.with_retry_attempts(1))
        .and_then(|client| client.health_check())
        .is_ok()
}
