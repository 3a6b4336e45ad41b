mod app;
mod bridge;
mod cli;
mod config;
mod coordinator;
mod decoder;
mod error;
mod ollama;
mod paths;
mod prompts;
mod protocol;
mod relay;

use anyhow::Context;
use clap::Parser;
use cli::Command;
use config::{FileConfig, Settings};
use coordinator::Coordinator;
use relay::Relay;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries generated text and the bridge protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let overrides = Settings {
        server_url: args.server.clone(),
        selected_model: args.model.clone(),
    };
    let file_config = FileConfig::new(config_path.clone(), overrides);
    tracing::debug!(path = %config_path.display(), "resolved config path");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let coordinator = Coordinator::new(http.clone(), Arc::new(file_config.clone()), Relay::new());

    match args.cmd {
        Command::Summarize {
            title,
            selection,
            input,
        } => {
            let text = app::read_input(input.as_deref()).await?;
            let prompt = if selection {
                prompts::summarize_selection(&text)
            } else {
                let title = title
                    .or_else(|| {
                        input
                            .as_deref()
                            .and_then(|p| p.file_stem())
                            .map(|s| s.to_string_lossy().into_owned())
                    })
                    .unwrap_or_default();
                prompts::summarize_page(&title, &text)
            };
            app::run_generation(&coordinator, "summary", &prompt, "").await
        }
        Command::Explain { input } => {
            let text = app::read_input(input.as_deref()).await?;
            app::run_generation(&coordinator, "explain", &prompts::explain_selection(&text), "").await
        }
        Command::Ask { question, input } => {
            let text = app::read_input(input.as_deref()).await?;
            let prompt = prompts::ask_about_selection(&text, &question);
            app::run_generation(&coordinator, "ask", &prompt, "").await
        }
        Command::Chat {
            context_file,
            message,
        } => {
            let context = match context_file {
                Some(p) => app::read_input(Some(p.as_path())).await?,
                None => String::new(),
            };
            app::run_generation(&coordinator, "chat", &message.join(" "), &context).await
        }
        Command::Models => app::cmd_models(&http, &file_config).await,
        Command::Use { model } => app::cmd_use(&config_path, model, args.server),
        Command::Config => app::cmd_config(&file_config),
        Command::Serve => {
            tracing::info!("serving on stdin/stdout");
            bridge::serve(coordinator, tokio::io::stdin(), tokio::io::stdout()).await
        }
    }
}
