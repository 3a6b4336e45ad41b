use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Summarize, explain, or chat about page text with a local Ollama server
#[derive(Debug, Parser)]
#[command(name = "ollama-summarizer")]
#[command(version)]
#[command(about = "Summarize, explain, or chat about text with a local Ollama server", long_about = None)]
pub struct Args {
    /// Model server base URL (default: config, then http://localhost:11434)
    #[arg(long = "server", global = true)]
    pub server: Option<String>,

    /// Model name (default: config, then the first installed model)
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize page content read from FILE (or stdin)
    Summarize {
        /// Page title to include in the prompt
        #[arg(long = "title")]
        title: Option<String>,

        /// Treat the input as a text selection rather than a whole page
        #[arg(long = "selection")]
        selection: bool,

        /// Input file; `-` or omitted reads stdin
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Explain selected text in simple terms
    Explain {
        /// Input file; `-` or omitted reads stdin
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Ask a question about selected text
    Ask {
        /// The question
        #[arg(short = 'q', long = "question")]
        question: String,

        /// Input file; `-` or omitted reads stdin
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Chat with page content as context
    Chat {
        /// File whose content is sent as context
        #[arg(long = "context-file", value_name = "FILE")]
        context_file: Option<PathBuf>,

        /// Message text
        #[arg(value_name = "MESSAGE", required = true)]
        message: Vec<String>,
    },

    /// List models installed on the server
    Models,

    /// Persist the selected model and/or server URL
    Use {
        /// Model to select
        model: Option<String>,
    },

    /// Print the config file path and resolved settings
    Config,

    /// Speak the generate/streamChunk protocol as JSON lines on stdin/stdout
    Serve,
}
