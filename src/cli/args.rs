//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Ask LLM backends from the command line.
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// The default command: send a prompt.
    #[command(flatten)]
    pub ask: AskArgs,

    // === Global flags ===
    /// Override the config directory (also: QUILL_CONFIG_DIR)
    #[arg(long, value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Verbose logging (shorthand for QUILL_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and edit configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage named conversation sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// List providers and credential availability
    Providers,
}

/// Arguments for the default prompt command.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct AskArgs {
    /// Prompt text
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,

    /// Model: provider/model-id, bare model id, or alias
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Attach a text file (repeatable)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Attach an image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,

    /// Emit the result as a JSON object
    #[arg(long)]
    pub json: bool,

    /// Stream tokens as they arrive
    #[arg(long, conflicts_with = "no_stream")]
    pub stream: bool,

    /// Buffer the full response before printing
    #[arg(long)]
    pub no_stream: bool,

    /// Sampling temperature (0 to 2)
    #[arg(short, long, value_name = "T")]
    pub temperature: Option<f64>,

    /// Cap on output tokens
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Spend limit in USD for this run (or session, with --session)
    #[arg(long, value_name = "USD")]
    pub budget: Option<f64>,

    /// Retries after the first attempt (0 disables)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Skip the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Named session to continue
    #[arg(long, value_name = "NAME")]
    pub session: Option<String>,
}

/// `quill config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show effective settings and where each came from
    Show,

    /// Set a settings key (dot paths like providers.openai.apiBase)
    Set {
        key: String,
        value: String,
    },

    /// Store an API key for a provider
    SetKey {
        provider: String,
        key: String,
    },

    /// Remove a settings key, or all settings
    Reset {
        key: Option<String>,
    },

    /// Print configuration file locations
    Path,
}

/// `quill session` subcommands.
#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// List stored sessions
    List,

    /// Print a session in an exportable form
    Export {
        name: String,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Create a session from an exported file
    Import {
        name: String,
        file: PathBuf,
    },

    /// Delete a stored session
    Delete {
        name: String,
    },
}

/// Session export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Structured JSON, importable
    Json,
    /// Human-readable transcript
    Text,
}
