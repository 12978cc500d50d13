use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use txtindex::config::{DEFAULT_COLLECTION, DecodePolicy};

#[derive(Debug, Parser)]
#[command(
    name = "txtindex",
    about = "Incremental line-level semantic index for folders of text files"
)]
pub struct Cli {
    /// Override the embedding model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index new and changed .txt files under a folder
    Build(BuildArgs),
    /// Retrieve the lines most similar to a question
    Query(QueryArgs),
    /// Show tracked documents and stored chunks
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Where an index lives.
#[derive(Debug, Clone, clap::Args)]
pub struct IndexLocation {
    /// Directory holding the collection and its state file
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Collection name
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Folder to scan for .txt files
    #[arg(long)]
    pub from: PathBuf,

    #[command(flatten)]
    pub location: IndexLocation,

    /// Drop the collection and re-ingest every file
    #[arg(long)]
    pub reset: bool,

    /// Override the state file location
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// What to do with files that are not valid UTF-8
    #[arg(long, value_enum, default_value_t = DecodePolicy::Fail)]
    pub on_invalid_utf8: DecodePolicy,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The question to search for
    pub question: String,

    /// Number of results to return
    #[arg(short, long, default_value = "3")]
    pub k: usize,

    #[command(flatten)]
    pub location: IndexLocation,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    #[command(flatten)]
    pub location: IndexLocation,

    /// Override the state file location
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "txtindex",
            &mut std::io::stdout(),
        );
    }
}
