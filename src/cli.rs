use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docsift::{backend::BackendKind, chunk::Granularity};

#[derive(Debug, Parser)]
#[command(
    name = "docsift",
    about = "Index document collections and run ranked similarity queries"
)]
pub struct Cli {
    /// Override the support directory holding index artifacts
    #[arg(long, global = true)]
    pub support_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split a document into chunks and print them as JSON lines
    Chunk(ChunkArgs),
    /// Create a collection or ingest more files into it
    Index(IndexArgs),
    /// Run a ranked query against a collection
    Query(QueryArgs),
    /// Delete a collection and its index artifact
    Delete {
        /// Name of the collection to delete
        name: String,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Chunk --

#[derive(Debug, Parser)]
pub struct ChunkArgs {
    /// Document to split
    pub path: PathBuf,

    /// Chunking granularity
    #[arg(long, value_enum, default_value = "page")]
    pub granularity: Granularity,
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Collection name
    pub name: String,

    /// Documents to ingest
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Index backend for a new collection (defaults to lexical); an
    /// existing collection keeps its kind
    #[arg(short = 'k', long, value_enum)]
    pub kind: Option<BackendKind>,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Collection name
    pub name: String,

    /// The query text
    pub query: String,

    /// Number of results to return (non-positive falls back to the default)
    #[arg(short = 'n', long)]
    pub count: Option<i64>,

    /// Output results as a JSON array
    #[arg(long)]
    pub json: bool,

    /// Append results as newline-delimited JSON to this file, for a
    /// tailing consumer
    #[arg(long, value_name = "PATH")]
    pub stream: Option<PathBuf>,

    /// Sentinel file for --stream; deleting it cancels the query
    #[arg(long, requires = "stream")]
    pub lock_file: Option<PathBuf>,
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
            "docsift",
            &mut std::io::stdout(),
        );
    }
}
