use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "ragindex",
    version,
    about = "Index local documents and retrieve grounded context for questions"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the ColBERT model ID or local model path
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
    /// Build the index from a directory of documents (full rebuild)
    Index(IndexArgs),
    /// Retrieve the chunks most similar to a query
    Search(SearchArgs),
    /// Answer a question from retrieved context, with citations
    Ask(AskArgs),
    /// Show configuration, model and index status
    Status(StatusArgs),
    /// Manage persistent settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp(McpArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory (or single .txt/.md file) to index
    pub path: PathBuf,

    /// Where to write the index (default: <data-dir>/index)
    #[arg(long)]
    pub index_path: Option<PathBuf>,

    /// Chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared between consecutive chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Chunks embedded per model call
    #[arg(long, default_value_t = crate::vector_index::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum similarity in [-1, 1]
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Index to search (default: <data-dir>/index)
    #[arg(long)]
    pub index_path: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Number of context chunks to retrieve
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum similarity in [-1, 1]
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Index to search (default: <data-dir>/index)
    #[arg(long)]
    pub index_path: Option<PathBuf>,

    /// Output the answer, context and citations as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// One of: model_id, chunk_size, chunk_overlap, top_k,
        /// similarity_threshold, index_path
        key: String,
        value: String,
    },
    /// Remove a stored setting (revert to default)
    Clear {
        /// Setting to clear; all settings when omitted
        key: Option<String>,
    },
}

// -- MCP --

#[derive(Debug, Parser)]
pub struct McpArgs {
    /// Index to serve (default: <data-dir>/index)
    #[arg(long)]
    pub index_path: Option<PathBuf>,
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
            "ragindex",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["ragindex", "search", "hello"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.count, None);
                assert_eq!(args.threshold, None);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_negative_threshold() {
        let cli =
            Cli::parse_from(["ragindex", "ask", "why?", "--threshold", "-0.2"]);
        match cli.command {
            Command::Ask(args) => assert_eq!(args.threshold, Some(-0.2)),
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn parse_index_with_global_flags() {
        let cli = Cli::parse_from([
            "ragindex",
            "index",
            "./docs",
            "--chunk-size",
            "500",
            "--data-dir",
            "/tmp/rag",
            "-vv",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/rag")));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.path, PathBuf::from("./docs"));
                assert_eq!(args.chunk_size, Some(500));
                assert_eq!(args.batch_size, 32);
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(
            Cli::try_parse_from(["ragindex", "-q", "-v", "status"]).is_err()
        );
    }
}
