//! Command-line arguments.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ask questions about a technical regulation, answered from its own articles.
#[derive(Parser, Debug)]
#[command(name = "regqa")]
#[command(version)]
#[command(about = "Question answering over a structured technical regulation", long_about = None)]
pub struct Args {
    /// Configuration file (defaults to ./regqa.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (debug level); RUST_LOG overrides
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse the regulation into chunks and save them
    Chunk {
        /// Regulation text file (defaults to the configured regulation_file)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Chunk file to write (defaults to the configured chunks_file)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse, save chunks and rebuild the index from scratch
    Init,

    /// Build the vector index
    Index {
        /// Rebuild even when the index is already populated
        #[arg(long)]
        force: bool,

        /// Read chunks from the chunk file instead of parsing the regulation
        #[arg(long)]
        from_chunks: bool,
    },

    /// Answer a question
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Number of passages to retrieve (at most 50)
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the answer while it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Show the passages that would back an answer, without generating one
    Search {
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Number of passages to retrieve (at most 50)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show Ollama health and index status
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_flags() {
        let args = Args::try_parse_from([
            "regqa",
            "-v",
            "ask",
            "Что такое заземление?",
            "-k",
            "3",
            "--stream",
        ])
        .expect("parse");
        assert!(args.verbose);
        match args.command {
            Commands::Ask {
                question,
                k,
                stream,
            } => {
                assert_eq!(question, "Что такое заземление?");
                assert_eq!(k, Some(3));
                assert!(stream);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_index_and_global_config() {
        let args = Args::try_parse_from(["regqa", "index", "--force", "--config", "/tmp/r.toml"])
            .expect("parse");
        assert_eq!(args.config, Some(PathBuf::from("/tmp/r.toml")));
        assert!(matches!(
            args.command,
            Commands::Index {
                force: true,
                from_chunks: false
            }
        ));
    }

    #[test]
    fn parses_search() {
        let args = Args::try_parse_from(["regqa", "search", "маркировка", "-k", "2"])
            .expect("parse");
        match args.command {
            Commands::Search { question, k } => {
                assert_eq!(question, "маркировка");
                assert_eq!(k, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Args::try_parse_from(["regqa"]).is_err());
    }
}
