//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docvault - documents with metadata in SQLite and payloads on pluggable backends
#[derive(Parser, Debug)]
#[command(name = "docvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a local file as a new document
    Put {
        /// File to upload
        path: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Target backend id (defaults to the configured default)
        #[arg(long)]
        backend: Option<String>,
    },

    /// Write a document's contents to a file or stdout
    Get {
        id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Re-read the payload even if it is already cached
        #[arg(long)]
        refetch: bool,
    },

    /// Print a document's metadata
    Info { id: String },

    /// List document metadata
    List {
        #[arg(long)]
        backend: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Move a document to another backend
    Move { id: String, backend: String },

    /// Move every document from one backend to another
    Migrate {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value_t = 100)]
        batch_size: u32,
    },

    /// Delete a document and its payload
    Delete { id: String },

    /// Show configured backends and document counts
    Backends,

    /// Print Prometheus metrics for this invocation
    Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from(["docvault", "put", "a.txt", "--backend", "archive"]).unwrap();
        match cli.command {
            Command::Put { path, backend, name, mime } => {
                assert_eq!(path, PathBuf::from("a.txt"));
                assert_eq!(backend.as_deref(), Some("archive"));
                assert!(name.is_none());
                assert!(mime.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_migrate_defaults() {
        let cli = Cli::try_parse_from(["docvault", "migrate", "--from", "local-sql", "--to", "s3"]).unwrap();
        match cli.command {
            Command::Migrate { from, to, batch_size } => {
                assert_eq!(from, "local-sql");
                assert_eq!(to, "s3");
                assert_eq!(batch_size, 100);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
